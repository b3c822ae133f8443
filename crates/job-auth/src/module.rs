//! The [`AuthModule`] façade.
//!
//! Construction picks a key strategy once from the configuration, performs a
//! single initial key acquisition and, for an RSA runner, starts the
//! background refresher. Every later operation works on a snapshot of the
//! [`KeyStore`] and never does I/O.

use crate::claims::Claims;
use crate::config::{AuthConfig, JwtAlgorithm, Role};
use crate::error::{AuthError, Result};
use crate::jwt::{self, JwtValidationError, MAX_CLOCK_SKEW};
use crate::key_material::KeyMaterial;
use crate::observability;
use crate::refresher::{spawn_refresher, RefresherHandle};
use crate::secret::{constant_time_eq, ExposeSecret, SecretString};
use crate::source::{KeySource, LocalFileSource, RemoteFetchSource};
use crate::store::KeyStore;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// How the module obtains its key material. Chosen once at construction.
enum KeyStrategy {
    /// HS256: the configured secret, never refreshed.
    Static(SecretString),
    /// Server RSA: loaded once, never refreshed.
    Fetched(Arc<dyn KeySource>),
    /// Runner RSA: fetched once, then refreshed in the background.
    Refreshing(Arc<dyn KeySource>),
}

impl KeyStrategy {
    fn select(config: &AuthConfig, custom: Option<Arc<dyn KeySource>>) -> Result<Self> {
        if config.algorithm == JwtAlgorithm::Hs256 {
            let secret = config
                .secret
                .clone()
                .ok_or_else(|| AuthError::Configuration("hs256 requires a secret".to_string()))?;
            if custom.is_some() {
                debug!(target: "auth.module", "Ignoring key source for hs256 configuration");
            }
            return Ok(KeyStrategy::Static(secret));
        }

        let source = match custom {
            Some(source) => source,
            None => default_source(config)?,
        };

        Ok(match config.mode {
            Role::Server => KeyStrategy::Fetched(source),
            Role::Runner => KeyStrategy::Refreshing(source),
        })
    }

    fn name(&self) -> &'static str {
        match self {
            KeyStrategy::Static(_) => "static",
            KeyStrategy::Fetched(_) => "fetched",
            KeyStrategy::Refreshing(_) => "refreshing",
        }
    }
}

fn default_source(config: &AuthConfig) -> Result<Arc<dyn KeySource>> {
    match config.mode {
        Role::Server => {
            let paths = config.key_paths.as_ref().ok_or_else(|| {
                AuthError::Configuration("rsa256 server requires key paths".to_string())
            })?;
            Ok(Arc::new(LocalFileSource::new(
                paths.private_key.clone(),
                paths.public_key.clone(),
            )))
        }
        Role::Runner => {
            let url = config.public_key_url.as_deref().ok_or_else(|| {
                AuthError::Configuration("rsa256 runner requires a public key URL".to_string())
            })?;
            let mut source = RemoteFetchSource::new(url, config.http_timeout)?;
            if !config.username.is_empty() {
                source = source.with_credentials(config.username.clone(), config.password.clone());
            }
            Ok(Arc::new(source))
        }
    }
}

fn validate(config: &AuthConfig) -> Result<()> {
    if config.clock_skew > MAX_CLOCK_SKEW {
        return Err(AuthError::Configuration(format!(
            "clock skew of {}s exceeds the maximum of {}s",
            config.clock_skew.as_secs(),
            MAX_CLOCK_SKEW.as_secs()
        )));
    }
    if config.refresh_interval.is_zero() {
        return Err(AuthError::Configuration(
            "refresh interval must be positive".to_string(),
        ));
    }
    if config.http_timeout.is_zero() {
        return Err(AuthError::Configuration(
            "HTTP timeout must be positive".to_string(),
        ));
    }
    let has_secret = config
        .secret
        .as_ref()
        .is_some_and(|s| !s.expose_secret().is_empty());
    if config.algorithm == JwtAlgorithm::Hs256 && !has_secret {
        return Err(AuthError::Configuration(
            "hs256 requires a non-empty secret".to_string(),
        ));
    }
    if config
        .proxy_secret
        .as_ref()
        .is_some_and(|s| s.expose_secret().is_empty())
    {
        return Err(AuthError::Configuration(
            "proxy secret must not be empty when set".to_string(),
        ));
    }
    Ok(())
}

/// Builder for an [`AuthModule`] that needs more than a configuration.
///
/// ```rust,ignore
/// let shutdown = CancellationToken::new();
/// let auth = AuthModule::builder(AuthConfig::from_env()?)
///     .with_shutdown_token(&shutdown)
///     .build()
///     .await?;
/// ```
pub struct AuthModuleBuilder {
    config: AuthConfig,
    source: Option<Arc<dyn KeySource>>,
    cancel_token: Option<CancellationToken>,
}

impl AuthModuleBuilder {
    /// Take the RSA key from `source` instead of the configured files or URL.
    #[must_use]
    pub fn with_key_source(mut self, source: Arc<dyn KeySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Stop the refresher when `parent` is cancelled.
    ///
    /// The refresher gets a child token, so [`AuthModule::shutdown`] never
    /// cancels `parent` itself.
    #[must_use]
    pub fn with_shutdown_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel_token = Some(parent.child_token());
        self
    }

    /// Build the module. See [`AuthModule::new`].
    ///
    /// # Errors
    ///
    /// Same as [`AuthModule::new`].
    pub async fn build(self) -> Result<AuthModule> {
        AuthModule::build(self.config, self.source, self.cancel_token).await
    }
}

/// Token issuing and verification for one process.
///
/// A server signs tokens and, with RSA, publishes its public key. A runner
/// only verifies; with RSA it fetches the server's public key at startup and
/// keeps it fresh in the background until [`shutdown`](Self::shutdown) is
/// called, its shutdown token is cancelled or the module is dropped.
///
/// After a key rotation the runner still accepts tokens signed with the
/// previous key for `token_ttl`, so tokens issued before the rotation stay
/// valid until they expire.
pub struct AuthModule {
    config: AuthConfig,
    store: KeyStore,
    proxy_key: Option<SecretString>,
    refresher: Mutex<Option<RefresherHandle>>,
}

impl fmt::Debug for AuthModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthModule")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AuthModule {
    /// Build the module from `config`, acquiring the initial key.
    ///
    /// An RSA server reads its key pair from `config.key_paths`; an RSA runner
    /// fetches the public key from `config.public_key_url` and starts the
    /// refresher. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the configuration is inconsistent
    /// - `Construction` if the initial key acquisition fails
    pub async fn new(config: AuthConfig) -> Result<Self> {
        Self::build(config, None, None).await
    }

    /// Start a builder for options beyond the configuration.
    #[must_use]
    pub fn builder(config: AuthConfig) -> AuthModuleBuilder {
        AuthModuleBuilder {
            config,
            source: None,
            cancel_token: None,
        }
    }

    /// Like [`new`](Self::new), but the RSA key comes from `source`.
    ///
    /// HS256 configurations ignore `source`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new); additionally `Configuration` if `source`
    /// yields material for the other algorithm.
    pub async fn with_key_source(config: AuthConfig, source: Arc<dyn KeySource>) -> Result<Self> {
        Self::build(config, Some(source), None).await
    }

    #[instrument(skip_all, name = "auth.module.init", fields(mode = %config.mode, algorithm = %config.algorithm))]
    async fn build(
        config: AuthConfig,
        custom: Option<Arc<dyn KeySource>>,
        cancel_token: Option<CancellationToken>,
    ) -> Result<Self> {
        validate(&config)?;
        let strategy = KeyStrategy::select(&config, custom)?;

        let initial = match &strategy {
            KeyStrategy::Static(secret) => KeyMaterial::hmac(secret.clone()),
            KeyStrategy::Fetched(source) | KeyStrategy::Refreshing(source) => {
                source.fetch().await?
            }
        };

        if initial.algorithm() != config.algorithm {
            return Err(AuthError::Configuration(format!(
                "key source produced {} material for a {} configuration",
                initial.algorithm(),
                config.algorithm
            )));
        }

        let initial = match config.mode {
            Role::Server => {
                if initial.encoding_key().is_none() {
                    return Err(AuthError::Configuration(
                        "server key source produced no private key".to_string(),
                    ));
                }
                initial
            }
            Role::Runner => initial.into_public_only(),
        };

        info!(
            target: "auth.module",
            strategy = strategy.name(),
            fingerprint = initial.fingerprint().as_deref().unwrap_or("-"),
            "Auth module initialised"
        );

        let store = KeyStore::with_previous_key_retention(initial, config.token_ttl);

        let refresher = match strategy {
            KeyStrategy::Refreshing(source) => Some(spawn_refresher(
                source,
                store.clone(),
                config.refresh_interval,
                cancel_token.unwrap_or_else(CancellationToken::new),
            )),
            KeyStrategy::Static(_) | KeyStrategy::Fetched(_) => None,
        };

        Ok(Self {
            proxy_key: config.proxy_secret.clone(),
            config,
            store,
            refresher: Mutex::new(refresher),
        })
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.config.mode
    }

    #[must_use]
    pub fn algorithm(&self) -> JwtAlgorithm {
        self.config.algorithm
    }

    /// Fingerprint of the RSA public key currently trusted, if any.
    pub async fn key_fingerprint(&self) -> Option<String> {
        self.store.read().await.fingerprint()
    }

    /// Sign `claims` with the current key.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` on a runner
    /// - `Signing` if the signing library rejects the claims
    pub async fn issue_token(&self, claims: &Claims) -> Result<String> {
        if self.config.mode == Role::Runner {
            return Err(AuthError::UnsupportedOperation(
                "issuing tokens requires the server role",
            ));
        }

        let snapshot = self.store.read().await;
        let key = snapshot
            .encoding_key()
            .ok_or(AuthError::UnsupportedOperation("no signing key loaded"))?;
        let token = sign(claims, &key, snapshot.algorithm().jwt_algorithm())?;

        observability::record_token_issued();
        debug!(target: "auth.module", exp = claims.exp, "Token issued");
        Ok(token)
    }

    /// Verify `token` and return its claims.
    ///
    /// The current key is tried first, then the key it replaced while that
    /// one is still retained.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for every rejection; the reason is logged at
    /// debug level.
    pub async fn verify_token(&self, token: &str) -> Result<Claims> {
        let (current, previous) = self.store.verification_keys().await;
        let algorithm = current.algorithm().jwt_algorithm();

        let result = match (
            verify(token, &current.decoding_key(), algorithm, &self.config),
            previous,
        ) {
            (Err(e), Some(previous)) => {
                verify(token, &previous.decoding_key(), algorithm, &self.config)
                    .map(|claims| {
                        debug!(target: "auth.module", "Token verified with the previous key");
                        claims
                    })
                    .map_err(|_| e)
            }
            (result, _) => result,
        };

        record_verification("access", &result);
        result
    }

    /// Check `username` and `password` and issue a token for that user.
    ///
    /// Both comparisons run in constant time and are always evaluated.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` on a runner
    /// - `InvalidCredentials` if either value does not match, or no
    ///   credentials are configured
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        if self.config.mode == Role::Runner {
            return Err(AuthError::UnsupportedOperation(
                "authentication requires the server role",
            ));
        }

        let configured = !self.config.username.is_empty();
        let user_ok = constant_time_eq(username, &self.config.username);
        let password_ok = constant_time_eq(password, self.config.password.expose_secret());

        if !(configured & user_ok & password_ok) {
            debug!(target: "auth.module", "Authentication rejected");
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_token(&Claims::new(username, self.config.token_ttl))
            .await
    }

    /// PEM text of the current public key.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for HS256.
    pub async fn public_key_pem(&self) -> Result<String> {
        self.store
            .read()
            .await
            .public_pem()
            .map(str::to_string)
            .ok_or(AuthError::UnsupportedOperation("hs256 has no public key"))
    }

    /// Sign `claims` with the proxy secret (HS256).
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` if no proxy secret is configured
    /// - `Signing` if the signing library rejects the claims
    pub fn issue_proxy_token(&self, claims: &Claims) -> Result<String> {
        let secret = self.proxy_secret()?;
        let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
        sign(claims, &key, Algorithm::HS256)
    }

    /// Verify a token signed by the authenticating proxy with the proxy
    /// secret (HS256).
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` if no proxy secret is configured
    /// - `InvalidToken` for every rejection
    pub fn verify_proxy_token(&self, token: &str) -> Result<Claims> {
        let secret = self.proxy_secret()?;
        let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
        let result = verify(token, &key, Algorithm::HS256, &self.config);
        record_verification("proxy", &result);
        result
    }

    /// Stop the refresher and wait for it to exit. A no-op when none runs.
    pub async fn shutdown(&self) {
        let handle = self.refresher.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!(target: "auth.module", "Key refresher stopped");
        }
    }

    fn proxy_secret(&self) -> Result<&SecretString> {
        self.proxy_key.as_ref().ok_or(AuthError::UnsupportedOperation(
            "no proxy secret configured",
        ))
    }
}

fn sign(claims: &Claims, key: &EncodingKey, algorithm: Algorithm) -> Result<String> {
    jwt::sign(claims, key, algorithm).map_err(|e| AuthError::Signing(e.to_string()))
}

fn verify(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    config: &AuthConfig,
) -> Result<Claims> {
    let claims: Claims = jwt::verify(token, key, algorithm).map_err(invalid_token)?;
    jwt::validate_iat(claims.iat, config.clock_skew).map_err(invalid_token)?;
    Ok(claims)
}

fn invalid_token(e: JwtValidationError) -> AuthError {
    debug!(target: "auth.module", reason = ?e, "Token rejected");
    AuthError::InvalidToken
}

fn record_verification(kind: &'static str, result: &Result<Claims>) {
    let status = if result.is_ok() { "success" } else { "error" };
    observability::record_token_verification(kind, status);
}
