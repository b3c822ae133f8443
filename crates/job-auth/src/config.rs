//! Auth module configuration.
//!
//! Configuration is loaded from environment variables. Secrets are held as
//! [`SecretString`] and redacted in Debug output.

use crate::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default interval between public key refreshes on a runner (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Default HTTP timeout for the public key fetch.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of tokens issued by [`authenticate`](crate::AuthModule::authenticate).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Which side of the job system this process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Issues and signs tokens; holds the private key or shared secret.
    Server,
    /// Verifies tokens only; never holds an RSA private key.
    Runner,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Runner => "runner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Role::Server),
            "runner" => Ok(Role::Runner),
            other => Err(ConfigError::InvalidValue(format!(
                "AUTH_MODE must be 'server' or 'runner', got '{other}'"
            ))),
        }
    }
}

/// JWT signing algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256 (asymmetric).
    #[serde(rename = "rsa256")]
    Rsa256,
    /// HMAC with SHA-256 (shared secret).
    #[serde(rename = "hs256")]
    Hs256,
}

impl JwtAlgorithm {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JwtAlgorithm::Rsa256 => "rsa256",
            JwtAlgorithm::Hs256 => "hs256",
        }
    }

    /// The matching `jsonwebtoken` algorithm.
    #[must_use]
    pub fn jwt_algorithm(&self) -> jsonwebtoken::Algorithm {
        match self {
            JwtAlgorithm::Rsa256 => jsonwebtoken::Algorithm::RS256,
            JwtAlgorithm::Hs256 => jsonwebtoken::Algorithm::HS256,
        }
    }
}

impl fmt::Display for JwtAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JwtAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rsa256" | "rs256" => Ok(JwtAlgorithm::Rsa256),
            "hs256" => Ok(JwtAlgorithm::Hs256),
            other => Err(ConfigError::InvalidValue(format!(
                "AUTH_JWT_ALGORITHM must be 'rsa256' or 'hs256', got '{other}'"
            ))),
        }
    }
}

/// Paths to the server's PEM-encoded RSA key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl KeyPaths {
    #[must_use]
    pub fn new(private_key: impl Into<PathBuf>, public_key: impl Into<PathBuf>) -> Self {
        Self {
            private_key: private_key.into(),
            public_key: public_key.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Auth module configuration.
///
/// Role and algorithm are fixed for the life of the process. Only the key
/// material derived from this configuration changes after construction.
#[derive(Clone)]
pub struct AuthConfig {
    /// Operating mode.
    pub mode: Role,

    /// Signing algorithm family.
    pub algorithm: JwtAlgorithm,

    /// Shared secret for HS256.
    pub secret: Option<SecretString>,

    /// Basic credentials accepted by [`authenticate`](crate::AuthModule::authenticate)
    /// and sent by a runner when fetching the public key.
    pub username: String,
    pub password: SecretString,

    /// Secret for HS256 proxy tokens.
    pub proxy_secret: Option<SecretString>,

    /// Server key pair locations (server + RSA).
    pub key_paths: Option<KeyPaths>,

    /// Endpoint serving the server's public key (runner + RSA).
    pub public_key_url: Option<String>,

    /// Interval between public key refreshes.
    pub refresh_interval: Duration,

    /// Timeout for a single public key fetch.
    pub http_timeout: Duration,

    /// Lifetime of tokens issued by `authenticate`.
    pub token_ttl: Duration,

    /// Tolerance for `iat` claims in the future.
    pub clock_skew: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("mode", &self.mode)
            .field("algorithm", &self.algorithm)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field(
                "proxy_secret",
                &self.proxy_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("key_paths", &self.key_paths)
            .field("public_key_url", &self.public_key_url)
            .field("refresh_interval", &self.refresh_interval)
            .field("http_timeout", &self.http_timeout)
            .field("token_ttl", &self.token_ttl)
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

impl AuthConfig {
    /// Server configuration signing with an RSA key pair read from disk.
    #[must_use]
    pub fn rsa_server(key_paths: KeyPaths) -> Self {
        Self::base(Role::Server, JwtAlgorithm::Rsa256).with_key_paths(key_paths)
    }

    /// Runner configuration verifying with a public key fetched from `public_key_url`.
    #[must_use]
    pub fn rsa_runner(public_key_url: impl Into<String>) -> Self {
        Self::base(Role::Runner, JwtAlgorithm::Rsa256).with_public_key_url(public_key_url)
    }

    /// HS256 configuration for either role.
    #[must_use]
    pub fn hmac(mode: Role, secret: SecretString) -> Self {
        let mut config = Self::base(mode, JwtAlgorithm::Hs256);
        config.secret = Some(secret);
        config
    }

    fn base(mode: Role, algorithm: JwtAlgorithm) -> Self {
        Self {
            mode,
            algorithm,
            secret: None,
            username: String::new(),
            password: SecretString::from(""),
            proxy_secret: None,
            key_paths: None,
            public_key_url: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            token_ttl: DEFAULT_TOKEN_TTL,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    #[must_use]
    pub fn with_key_paths(mut self, key_paths: KeyPaths) -> Self {
        self.key_paths = Some(key_paths);
        self
    }

    #[must_use]
    pub fn with_public_key_url(mut self, url: impl Into<String>) -> Self {
        self.public_key_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = username.into();
        self.password = password;
        self
    }

    #[must_use]
    pub fn with_proxy_secret(mut self, proxy_secret: SecretString) -> Self {
        self.proxy_secret = Some(proxy_secret);
        self
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`AuthConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map of variables (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when a variable required by the
    /// chosen mode and algorithm is absent, and `ConfigError::InvalidValue`
    /// when a value does not parse or is out of range.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mode: Role = vars
            .get("AUTH_MODE")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_MODE".to_string()))?
            .parse()?;

        let algorithm: JwtAlgorithm = match vars.get("AUTH_JWT_ALGORITHM") {
            Some(value) => value.parse()?,
            None => JwtAlgorithm::Rsa256,
        };

        let mut config = Self::base(mode, algorithm);

        config.secret = non_empty(vars, "AUTH_JWT_SECRET").map(SecretString::from);
        config.proxy_secret = non_empty(vars, "AUTH_PROXY_SECRET").map(SecretString::from);
        config.username = vars.get("AUTH_USERNAME").cloned().unwrap_or_default();
        config.password = SecretString::from(vars.get("AUTH_PASSWORD").cloned().unwrap_or_default());
        config.public_key_url = non_empty(vars, "AUTH_PUBLIC_KEY_URL");

        let private_key = non_empty(vars, "AUTH_PRIVATE_KEY_PATH");
        let public_key = non_empty(vars, "AUTH_PUBLIC_KEY_PATH");
        config.key_paths = match (private_key, public_key) {
            (Some(private_key), Some(public_key)) => Some(KeyPaths::new(private_key, public_key)),
            _ => None,
        };

        match (mode, algorithm) {
            (_, JwtAlgorithm::Hs256) if config.secret.is_none() => {
                return Err(ConfigError::MissingEnvVar("AUTH_JWT_SECRET".to_string()));
            }
            (Role::Server, JwtAlgorithm::Rsa256) if config.key_paths.is_none() => {
                return Err(ConfigError::MissingEnvVar(
                    "AUTH_PRIVATE_KEY_PATH and AUTH_PUBLIC_KEY_PATH".to_string(),
                ));
            }
            (Role::Runner, JwtAlgorithm::Rsa256) if config.public_key_url.is_none() => {
                return Err(ConfigError::MissingEnvVar("AUTH_PUBLIC_KEY_URL".to_string()));
            }
            _ => {}
        }

        if let Some(secs) = parse_positive_secs(vars, "AUTH_KEY_REFRESH_INTERVAL_SECONDS")? {
            config.refresh_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_positive_secs(vars, "AUTH_HTTP_TIMEOUT_SECONDS")? {
            config.http_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_positive_secs(vars, "AUTH_TOKEN_TTL_SECONDS")? {
            config.token_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_positive_secs(vars, "AUTH_JWT_CLOCK_SKEW_SECONDS")? {
            if secs > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidValue(format!(
                    "AUTH_JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {secs}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }
            config.clock_skew = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|v| !v.trim().is_empty()).cloned()
}

fn parse_positive_secs(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(None);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidValue(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(Some(value))
}
