//! Strategies for obtaining key material.
//!
//! - [`LocalFileSource`] reads the server's PEM key pair from disk.
//! - [`RemoteFetchSource`] fetches the server's PEM public key over HTTP for
//!   a runner.
//!
//! HS256 needs neither: its secret comes straight from configuration.

use crate::error::KeySourceError;
use crate::key_material::KeyMaterial;
use crate::secret::{ExposeSecret, SecretString};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default connection timeout for the public key fetch.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A way of producing the current key material.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Acquire key material. Called once at construction and, for runners,
    /// on every refresher tick.
    async fn fetch(&self) -> Result<KeyMaterial, KeySourceError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Local files
// =============================================================================

/// Reads a PEM RSA key pair from the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    private_key_path: PathBuf,
    public_key_path: PathBuf,
}

impl LocalFileSource {
    #[must_use]
    pub fn new(private_key_path: impl Into<PathBuf>, public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            public_key_path: public_key_path.into(),
        }
    }
}

async fn read_pem(path: &Path) -> Result<String, KeySourceError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        warn!(target: "auth.source", path = %path.display(), error = %e, "Failed to read key file");
        KeySourceError::KeyFileUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

fn malformed(path: &Path, reason: impl Into<String>) -> KeySourceError {
    KeySourceError::KeyFileMalformed {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

#[async_trait]
impl KeySource for LocalFileSource {
    #[instrument(skip_all)]
    async fn fetch(&self) -> Result<KeyMaterial, KeySourceError> {
        let private_pem = read_pem(&self.private_key_path).await?;
        let public_pem = read_pem(&self.public_key_path).await?;

        // Parse each half separately so the error names the offending file.
        jsonwebtoken::EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| malformed(&self.private_key_path, e.to_string()))?;
        jsonwebtoken::DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| malformed(&self.public_key_path, e.to_string()))?;

        let material = KeyMaterial::rsa_pair(&private_pem, &public_pem)
            .map_err(|e| malformed(&self.private_key_path, e.to_string()))?;

        if !material.halves_match() {
            warn!(target: "auth.source", "Private key does not match public key");
            return Err(malformed(
                &self.public_key_path,
                "public key does not match the private key",
            ));
        }

        debug!(
            target: "auth.source",
            fingerprint = ?material.fingerprint(),
            "Loaded key pair from disk"
        );
        Ok(material)
    }

    fn name(&self) -> &'static str {
        "local_file"
    }
}

// =============================================================================
// Remote fetch
// =============================================================================

/// Fetches the server's PEM public key from an HTTP endpoint.
///
/// The endpoint must answer `GET` with the PEM text as the body. When
/// credentials are set they are sent as HTTP basic auth.
pub struct RemoteFetchSource {
    url: String,
    http_client: reqwest::Client,
    credentials: Option<(String, SecretString)>,
}

impl std::fmt::Debug for RemoteFetchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFetchSource")
            .field("url", &self.url)
            .field(
                "credentials",
                &self.credentials.as_ref().map(|(user, _)| (user, "[REDACTED]")),
            )
            .finish_non_exhaustive()
    }
}

impl RemoteFetchSource {
    /// Create a source for `url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Unreachable` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, KeySourceError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| {
                KeySourceError::Unreachable(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            url: url.into(),
            http_client,
            credentials: None,
        })
    }

    /// Send basic-auth credentials with every fetch.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.credentials = Some((username.into(), password));
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySource for RemoteFetchSource {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn fetch(&self) -> Result<KeyMaterial, KeySourceError> {
        debug!(target: "auth.source", "Fetching public key from server");

        let mut request = self.http_client.get(&self.url);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password.expose_secret()));
        }

        let response = request.send().await.map_err(|e| {
            debug!(target: "auth.source", error = %e, "Public key request failed");
            KeySourceError::Unreachable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "auth.source", status = %status, "Public key endpoint returned error");
            return Err(KeySourceError::Unreachable(format!("Unexpected status: {status}")));
        }

        let body = response.text().await.map_err(|e| {
            debug!(target: "auth.source", error = %e, "Failed to read public key response");
            KeySourceError::Unreachable(e.to_string())
        })?;

        let pem = body.trim();
        if pem.is_empty() {
            return Err(KeySourceError::KeyFetchMalformed("empty response body".into()));
        }

        KeyMaterial::rsa_public(pem).map_err(|e| {
            warn!(target: "auth.source", error = %e, "Fetched public key is not a valid PEM RSA key");
            KeySourceError::KeyFetchMalformed(e.to_string())
        })
    }

    fn name(&self) -> &'static str {
        "remote_fetch"
    }
}
