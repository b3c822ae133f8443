//! Error types for key acquisition and token handling.

use thiserror::Error;

/// Errors produced while acquiring key material from a [`KeySource`].
///
/// At construction these are fatal and surface as [`AuthError::Construction`].
/// Inside the refresher they are logged and the previous key stays in place.
///
/// [`KeySource`]: crate::source::KeySource
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeySourceError {
    /// A local key file could not be read.
    #[error("Key file unreadable: {path}: {reason}")]
    KeyFileUnreadable { path: String, reason: String },

    /// A local key file was read but is not valid PEM key material.
    #[error("Key file malformed: {path}: {reason}")]
    KeyFileMalformed { path: String, reason: String },

    /// The remote public key endpoint could not be reached or refused the request.
    #[error("Public key endpoint unreachable: {0}")]
    Unreachable(String),

    /// The remote endpoint answered, but the body is not a usable public key.
    #[error("Fetched public key malformed: {0}")]
    KeyFetchMalformed(String),
}

/// Errors returned by [`AuthModule`](crate::AuthModule).
///
/// Verification failures all map to [`AuthError::InvalidToken`] with a generic
/// message; the specific reason is logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The configuration is incomplete or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The initial key acquisition failed; no module was created.
    #[error("Could not initialise the auth module: {0}")]
    Construction(#[from] KeySourceError),

    /// The token is expired, malformed, badly signed or uses the wrong algorithm.
    #[error("The access token is invalid or expired")]
    InvalidToken,

    /// Username or password did not match.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The operation is not available for this role or algorithm.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// The signing library rejected the claims or key.
    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Result type alias using [`AuthError`].
pub type Result<T> = std::result::Result<T, AuthError>;
