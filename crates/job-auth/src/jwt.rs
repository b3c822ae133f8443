//! JWT signing and verification boundary.
//!
//! Thin wrappers over `jsonwebtoken` plus the checks applied to every
//! incoming token:
//! - Size limit enforced before any parsing
//! - Header algorithm must match the configured algorithm
//! - `exp` is always validated
//! - `iat` is validated against a clock skew tolerance by the caller
//!
//! Error messages are generic; details are logged at debug level under the
//! `auth.jwt` target.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (8KB).
///
/// Checked before base64 decoding or signature verification so oversized
/// tokens cost almost nothing to reject.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default tolerance for `iat` timestamps in the future (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Upper bound for the configurable clock skew (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Reasons a token is rejected.
///
/// All variants display the same generic message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header `alg` differs from the algorithm of the live key.
    #[error("The access token is invalid or expired")]
    AlgorithmMismatch,

    /// Signature, `exp` or claim structure check failed in the JWT library.
    #[error("The access token is invalid or expired")]
    Rejected,

    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Functions
// =============================================================================

/// Sign `claims` with `key` under `algorithm`.
///
/// # Errors
///
/// Returns the library error when the claims cannot be serialized or the key
/// does not fit the algorithm.
pub fn sign<C: Serialize>(
    claims: &C,
    key: &EncodingKey,
    algorithm: Algorithm,
) -> Result<String, jsonwebtoken::errors::Error> {
    jsonwebtoken::encode(&Header::new(algorithm), claims, key)
}

/// Verify `token` with `key` under `algorithm` and return its claims.
///
/// Rejects tokens larger than [`MAX_JWT_SIZE_BYTES`], tokens whose header
/// names a different algorithm, bad signatures and expired tokens.
///
/// # Errors
///
/// Returns a [`JwtValidationError`] describing the first failed check.
pub fn verify<C: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
) -> Result<C, JwtValidationError> {
    let header_alg = extract_algorithm(token)?;
    if header_alg != algorithm {
        tracing::debug!(
            target: "auth.jwt",
            expected = ?algorithm,
            actual = ?header_alg,
            "Token rejected: algorithm mismatch"
        );
        return Err(JwtValidationError::AlgorithmMismatch);
    }

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.leeway = 0;

    let data = jsonwebtoken::decode::<C>(token, key, &validation).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Token verification failed");
        JwtValidationError::Rejected
    })?;

    Ok(data.claims)
}

/// Read the `alg` field from a JWT header without verifying the signature.
///
/// The size limit is checked first. The returned value is only good for
/// deciding whether verification can succeed at all; it is never trusted on
/// its own.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` if the token is not three dot-separated parts with a
///   base64url JSON header carrying a known `alg`
pub fn extract_algorithm(token: &str) -> Result<Algorithm, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "auth.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "auth.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = header
        .get("alg")
        .cloned()
        .ok_or(JwtValidationError::MalformedToken)?;

    serde_json::from_value::<Algorithm>(alg).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Unknown JWT header algorithm");
        JwtValidationError::MalformedToken
    })
}

/// Validate the `iat` (issued-at) claim against the current time.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is more than `clock_skew` ahead of now.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is bounded by MAX_CLOCK_SKEW
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "auth.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}
