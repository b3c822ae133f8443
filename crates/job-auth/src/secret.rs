//! Secret types for keeping credentials and key material out of logs.
//!
//! Re-exports the [`secrecy`] types used throughout this crate. The HMAC
//! secret, the basic-auth password and the proxy secret are all held as
//! [`SecretString`], whose `Debug` output is redacted, so deriving `Debug` on a
//! struct that contains one cannot leak the value through `{:?}` or tracing.
//!
//! ```rust
//! use job_auth::secret::{ExposeSecret, SecretString};
//!
//! let secret = SecretString::from("shared-hmac-secret");
//! assert!(!format!("{secret:?}").contains("shared-hmac-secret"));
//! assert_eq!(secret.expose_secret(), "shared-hmac-secret");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Compare two secrets in constant time.
///
/// Used for credential checks so that response timing does not reveal how
/// many leading bytes of a guess were correct.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
