//! # Auth Test Utilities
//!
//! Shared test utilities for the `job-auth` crate.
//!
//! This crate provides:
//! - Fixed RSA key pairs and an HMAC secret (`crypto_fixtures`)
//! - Key files on disk in a temporary directory (`key_files`)
//! - A mock public key endpoint backed by wiremock (`key_server`)
//! - Claims builders (`token_builders`)
//! - Tracing setup for test output (`init_test_tracing`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let files = KeyPairFiles::write(RSA_PRIVATE_KEY_PEM_A, RSA_PUBLIC_KEY_PEM_A)?;
//!     let server = MockKeyServer::start(RSA_PUBLIC_KEY_PEM_A).await;
//!
//!     let claims = TestClaimsBuilder::new().for_subject("job-1").build();
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod key_files;
pub mod key_server;
pub mod token_builders;

pub use crypto_fixtures::*;
pub use key_files::KeyPairFiles;
pub use key_server::{MockKeyServer, PUBLIC_KEY_PATH};
pub use token_builders::TestClaimsBuilder;

/// Install a tracing subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// Filtering follows `RUST_LOG`, defaulting to `auth=debug`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
