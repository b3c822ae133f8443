//! Shared helpers for the integration tests.

use auth_test_utils::KeyPairFiles;
use job_auth::{AuthConfig, AuthModule, KeyMaterial, KeyPaths};
use std::time::Duration;

/// Refresh interval short enough to observe several cycles in a test.
pub const FAST_REFRESH: Duration = Duration::from_millis(100);

/// Start an RSA server signing with the given key pair written to disk.
///
/// Keep the returned files alive for as long as the temp dir is needed.
pub async fn rsa_server(
    private_pem: &str,
    public_pem: &str,
) -> Result<(AuthModule, KeyPairFiles), anyhow::Error> {
    let files = KeyPairFiles::write(private_pem, public_pem)?;
    let config = AuthConfig::rsa_server(KeyPaths::new(files.private_key(), files.public_key()));
    let module = AuthModule::new(config).await?;
    Ok((module, files))
}

/// Fingerprint of a PEM public key, as reported by `AuthModule::key_fingerprint`.
pub fn fingerprint_of(public_pem: &str) -> Result<String, anyhow::Error> {
    KeyMaterial::rsa_public(public_pem)?
        .fingerprint()
        .ok_or_else(|| anyhow::anyhow!("RSA material has no fingerprint"))
}

/// Poll until the module trusts the key with `expected` fingerprint.
pub async fn wait_for_fingerprint(
    module: &AuthModule,
    expected: &str,
) -> Result<(), anyhow::Error> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if module.key_fingerprint().await.as_deref() == Some(expected) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for key {expected}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
