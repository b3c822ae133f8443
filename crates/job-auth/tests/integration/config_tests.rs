//! Environment-style configuration driving a full module.

use auth_test_utils::crypto_fixtures::{
    RSA_PRIVATE_KEY_PEM_A, RSA_PUBLIC_KEY_PEM_A, TEST_HMAC_SECRET,
};
use auth_test_utils::{KeyPairFiles, MockKeyServer};
use job_auth::{AuthConfig, AuthError, AuthModule, ConfigError, JwtAlgorithm, Role};
use std::collections::HashMap;
use std::time::Duration;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[tokio::test]
async fn test_hmac_pair_from_vars() -> Result<(), anyhow::Error> {
    let server_config = AuthConfig::from_vars(&vars(&[
        ("AUTH_MODE", "server"),
        ("AUTH_JWT_ALGORITHM", "hs256"),
        ("AUTH_JWT_SECRET", TEST_HMAC_SECRET),
        ("AUTH_USERNAME", "admin"),
        ("AUTH_PASSWORD", "hunter2"),
        ("AUTH_TOKEN_TTL_SECONDS", "90"),
    ]))?;
    let runner_config = AuthConfig::from_vars(&vars(&[
        ("AUTH_MODE", "runner"),
        ("AUTH_JWT_ALGORITHM", "HS256"),
        ("AUTH_JWT_SECRET", TEST_HMAC_SECRET),
    ]))?;

    let server = AuthModule::new(server_config).await?;
    let runner = AuthModule::new(runner_config).await?;
    assert_eq!(server.role(), Role::Server);
    assert_eq!(runner.role(), Role::Runner);
    assert_eq!(runner.algorithm(), JwtAlgorithm::Hs256);

    let token = server.authenticate("admin", "hunter2").await?;
    let verified = runner.verify_token(&token).await?;
    assert_eq!(verified.sub, "admin");
    assert_eq!(verified.exp - verified.iat, 90);
    Ok(())
}

#[tokio::test]
async fn test_rsa_pair_from_vars() -> Result<(), anyhow::Error> {
    let files = KeyPairFiles::write(RSA_PRIVATE_KEY_PEM_A, RSA_PUBLIC_KEY_PEM_A)?;
    let private_path = files.private_key().display().to_string();
    let public_path = files.public_key().display().to_string();

    let server = AuthModule::new(AuthConfig::from_vars(&vars(&[
        ("AUTH_MODE", "server"),
        ("AUTH_PRIVATE_KEY_PATH", &private_path),
        ("AUTH_PUBLIC_KEY_PATH", &public_path),
    ]))?)
    .await?;
    assert_eq!(server.algorithm(), JwtAlgorithm::Rsa256);

    let endpoint = MockKeyServer::start(&server.public_key_pem().await?).await;
    let runner_config = AuthConfig::from_vars(&vars(&[
        ("AUTH_MODE", "runner"),
        ("AUTH_PUBLIC_KEY_URL", &endpoint.url()),
        ("AUTH_KEY_REFRESH_INTERVAL_SECONDS", "60"),
        ("AUTH_HTTP_TIMEOUT_SECONDS", "2"),
    ]))?;
    assert_eq!(runner_config.refresh_interval, Duration::from_secs(60));
    let runner = AuthModule::new(runner_config).await?;

    let token = server
        .issue_token(&job_auth::Claims::new("job-5", Duration::from_secs(60)))
        .await?;
    assert_eq!(runner.verify_token(&token).await?.sub, "job-5");

    runner.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_proxy_secret_from_vars() -> Result<(), anyhow::Error> {
    let module = AuthModule::new(AuthConfig::from_vars(&vars(&[
        ("AUTH_MODE", "runner"),
        ("AUTH_JWT_ALGORITHM", "hs256"),
        ("AUTH_JWT_SECRET", TEST_HMAC_SECRET),
        ("AUTH_PROXY_SECRET", "proxy-shared-secret"),
    ]))?)
    .await?;

    let token = module.issue_proxy_token(&job_auth::Claims::new("proxy", Duration::from_secs(60)))?;
    assert_eq!(module.verify_proxy_token(&token)?.sub, "proxy");
    Ok(())
}

#[test]
fn test_incomplete_vars_rejected() {
    assert!(matches!(
        AuthConfig::from_vars(&vars(&[("AUTH_MODE", "runner")])),
        Err(ConfigError::MissingEnvVar(_))
    ));
    assert!(matches!(
        AuthConfig::from_vars(&vars(&[("AUTH_MODE", "server"), ("AUTH_JWT_ALGORITHM", "hs256")])),
        Err(ConfigError::MissingEnvVar(_))
    ));
    assert!(matches!(
        AuthConfig::from_vars(&vars(&[
            ("AUTH_MODE", "runner"),
            ("AUTH_JWT_ALGORITHM", "hs256"),
            ("AUTH_JWT_SECRET", TEST_HMAC_SECRET),
            ("AUTH_JWT_CLOCK_SKEW_SECONDS", "601"),
        ])),
        Err(ConfigError::InvalidValue(_))
    ));
}

#[tokio::test]
async fn test_unreachable_url_from_vars_fails_construction() -> Result<(), anyhow::Error> {
    let config = AuthConfig::from_vars(&vars(&[
        ("AUTH_MODE", "runner"),
        ("AUTH_PUBLIC_KEY_URL", "http://127.0.0.1:1/v1/auth/public-key"),
        ("AUTH_HTTP_TIMEOUT_SECONDS", "1"),
    ]))?;

    assert!(matches!(
        AuthModule::new(config).await,
        Err(AuthError::Construction(_))
    ));
    Ok(())
}
