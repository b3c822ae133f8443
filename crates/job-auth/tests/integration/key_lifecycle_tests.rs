//! Construction and cross-role verification with real key files and a mock
//! public key endpoint.

use crate::common::rsa_server;
use auth_test_utils::crypto_fixtures::{
    MALFORMED_PEM, RSA_PRIVATE_KEY_PEM_A, RSA_PRIVATE_KEY_PEM_B, RSA_PUBLIC_KEY_PEM_A,
    RSA_PUBLIC_KEY_PEM_B, TEST_HMAC_SECRET,
};
use auth_test_utils::{KeyPairFiles, MockKeyServer};
use job_auth::secret::SecretString;
use job_auth::{AuthConfig, AuthError, AuthModule, Claims, KeyPaths, KeySourceError, Role};
use std::time::Duration;

fn claims(sub: &str) -> Claims {
    Claims::new(sub, Duration::from_secs(600))
}

#[tokio::test]
async fn test_runner_verifies_tokens_from_server() -> Result<(), anyhow::Error> {
    let (server, _files) = rsa_server(RSA_PRIVATE_KEY_PEM_A, RSA_PUBLIC_KEY_PEM_A).await?;
    let endpoint = MockKeyServer::start(&server.public_key_pem().await?).await;
    let runner = AuthModule::new(AuthConfig::rsa_runner(endpoint.url())).await?;

    let token = server
        .issue_token(&claims("job-42").with_claim("pipeline", "nightly"))
        .await?;
    let verified = runner.verify_token(&token).await?;

    assert_eq!(verified.sub, "job-42");
    assert_eq!(
        verified.get("pipeline").and_then(|v| v.as_str()),
        Some("nightly")
    );
    assert_eq!(endpoint.request_count().await, 1);

    runner.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_runner_with_foreign_key_rejects_tokens() -> Result<(), anyhow::Error> {
    let (server, _files) = rsa_server(RSA_PRIVATE_KEY_PEM_A, RSA_PUBLIC_KEY_PEM_A).await?;
    let endpoint = MockKeyServer::start(RSA_PUBLIC_KEY_PEM_B).await;
    let runner = AuthModule::new(AuthConfig::rsa_runner(endpoint.url())).await?;

    let token = server.issue_token(&claims("job-42")).await?;
    assert_eq!(runner.verify_token(&token).await, Err(AuthError::InvalidToken));
    Ok(())
}

#[tokio::test]
async fn test_runner_cannot_issue_or_authenticate() -> Result<(), anyhow::Error> {
    let endpoint = MockKeyServer::start(RSA_PUBLIC_KEY_PEM_A).await;
    let config = AuthConfig::rsa_runner(endpoint.url())
        .with_credentials("admin", SecretString::from("pw"));
    let runner = AuthModule::new(config).await?;

    assert!(matches!(
        runner.issue_token(&claims("job-1")).await,
        Err(AuthError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        runner.authenticate("admin", "pw").await,
        Err(AuthError::UnsupportedOperation(_))
    ));
    assert_eq!(runner.public_key_pem().await?, RSA_PUBLIC_KEY_PEM_A.trim());
    Ok(())
}

#[tokio::test]
async fn test_runner_sends_configured_credentials() -> Result<(), anyhow::Error> {
    let endpoint = MockKeyServer::start(RSA_PUBLIC_KEY_PEM_A).await;
    let config = AuthConfig::rsa_runner(endpoint.url())
        .with_credentials("runner", SecretString::from("runner-pw"));
    let _runner = AuthModule::new(config).await?;

    let authorization = endpoint
        .last_authorization()
        .await
        .ok_or_else(|| anyhow::anyhow!("no authorization header sent"))?;
    assert!(authorization.starts_with("Basic "));
    Ok(())
}

#[tokio::test]
async fn test_server_authenticate_issues_verifiable_token() -> Result<(), anyhow::Error> {
    let files = KeyPairFiles::write(RSA_PRIVATE_KEY_PEM_A, RSA_PUBLIC_KEY_PEM_A)?;
    let config = AuthConfig::rsa_server(KeyPaths::new(files.private_key(), files.public_key()))
        .with_credentials("admin", SecretString::from("s3cret"));
    let server = AuthModule::new(config).await?;
    let endpoint = MockKeyServer::start(&server.public_key_pem().await?).await;
    let runner = AuthModule::new(AuthConfig::rsa_runner(endpoint.url())).await?;

    let token = server.authenticate("admin", "s3cret").await?;
    assert_eq!(runner.verify_token(&token).await?.sub, "admin");

    assert_eq!(
        server.authenticate("admin", "guess").await,
        Err(AuthError::InvalidCredentials)
    );
    Ok(())
}

#[tokio::test]
async fn test_server_missing_key_file_fails_construction() -> Result<(), anyhow::Error> {
    let files = KeyPairFiles::write(RSA_PRIVATE_KEY_PEM_A, RSA_PUBLIC_KEY_PEM_A)?;
    let config = AuthConfig::rsa_server(KeyPaths::new(files.missing_file(), files.public_key()));

    let err = AuthModule::new(config).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Construction(KeySourceError::KeyFileUnreadable { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_server_malformed_key_file_fails_construction() -> Result<(), anyhow::Error> {
    let files = KeyPairFiles::write(MALFORMED_PEM, RSA_PUBLIC_KEY_PEM_A)?;
    let config = AuthConfig::rsa_server(KeyPaths::new(files.private_key(), files.public_key()));

    let err = AuthModule::new(config).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Construction(KeySourceError::KeyFileMalformed { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_server_mismatched_key_pair_fails_construction() -> Result<(), anyhow::Error> {
    let files = KeyPairFiles::write(RSA_PRIVATE_KEY_PEM_B, RSA_PUBLIC_KEY_PEM_A)?;
    let config = AuthConfig::rsa_server(KeyPaths::new(files.private_key(), files.public_key()));

    let err = AuthModule::new(config).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Construction(KeySourceError::KeyFileMalformed { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_runner_unreachable_endpoint_fails_construction() -> Result<(), anyhow::Error> {
    let endpoint = MockKeyServer::start(RSA_PUBLIC_KEY_PEM_A).await;
    endpoint.fail_with(503).await;

    let err = AuthModule::new(AuthConfig::rsa_runner(endpoint.url()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::Construction(KeySourceError::Unreachable(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_runner_garbage_key_fails_construction() -> Result<(), anyhow::Error> {
    let endpoint = MockKeyServer::start(RSA_PUBLIC_KEY_PEM_A).await;
    endpoint.serve_garbage().await;

    let err = AuthModule::new(AuthConfig::rsa_runner(endpoint.url()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::Construction(KeySourceError::KeyFetchMalformed(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_hmac_never_contacts_key_endpoint() -> Result<(), anyhow::Error> {
    let endpoint = MockKeyServer::start(RSA_PUBLIC_KEY_PEM_A).await;
    let config = AuthConfig::hmac(Role::Runner, SecretString::from(TEST_HMAC_SECRET))
        .with_public_key_url(endpoint.url())
        .with_refresh_interval(crate::common::FAST_REFRESH);
    let runner = AuthModule::new(config).await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(endpoint.request_count().await, 0);

    let server =
        AuthModule::new(AuthConfig::hmac(Role::Server, SecretString::from(TEST_HMAC_SECRET)))
            .await?;
    let token = server.issue_token(&claims("job-7")).await?;
    assert_eq!(runner.verify_token(&token).await?.sub, "job-7");
    Ok(())
}
