//! Token authentication between a job server and its runners.
//!
//! A server issues signed tokens (RSA or HMAC); runners verify them. With
//! RSA, a runner fetches the server's public key at startup and refreshes it
//! in the background so key rotation needs no restart.

#![warn(clippy::pedantic)]

/// Module for claims carried by tokens
pub mod claims;

/// Module for configuration loading
pub mod config;

/// Module for error types
pub mod error;

/// Module for JWT signing and validation primitives
pub mod jwt;

/// Module for the key material variant
pub mod key_material;

/// Module for the auth module façade
pub mod module;

/// Module for metrics
pub mod observability;

/// Module for background key refresh
pub mod refresher;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for key acquisition strategies
pub mod source;

/// Module for the shared key store
pub mod store;

pub use claims::Claims;
pub use config::{AuthConfig, ConfigError, JwtAlgorithm, KeyPaths, Role};
pub use error::{AuthError, KeySourceError};
pub use key_material::KeyMaterial;
pub use module::{AuthModule, AuthModuleBuilder};
pub use source::{KeySource, LocalFileSource, RemoteFetchSource};
pub use store::KeyStore;
