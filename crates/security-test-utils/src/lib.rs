//! # Security Test Utilities
//!
//! Shared test utilities for the Security-Component and the components
//! that trust it.
//!
//! This crate provides:
//! - Cached RSA key fixtures and a ready `KeyManager`
//! - Seeded in-memory credential stores (`TestSeed`)
//! - `TestTokenBuilder` for hand-signed tokens
//! - `InProcessIssuer`, an `IssuerClient` that calls the real Issuer
//!   without HTTP
//! - `TestSecurityServer` for E2E tests against a real router
//!
//! `common::testing` (key fixtures, `MockIssuerClient`,
//! `StaticKeySetSource`) is re-exported as [`testing`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use security_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let seed = TestSeed::new().with_component(&test_identity("c1"));
//!     let server = TestSecurityServer::spawn(seed).await?;
//!
//!     let issuer = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;
//!     issuer.register(&test_identity("c1")).await?;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod in_process;
pub mod server_harness;
pub mod token_builders;

pub use common::testing;

pub use common::testing::{
    json_web_key, recording_identity_loss, sign_token, test_identity, test_rsa_key,
    MockIssuerClient, StaticKeySetSource,
};
pub use fixtures::*;
pub use in_process::*;
pub use server_harness::*;
pub use token_builders::*;
