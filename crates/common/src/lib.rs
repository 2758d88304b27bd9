//! Common trust-layer building blocks shared across bank-trust components.
//!
//! Every component that verifies tokens or calls the Security-Component
//! depends on this crate: the token wire format, the key-set document,
//! the per-component key cache and verifier, the outbound token manager
//! and the startup registration flow all live here.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for common data types
pub mod types;

/// Module for configuration shared by every registering component
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (claims, constants, header parsing)
pub mod jwt;

/// Module for the published key-set document
pub mod key_set;

/// Module for the per-component key-set cache
pub mod key_set_cache;

/// Module for local token verification
pub mod verifier;

/// Module for the issuer client abstraction and its HTTP implementation
pub mod issuer_client;

/// Module for the circuit breaker guarding issuer calls
pub mod circuit_breaker;

/// Module for outbound token management with refresh-on-expiry
pub mod token_manager;

/// Module for startup registration and shutdown deregistration
pub mod bootstrap;

/// Module for test fixtures (keys, token signing, mock issuer)
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
