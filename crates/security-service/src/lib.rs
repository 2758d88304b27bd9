//! Security-Component library.
//!
//! Issues signed tokens to users and components, publishes the key set
//! that verifiers use, authenticates tokens on behalf of components that
//! cannot verify locally, and hosts the component registry.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Signing keys (KeyManager) and secret hashing
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - Component-token middleware
//! - `repositories` - Credential stores and seed data
//! - `services` - Issuer, registry and key rotation
//! - `routes` - Router and application state

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
