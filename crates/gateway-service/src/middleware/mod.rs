//! Middleware for the gateway.

pub mod auth;

pub use auth::{authenticate_request, AuthState, Verification};
