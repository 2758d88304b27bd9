//! Middleware for the Security-Component router.

pub mod auth;

pub use auth::require_component_token;
