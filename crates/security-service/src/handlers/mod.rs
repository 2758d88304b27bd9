//! HTTP request handlers for the Security-Component.

pub mod admin_handler;
pub mod auth_handler;
pub mod health;
pub mod jwks_handler;
pub mod metrics;
pub mod registration_handler;

pub use health::health_check;
pub use metrics::metrics_handler;
