//! HTTP request handlers for the gateway.

pub mod health;
pub mod metrics;
pub mod whoami;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use whoami::whoami;
