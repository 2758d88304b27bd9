//! Observability for the gateway.

pub mod metrics;
