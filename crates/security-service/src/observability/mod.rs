//! Observability for the Security-Component.
//!
//! Handlers and services use `#[instrument(skip_all)]` and only add fields
//! that are safe to log: token classes, kids, outcome labels. Principals,
//! secrets and tokens never appear in spans or metrics.

pub mod metrics;
