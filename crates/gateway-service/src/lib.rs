//! Gateway library.
//!
//! The gateway sits in front of the bank's business components and
//! authenticates every request under its protected prefix, either by
//! verifying the token locally against the published key set or by asking
//! the Security-Component to verify it.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
