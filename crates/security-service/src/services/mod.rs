//! Business logic layer.

pub mod issuer;
pub mod key_management_service;
pub mod registry;

pub use issuer::Issuer;
pub use registry::Registry;
