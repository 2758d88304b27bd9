//! Credential stores read by the Issuer and the registry.
//!
//! Each store is a trait so the services never depend on where records
//! live. The in-memory implementations are loaded from the seed file at
//! startup.

pub mod components;
pub mod seed;
pub mod users;

pub use components::{
    AllowListEntry, ComponentRepository, InMemoryComponentRepository, RegisteredComponent,
};
pub use seed::SeedData;
pub use users::{InMemoryUserRepository, UserRecord, UserRepository};
