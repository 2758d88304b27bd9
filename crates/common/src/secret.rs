//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for component secrets, user
//! passwords and bearer tokens. `Debug` on these types is redacted, so any
//! struct deriving `Debug` over them is safe to log.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let token = SecretString::from("eyJhbGciOi...");
//! assert!(!format!("{token:?}").contains("eyJ"));
//! let header = format!("Bearer {}", token.expose_secret());
//! # assert!(header.starts_with("Bearer "));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
