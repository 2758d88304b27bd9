//! Signing key rotation.

use crate::crypto::KeyManager;
use crate::errors::SecurityError;
use crate::observability::metrics::record_key_rotation;
use common::types::TokenClass;
use std::sync::Arc;
use tracing::{error, instrument};

/// Rotate the signing key of `class` and return the new kid.
///
/// Key generation runs on the blocking pool.
///
/// # Errors
///
/// Returns `SecurityError::Crypto` if key generation fails.
#[instrument(skip_all, fields(token_class = %class))]
pub async fn rotate_signing_key(
    keys: Arc<KeyManager>,
    class: TokenClass,
) -> Result<String, SecurityError> {
    let result = tokio::task::spawn_blocking(move || keys.rotate(class))
        .await
        .map_err(|e| SecurityError::Internal(format!("Key rotation task failed: {e}")))
        .and_then(|r| r);

    match &result {
        Ok(_) => record_key_rotation(class.as_str(), "success"),
        Err(e) => {
            error!(target: "security.keys", token_class = %class, error = %e, "Key rotation failed");
            record_key_rotation(class.as_str(), "error");
        }
    }
    result
}
