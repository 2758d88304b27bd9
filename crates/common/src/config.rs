//! Configuration shared by every component that registers with the
//! Security-Component.
//!
//! Services load their own `Config` from environment variables; the
//! helpers here cover the pieces they have in common: the component's
//! own identity and numeric settings given in seconds.

use crate::error::TrustError;
use crate::secret::SecretString;
use crate::types::ComponentIdentity;
use std::collections::HashMap;
use std::time::Duration;

pub const COMPONENT_ID_VAR: &str = "COMPONENT_ID";
pub const COMPONENT_NAME_VAR: &str = "COMPONENT_NAME";
pub const COMPONENT_SECRET_VAR: &str = "COMPONENT_SECRET";
pub const COMPONENT_URL_VAR: &str = "COMPONENT_URL";

/// Read a required, non-empty variable.
///
/// # Errors
///
/// Returns `TrustError::Configuration` if the variable is missing or blank.
pub fn required_var(vars: &HashMap<String, String>, key: &str) -> Result<String, TrustError> {
    match vars.get(key).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(TrustError::Configuration(format!(
            "missing required environment variable: {key}"
        ))),
    }
}

/// Read a whole number of seconds, falling back to `default` when unset.
///
/// # Errors
///
/// Returns `TrustError::Configuration` if the value is not an unsigned integer.
pub fn duration_secs_var(
    vars: &HashMap<String, String>,
    key: &str,
    default: Duration,
) -> Result<Duration, TrustError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                TrustError::Configuration(format!("{key} must be a whole number of seconds: {e}"))
            }),
    }
}

/// Load this component's identity from `COMPONENT_*` variables.
///
/// # Errors
///
/// Returns `TrustError::Configuration` naming the first missing variable.
pub fn identity_from_vars(vars: &HashMap<String, String>) -> Result<ComponentIdentity, TrustError> {
    Ok(ComponentIdentity {
        id: required_var(vars, COMPONENT_ID_VAR)?,
        name: required_var(vars, COMPONENT_NAME_VAR)?,
        url: required_var(vars, COMPONENT_URL_VAR)?,
        secret: SecretString::from(required_var(vars, COMPONENT_SECRET_VAR)?),
    })
}
