//! Security-Component configuration.
//!
//! Loaded from environment variables with validated defaults.

use common::config::duration_secs_var;
use common::jwt::{DEFAULT_CLOCK_SKEW, DEFAULT_TOKEN_LIFETIME, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Minimum accepted bcrypt cost factor.
pub const MIN_BCRYPT_COST: u32 = 10;

/// Maximum accepted bcrypt cost factor.
pub const MAX_BCRYPT_COST: u32 = 14;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8082";

/// Longest token lifetime accepted (7 days).
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8082").
    pub bind_address: String,

    /// Lifetime of every issued token.
    pub token_lifetime: Duration,

    /// How long a rotated-out key stays published. Defaults to the token
    /// lifetime so tokens it signed can still be verified.
    pub rotation_grace: Duration,

    /// bcrypt cost for hashing secrets and for the dummy hash.
    pub bcrypt_cost: u32,

    /// Tolerance for `iat` in the future.
    pub jwt_clock_skew: Duration,

    /// JSON seed file with users and the component allow-list.
    pub seed_file: Option<PathBuf>,

    /// Component ids allowed to call admin endpoints.
    pub admin_component_ids: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            rotation_grace: DEFAULT_TOKEN_LIFETIME,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            jwt_clock_skew: DEFAULT_CLOCK_SKEW,
            seed_file: None,
            admin_component_ids: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let token_lifetime = seconds(vars, "TOKEN_LIFETIME_SECONDS", DEFAULT_TOKEN_LIFETIME)?;
        if token_lifetime.is_zero() || token_lifetime > MAX_TOKEN_LIFETIME {
            return Err(ConfigError::InvalidValue {
                name: "TOKEN_LIFETIME_SECONDS",
                reason: format!(
                    "must be between 1 and {} seconds, got {}",
                    MAX_TOKEN_LIFETIME.as_secs(),
                    token_lifetime.as_secs()
                ),
            });
        }

        // Zero is allowed: rotated keys are dropped immediately
        let rotation_grace = seconds(vars, "KEY_ROTATION_GRACE_SECONDS", token_lifetime)?;

        let bcrypt_cost = match vars.get("BCRYPT_COST") {
            None => DEFAULT_BCRYPT_COST,
            Some(raw) => {
                let cost: u32 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    name: "BCRYPT_COST",
                    reason: format!("must be an integer, got '{raw}': {e}"),
                })?;
                if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
                    return Err(ConfigError::InvalidValue {
                        name: "BCRYPT_COST",
                        reason: format!(
                            "must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}, got {cost}"
                        ),
                    });
                }
                cost
            }
        };

        let jwt_clock_skew = seconds(vars, "JWT_CLOCK_SKEW_SECONDS", DEFAULT_CLOCK_SKEW)?;
        if jwt_clock_skew.is_zero() || jwt_clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::InvalidValue {
                name: "JWT_CLOCK_SKEW_SECONDS",
                reason: format!(
                    "must be between 1 and {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    jwt_clock_skew.as_secs()
                ),
            });
        }

        let seed_file = vars
            .get("SECURITY_SEED_FILE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let admin_component_ids = vars
            .get("ADMIN_COMPONENT_IDS")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            bind_address,
            token_lifetime,
            rotation_grace,
            bcrypt_cost,
            jwt_clock_skew,
            seed_file,
            admin_component_ids,
        })
    }
}

fn seconds(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    duration_secs_var(vars, name, default).map_err(|e| ConfigError::InvalidValue {
        name,
        reason: e.to_string(),
    })
}
