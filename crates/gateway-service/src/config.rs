//! Gateway configuration.
//!
//! Loaded from environment variables with validated defaults. The
//! component secret is redacted in Debug output.

use common::circuit_breaker::{
    CircuitBreakerConfig, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT,
};
use common::config::{duration_secs_var, identity_from_vars, required_var};
use common::key_set_cache::DEFAULT_REFRESH_INTERVAL;
use common::types::ComponentIdentity;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default prefix of the paths that require a token.
pub const DEFAULT_PROTECTED_PREFIX: &str = "/api/";

/// Default bound on a remote verification call.
pub const DEFAULT_REMOTE_VERIFY_TIMEOUT: Duration = Duration::from_secs(6);

/// Default time to keep serving in-flight requests after a shutdown signal.
pub const DEFAULT_SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// How inbound tokens are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Against the cached key set, in the request path.
    Local,
    /// By the Security-Component's token-authenticate endpoint.
    Remote,
}

impl VerificationMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationMode::Local => "local",
            VerificationMode::Remote => "remote",
        }
    }
}

impl FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(VerificationMode::Local),
            "remote" => Ok(VerificationMode::Remote),
            other => Err(format!("expected 'local' or 'remote', got '{other}'")),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Base URL of the Security-Component.
    pub issuer_url: String,

    pub verification_mode: VerificationMode,

    /// Requests whose path starts with this prefix need a bearer token.
    pub protected_prefix: String,

    pub remote_verify_timeout: Duration,

    /// Interval of the scheduled key-set refresh (local mode).
    pub key_set_refresh_interval: Duration,

    /// Circuit breaker guarding every call into the Security-Component.
    pub circuit_breaker: CircuitBreakerConfig,

    /// This gateway's own registration identity.
    pub identity: ComponentIdentity,

    pub shutdown_drain: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("issuer_url", &self.issuer_url)
            .field("verification_mode", &self.verification_mode)
            .field("protected_prefix", &self.protected_prefix)
            .field("remote_verify_timeout", &self.remote_verify_timeout)
            .field("key_set_refresh_interval", &self.key_set_refresh_interval)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("component_id", &self.identity.id)
            .field("component_name", &self.identity.name)
            .field("component_secret", &"[REDACTED]")
            .field("shutdown_drain", &self.shutdown_drain)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing or invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
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

        let issuer_url = required_var(vars, "ISSUER_URL")
            .map_err(|e| invalid("ISSUER_URL", e.to_string()))?
            .trim_end_matches('/')
            .to_string();

        let verification_mode = match vars.get("VERIFICATION_MODE") {
            None => VerificationMode::Local,
            Some(raw) => raw
                .parse()
                .map_err(|reason| invalid("VERIFICATION_MODE", reason))?,
        };

        let protected_prefix = vars
            .get("PROTECTED_PREFIX")
            .map(|p| p.trim().to_string())
            .unwrap_or_else(|| DEFAULT_PROTECTED_PREFIX.to_string());
        if !protected_prefix.starts_with('/') {
            return Err(invalid(
                "PROTECTED_PREFIX",
                format!("must start with '/', got '{protected_prefix}'"),
            ));
        }

        let remote_verify_timeout = seconds(
            vars,
            "REMOTE_VERIFY_TIMEOUT_SECONDS",
            DEFAULT_REMOTE_VERIFY_TIMEOUT,
        )?;
        if remote_verify_timeout.is_zero() {
            return Err(invalid("REMOTE_VERIFY_TIMEOUT_SECONDS", "must be positive".into()));
        }

        let key_set_refresh_interval =
            seconds(vars, "KEY_SET_REFRESH_SECONDS", DEFAULT_REFRESH_INTERVAL)?;
        if key_set_refresh_interval.is_zero() {
            return Err(invalid("KEY_SET_REFRESH_SECONDS", "must be positive".into()));
        }

        let failure_threshold = match vars.get("CIRCUIT_FAILURE_THRESHOLD") {
            None => DEFAULT_FAILURE_THRESHOLD,
            Some(raw) => raw.trim().parse().map_err(|e| {
                invalid(
                    "CIRCUIT_FAILURE_THRESHOLD",
                    format!("must be an integer, got '{raw}': {e}"),
                )
            })?,
        };
        let circuit_breaker = CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: seconds(vars, "CIRCUIT_RECOVERY_SECONDS", DEFAULT_RECOVERY_TIMEOUT)?,
            ..CircuitBreakerConfig::default()
        };
        circuit_breaker
            .validate()
            .map_err(|e| invalid("CIRCUIT_*", e.to_string()))?;

        let identity =
            identity_from_vars(vars).map_err(|e| invalid("COMPONENT_*", e.to_string()))?;

        let shutdown_drain = seconds(vars, "SHUTDOWN_DRAIN_SECONDS", DEFAULT_SHUTDOWN_DRAIN)?;

        Ok(Config {
            bind_address,
            issuer_url,
            verification_mode,
            protected_prefix,
            remote_verify_timeout,
            key_set_refresh_interval,
            circuit_breaker,
            identity,
            shutdown_drain,
        })
    }
}

fn invalid(name: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { name, reason }
}

fn seconds(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    duration_secs_var(vars, name, default).map_err(|e| invalid(name, e.to_string()))
}
