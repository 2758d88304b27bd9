//! Circuit breaker guarding calls into the issuer.
//!
//! ```text
//! ┌────────┐  failure_threshold  ┌──────┐  recovery_timeout  ┌──────────┐
//! │ Closed │ ──────reached─────→ │ Open │ ────elapsed─────→  │ HalfOpen │
//! └────────┘                     └──────┘ ←──probe fails──── └──────────┘
//!      ↑                                                          │
//!      └──────────────── success_threshold met ───────────────────┘
//! ```
//!
//! While open, [`GuardedIssuerClient`] answers every call with
//! `ServiceUnreachable` without touching the transport. Only transport
//! failures count against the breaker; a 401 is a healthy issuer saying no.
//! A guarded call dropped before it completes (the caller's timeout fired)
//! also counts as a failure. While half-open, at most
//! `half_open_success_threshold` probes are in flight at once.

use crate::error::TrustError;
use crate::issuer_client::{IssuedToken, IssuerClient};
use crate::key_set::KeySet;
use crate::secret::SecretString;
use crate::types::{ComponentIdentity, TokenClass, TokenVerdict};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default number of consecutive failures before opening the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default duration the circuit stays open before transitioning to half-open.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of successful probes required to close from half-open.
pub const DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD: u32 = 1;

/// Message carried by the fallback error.
pub const CIRCUIT_OPEN_MESSAGE: &str = "circuit open";

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Requests are rejected until `until`.
    Open { until: Instant },
    /// A bounded number of probe requests are let through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open { .. } => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_success_threshold: DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD,
        }
    }
}

impl CircuitBreakerConfig {
    /// # Errors
    ///
    /// `Configuration` if any threshold or the timeout is zero.
    pub fn validate(&self) -> Result<(), TrustError> {
        if self.failure_threshold == 0 {
            return Err(TrustError::Configuration(
                "circuit failure_threshold must be at least 1".into(),
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(TrustError::Configuration(
                "circuit recovery_timeout must be positive".into(),
            ));
        }
        if self.half_open_success_threshold == 0 {
            return Err(TrustError::Configuration(
                "circuit half_open_success_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_half_open_successes: u32,
    half_open_in_flight: u32,
    config: CircuitBreakerConfig,
    fast_fail_count: u64,
}

/// Thread-safe circuit breaker. No I/O happens under the lock.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_half_open_successes: 0,
                half_open_in_flight: 0,
                config,
                fast_fail_count: 0,
            })),
        }
    }

    /// Whether a request may proceed. Moves Open to HalfOpen once the
    /// recovery timeout has elapsed.
    ///
    /// An admitted half-open probe holds a slot until the matching
    /// `record_success` or `record_failure`.
    #[must_use]
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < inner.config.half_open_success_threshold {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    inner.fast_fail_count += 1;
                    false
                }
            }
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_half_open_successes = 0;
                    inner.half_open_in_flight = 1;
                    info!(
                        target: "common.circuit_breaker",
                        previous_state = "open",
                        new_state = "half_open",
                        "Circuit breaker transitioning to half-open for probe requests"
                    );
                    true
                } else {
                    inner.fast_fail_count += 1;
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.consecutive_half_open_successes += 1;
                if inner.consecutive_half_open_successes >= inner.config.half_open_success_threshold
                {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_half_open_successes = 0;
                    inner.half_open_in_flight = 0;
                    info!(
                        target: "common.circuit_breaker",
                        previous_state = "half_open",
                        new_state = "closed",
                        "Circuit breaker closed after successful probes"
                    );
                }
            }
            CircuitState::Open { .. } => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= inner.config.failure_threshold {
                    inner.state = CircuitState::Open {
                        until: Instant::now() + inner.config.recovery_timeout,
                    };
                    warn!(
                        target: "common.circuit_breaker",
                        consecutive_failures = inner.consecutive_failures,
                        recovery_timeout_secs = inner.config.recovery_timeout.as_secs(),
                        "Circuit breaker opened after consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open {
                    until: Instant::now() + inner.config.recovery_timeout,
                };
                inner.consecutive_half_open_successes = 0;
                inner.half_open_in_flight = 0;
                warn!(
                    target: "common.circuit_breaker",
                    previous_state = "half_open",
                    new_state = "open",
                    "Circuit breaker re-opened after probe failure"
                );
            }
            CircuitState::Open { .. } => {}
        }
    }

    /// Current state; an expired Open reads as HalfOpen without transitioning.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open { until } if Instant::now() >= until => CircuitState::HalfOpen,
            other => other,
        }
    }

    /// Number of calls rejected while open.
    #[must_use]
    pub fn fast_fail_count(&self) -> u64 {
        self.inner.lock().fast_fail_count
    }
}

// =============================================================================
// Guarded Issuer Client
// =============================================================================

/// [`IssuerClient`] decorator applying a [`CircuitBreaker`] to every call.
pub struct GuardedIssuerClient {
    inner: Arc<dyn IssuerClient>,
    breaker: CircuitBreaker,
}

impl GuardedIssuerClient {
    #[must_use]
    pub fn new(inner: Arc<dyn IssuerClient>, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guarded<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, TrustError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, TrustError>> + Send,
    {
        if !self.breaker.allow_request() {
            debug!(
                target: "common.circuit_breaker",
                operation = operation,
                "Circuit open, failing fast"
            );
            return Err(TrustError::ServiceUnreachable(CIRCUIT_OPEN_MESSAGE.into()));
        }

        let mut in_flight = InFlight {
            breaker: &self.breaker,
            operation,
            settled: false,
        };
        let result = call().await;
        in_flight.settled = true;
        match &result {
            Err(e) if e.is_transport() => self.breaker.record_failure(),
            _ => self.breaker.record_success(),
        }
        result
    }
}

/// Records a failure if a guarded call is dropped before it settles.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    operation: &'static str,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(
                target: "common.circuit_breaker",
                operation = self.operation,
                "Guarded call abandoned before completion, counting as failure"
            );
            self.breaker.record_failure();
        }
    }
}

#[async_trait]
impl IssuerClient for GuardedIssuerClient {
    async fn authenticate(
        &self,
        principal: &str,
        credentials: &SecretString,
        token_class: TokenClass,
    ) -> Result<IssuedToken, TrustError> {
        self.guarded("authenticate", || {
            self.inner.authenticate(principal, credentials, token_class)
        })
        .await
    }

    async fn key_set(&self) -> Result<KeySet, TrustError> {
        self.guarded("key_set", || self.inner.key_set()).await
    }

    async fn authenticate_token(
        &self,
        bearer: &SecretString,
        token: &str,
        request_path: &str,
    ) -> Result<TokenVerdict, TrustError> {
        self.guarded("authenticate_token", || {
            self.inner.authenticate_token(bearer, token, request_path)
        })
        .await
    }

    async fn register(&self, identity: &ComponentIdentity) -> Result<(), TrustError> {
        self.guarded("register", || self.inner.register(identity)).await
    }

    async fn deregister(
        &self,
        bearer: &SecretString,
        component_id: &str,
    ) -> Result<(), TrustError> {
        self.guarded("deregister", || self.inner.deregister(bearer, component_id))
            .await
    }
}
