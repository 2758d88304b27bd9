//! Per-component cache of `kid -> verification key`.
//!
//! Lifecycle: `Empty -> Populated -> (refresh) -> Populated -> ...`
//!
//! - Each refresh builds a brand new map and swaps it in under the write
//!   lock. The map itself is an immutable `Arc`, so a reader holds either
//!   the old map or the new one, never a mix.
//! - The first lookup on an empty cache refreshes synchronously; if that
//!   fails the lookup reports [`LookupError::KeySetUnavailable`].
//! - A lookup miss on a populated cache triggers at most one lazy refill
//!   per cooldown window.
//! - Scheduled refreshes run in a background task (see
//!   [`KeySetCache::spawn_refresh_task`]). A failed fetch keeps the stale
//!   map: stale-but-available over unavailable.

use crate::error::TrustError;
use crate::issuer_client::IssuerClient;
use crate::key_set::KeySet;
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default scheduled refresh interval (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Default minimum spacing between lazy refills triggered by lookup misses.
pub const DEFAULT_MISS_REFILL_COOLDOWN: Duration = Duration::from_secs(30);

/// Where the cache gets its key set from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the current key-set document.
    async fn fetch_key_set(&self) -> Result<KeySet, TrustError>;
}

/// Adapter fetching the key set through an [`IssuerClient`].
pub struct IssuerKeySetSource(pub Arc<dyn IssuerClient>);

#[async_trait]
impl KeySetSource for IssuerKeySetSource {
    async fn fetch_key_set(&self) -> Result<KeySet, TrustError> {
        self.0.key_set().await
    }
}

/// Why a lookup produced no key.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// The kid is not in the current key set, even after a refill attempt.
    #[error("unknown signing key")]
    UnknownKey,

    /// The cache was empty and could not be populated.
    #[error("key set unavailable")]
    KeySetUnavailable,
}

/// Timing knobs for the cache.
#[derive(Debug, Clone, Copy)]
pub struct KeySetCacheConfig {
    pub refresh_interval: Duration,
    pub miss_refill_cooldown: Duration,
}

impl Default for KeySetCacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            miss_refill_cooldown: DEFAULT_MISS_REFILL_COOLDOWN,
        }
    }
}

type KeyMap = HashMap<String, DecodingKey>;

/// In-memory key-set cache.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    current: RwLock<Option<Arc<KeyMap>>>,
    /// Serializes populate/refill; holds the time of the last lazy refill.
    refill: Mutex<Option<Instant>>,
    config: KeySetCacheConfig,
}

impl KeySetCache {
    /// Create an empty cache with default timings.
    #[must_use]
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self::with_config(source, KeySetCacheConfig::default())
    }

    #[must_use]
    pub fn with_config(source: Arc<dyn KeySetSource>, config: KeySetCacheConfig) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refill: Mutex::new(None),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> KeySetCacheConfig {
        self.config
    }

    /// Fetch a fresh key set and atomically replace the current map.
    ///
    /// Returns the number of usable keys. On failure the existing map is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Propagates the source's error.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<usize, TrustError> {
        let key_set = self.source.fetch_key_set().await.map_err(|e| {
            warn!(target: "common.key_set_cache", error = %e, "Key set fetch failed, keeping current keys");
            e
        })?;

        let map = build_key_map(key_set);
        let count = map.len();

        *self.current.write().await = Some(Arc::new(map));

        info!(target: "common.key_set_cache", key_count = count, "Key set cache refreshed");
        Ok(count)
    }

    /// Resolve `kid` to a verification key.
    ///
    /// # Errors
    ///
    /// - `KeySetUnavailable` if the cache is empty and the initial fetch fails
    /// - `UnknownKey` if the kid is absent after any permitted refill
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn lookup(&self, kid: &str) -> Result<DecodingKey, LookupError> {
        let map = match self.snapshot().await {
            Some(map) => map,
            None => self.populate().await?,
        };

        if let Some(key) = map.get(kid) {
            return Ok(key.clone());
        }

        debug!(target: "common.key_set_cache", kid = %kid, "Key not in cache, attempting refill");
        let map = self.refill_after_miss().await;
        map.get(kid).cloned().ok_or_else(|| {
            debug!(target: "common.key_set_cache", kid = %kid, "Key not found after refill");
            LookupError::UnknownKey
        })
    }

    /// Whether at least one refresh has succeeded.
    pub async fn is_populated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Key ids in the current map, sorted.
    pub async fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self
            .snapshot()
            .await
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        kids.sort();
        kids
    }

    /// Spawn the scheduled refresh loop.
    ///
    /// The first refresh fires one full interval after the call; the loop
    /// exits when `cancel_token` is cancelled.
    pub fn spawn_refresh_task(
        self: &Arc<Self>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = self.config.refresh_interval;

        tokio::spawn(async move {
            info!(
                target: "common.key_set_cache",
                interval_seconds = period.as_secs(),
                "Starting scheduled key set refresh"
            );

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!(target: "common.key_set_cache", "Scheduled key set refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        // refresh() already logged the failure
                        let _ = cache.refresh().await;
                    }
                }
            }
        })
    }

    async fn snapshot(&self) -> Option<Arc<KeyMap>> {
        self.current.read().await.clone()
    }

    /// First-use population. Concurrent callers wait for one fetch.
    async fn populate(&self) -> Result<Arc<KeyMap>, LookupError> {
        let _guard = self.refill.lock().await;

        if let Some(map) = self.snapshot().await {
            return Ok(map);
        }

        self.refresh().await.map_err(|_| LookupError::KeySetUnavailable)?;
        self.snapshot().await.ok_or(LookupError::KeySetUnavailable)
    }

    /// Lazy refill after a miss, rate limited by the cooldown.
    ///
    /// Always returns the newest map available, refreshed or not.
    async fn refill_after_miss(&self) -> Arc<KeyMap> {
        let mut last_refill = self.refill.lock().await;
        let now = Instant::now();

        let cooling_down = last_refill
            .is_some_and(|at| now.saturating_duration_since(at) < self.config.miss_refill_cooldown);

        if cooling_down {
            debug!(target: "common.key_set_cache", "Refill skipped, cooldown active");
        } else {
            *last_refill = Some(now);
            // Failure keeps the stale map; refresh() logs it
            let _ = self.refresh().await;
        }

        self.snapshot().await.unwrap_or_default()
    }
}

/// Convert a key-set document into a map, skipping unusable entries.
fn build_key_map(key_set: KeySet) -> KeyMap {
    key_set
        .keys
        .into_iter()
        .filter_map(|jwk| match jwk.decoding_key() {
            Ok(key) => Some((jwk.kid, key)),
            Err(e) => {
                warn!(
                    target: "common.key_set_cache",
                    kid = %jwk.kid,
                    error = %e,
                    "Skipping unusable key set entry"
                );
                None
            }
        })
        .collect()
}
