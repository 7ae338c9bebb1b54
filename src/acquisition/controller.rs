//! Acquisition controller — the caller protocol over cache, throttle,
//! and quota.
//!
//! Before any network call: cache first; on a miss, check throttle
//! eligibility and quota headroom; if blocked, serve the last-known
//! (possibly stale) payload rather than failing outright. An eligible
//! attempt is bounded by a timeout, then both stores are written based
//! on the outcome — cache only on success, throttle always. Writes only
//! happen after the attempt fully completes, so an abandoned fetch never
//! leaves partial state behind.
//!
//! Concurrent callers on the same key may race between the eligibility
//! read and the write-back. That is accepted: a double fetch costs one
//! quota unit, not correctness, and is never worth a blocking lock
//! against a non-transactional upstream.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::acquisition::cache::{CacheEntry, CacheKey, FetchKind, DEFAULT_MAX_AGE_MINUTES};
use crate::acquisition::quota::{today_local, QuotaManager, QuotaStatus};
use crate::acquisition::throttle::{AttemptOutcome, ThrottleState};
use crate::sources::{PriceSource, SourceError};
use crate::storage::AcquisitionStore;
use crate::types::CardKey;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Cache validity window.
    pub cache_max_age_minutes: i64,
    /// Upper bound on a single fetch; a timed-out fetch is classified as
    /// a plain failure for throttle purposes.
    pub fetch_timeout_secs: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            cache_max_age_minutes: DEFAULT_MAX_AGE_MINUTES,
            fetch_timeout_secs: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Result of one acquisition
// ---------------------------------------------------------------------------

/// What the controller could supply for a key, best first.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    /// Served from cache within its validity window.
    Fresh { payload: serde_json::Value },
    /// Fetched from the upstream just now.
    Refreshed { payload: serde_json::Value },
    /// Upstream unavailable (backed off, quota, or failure) — last-known
    /// stale payload.
    Stale { payload: serde_json::Value },
    /// Nothing cached and the upstream could not be asked or failed.
    Unavailable,
}

impl Acquisition {
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Acquisition::Fresh { payload }
            | Acquisition::Refreshed { payload }
            | Acquisition::Stale { payload } => Some(payload),
            Acquisition::Unavailable => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Acquisition::Fresh { .. } => "fresh",
            Acquisition::Refreshed { .. } => "refreshed",
            Acquisition::Stale { .. } => "stale",
            Acquisition::Unavailable => "unavailable",
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct AcquisitionController {
    store: Arc<dyn AcquisitionStore>,
    source: Arc<dyn PriceSource>,
    quota: Mutex<QuotaManager>,
    config: AcquisitionConfig,
}

impl AcquisitionController {
    pub fn new(
        store: Arc<dyn AcquisitionStore>,
        source: Arc<dyn PriceSource>,
        quota: QuotaManager,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            store,
            source,
            quota: Mutex::new(quota),
            config,
        }
    }

    /// Acquire the payload for one card + kind, walking the full
    /// cache → throttle → quota → fetch protocol.
    pub async fn acquire(&self, key: &CardKey, kind: FetchKind) -> Result<Acquisition> {
        self.acquire_at(key, kind, Utc::now(), today_local()).await
    }

    /// As `acquire`, with explicit clock inputs (test seam).
    pub async fn acquire_at(
        &self,
        key: &CardKey,
        kind: FetchKind,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<Acquisition> {
        let cache_key = CacheKey::new(key.clone(), kind);

        // 1. Cache first.
        let cached = self.store.get_cache(&cache_key).await?;
        if let Some(entry) = &cached {
            if entry.is_fresh(self.config.cache_max_age_minutes, now) {
                debug!(key = %cache_key, age_min = entry.age_minutes(now), "Cache hit");
                return Ok(Acquisition::Fresh {
                    payload: entry.payload.clone(),
                });
            }
        }

        // 2. Throttle gate.
        let mut throttle = self
            .store
            .get_throttle(key)
            .await?
            .unwrap_or_else(|| ThrottleState::new(key.clone()));
        if !throttle.is_eligible(now) {
            debug!(
                key = %cache_key,
                next_earliest = ?throttle.next_earliest,
                "Backed off, serving last-known payload"
            );
            return Ok(Self::last_known(cached));
        }

        // 3. Quota gate.
        if !self.quota.lock().await.can_make_request(today) {
            warn!(key = %cache_key, "Daily quota exhausted, serving last-known payload");
            return Ok(Self::last_known(cached));
        }

        // 4. Bounded attempt.
        let started = std::time::Instant::now();
        let fetch = tokio::time::timeout(
            std::time::Duration::from_secs(self.config.fetch_timeout_secs),
            self.source.fetch(key),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (outcome, payload) = match fetch {
            Ok(Ok(payload)) => (AttemptOutcome::Success, Some(payload)),
            Ok(Err(SourceError::RateLimited)) => {
                warn!(key = %cache_key, "Upstream rate limit hit");
                (AttemptOutcome::RateLimited, None)
            }
            Ok(Err(e)) => {
                warn!(key = %cache_key, error = %e, "Fetch failed");
                (AttemptOutcome::Failed, None)
            }
            Err(_) => {
                warn!(
                    key = %cache_key,
                    timeout_secs = self.config.fetch_timeout_secs,
                    "Fetch timed out"
                );
                (AttemptOutcome::Failed, None)
            }
        };

        // 5. Write-back: throttle always, cache on success, quota always.
        throttle.record(outcome, now);
        self.store.put_throttle(&throttle).await?;

        let result = match payload {
            Some(payload) => {
                let value = serde_json::to_value(&payload)?;
                self.store
                    .put_cache(&CacheEntry::new(cache_key.clone(), value.clone(), now))
                    .await?;
                debug!(key = %cache_key, elapsed_ms, "Fetched and cached");
                Acquisition::Refreshed { payload: value }
            }
            None => Self::last_known(cached),
        };

        self.quota.lock().await.record_request(
            &kind.to_string(),
            outcome == AttemptOutcome::Success,
            elapsed_ms,
            today,
        );

        Ok(result)
    }

    fn last_known(cached: Option<CacheEntry>) -> Acquisition {
        match cached {
            Some(entry) => Acquisition::Stale {
                payload: entry.payload,
            },
            None => Acquisition::Unavailable,
        }
    }

    /// Current quota snapshot.
    pub async fn quota_status(&self) -> QuotaStatus {
        self.quota.lock().await.status()
    }

    /// (status, success rate, average latency) over the rolling log.
    pub async fn quota_summary(&self) -> (QuotaStatus, f64, f64) {
        let quota = self.quota.lock().await;
        (
            quota.status(),
            quota.success_rate(),
            quota.average_latency_ms(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
