//! Persistent TTL cache entries for fetched vendor payloads.
//!
//! Entries are written on every successful fetch and treated as valid
//! only while younger than the max age. Stale entries are never deleted
//! — they are superseded by the next successful write, and remain
//! available as a last-known fallback while a key is backed off.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::CardKey;

/// Default cache validity: one day.
pub const DEFAULT_MAX_AGE_MINUTES: i64 = 1440;

/// What a cached payload contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchKind {
    /// Price quote + sale observations.
    Prices,
    /// Grading population counts.
    Population,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchKind::Prices => write!(f, "prices"),
            FetchKind::Population => write!(f, "population"),
        }
    }
}

/// Cache key: one card, one payload kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub card: CardKey,
    pub kind: FetchKind,
}

impl CacheKey {
    pub fn new(card: CardKey, kind: FetchKind) -> Self {
        Self { card, kind }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.card, self.kind)
    }
}

/// One cached payload with its write timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, payload: serde_json::Value, fetched_at: DateTime<Utc>) -> Self {
        Self {
            key,
            payload,
            fetched_at,
        }
    }

    /// A hit requires `now - fetched_at < max_age` (strict).
    pub fn is_fresh(&self, max_age_minutes: i64, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < Duration::minutes(max_age_minutes)
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_minutes()
    }
}
