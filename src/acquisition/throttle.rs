//! Per-card backoff state machine.
//!
//! Guards the metered pricing API: a key is either eligible (no record,
//! or its backoff has expired) or backed off. Every attempt outcome
//! schedules the next earliest attempt — a long pause after success,
//! a medium one after an upstream rate limit, a short one after any
//! other failure. Timeouts are classified as failures by the caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::CardKey;

/// Successful fetches are not repeated for a day.
pub const SUCCESS_BACKOFF_HOURS: i64 = 24;

/// Upstream said slow down: wait an hour.
pub const RATE_LIMIT_BACKOFF_MINUTES: i64 = 60;

/// Transient failure: retry after a short pause.
pub const ERROR_BACKOFF_MINUTES: i64 = 15;

/// How an attempt against the upstream API ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    /// Any other error, including timeouts.
    Failed,
}

impl AttemptOutcome {
    /// The pause this outcome schedules before the next attempt.
    pub fn backoff(&self) -> Duration {
        match self {
            AttemptOutcome::Success => Duration::hours(SUCCESS_BACKOFF_HOURS),
            AttemptOutcome::RateLimited => Duration::minutes(RATE_LIMIT_BACKOFF_MINUTES),
            AttemptOutcome::Failed => Duration::minutes(ERROR_BACKOFF_MINUTES),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::RateLimited => write!(f, "rate-limited"),
            AttemptOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Backoff record for one card key. Created on first attempt, updated
/// after every attempt, read before every attempt to gate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleState {
    pub key: CardKey,
    pub last_attempt: Option<DateTime<Utc>>,
    pub next_earliest: Option<DateTime<Utc>>,
    pub last_status: Option<AttemptOutcome>,
    pub attempts: u32,
}

impl ThrottleState {
    pub fn new(key: CardKey) -> Self {
        Self {
            key,
            last_attempt: None,
            next_earliest: None,
            last_status: None,
            attempts: 0,
        }
    }

    /// Eligible when there is no schedule yet, or the backoff expired
    /// (`now >= next_earliest`).
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.next_earliest.map(|t| now >= t).unwrap_or(true)
    }

    /// Record an attempt outcome and schedule the next earliest attempt.
    pub fn record(&mut self, outcome: AttemptOutcome, now: DateTime<Utc>) {
        self.last_attempt = Some(now);
        self.last_status = Some(outcome);
        self.attempts += 1;
        self.next_earliest = Some(now + outcome.backoff());
    }
}

impl fmt::Display for ThrottleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts={} last={} next_earliest={}",
            self.key,
            self.attempts,
            self.last_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "never".into()),
            self.next_earliest
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "now".into()),
        )
    }
}
