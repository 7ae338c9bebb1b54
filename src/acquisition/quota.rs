//! Daily quota accounting for the metered pricing API.
//!
//! Tracks call volume against the configured daily limit and raises
//! graduated alerts as thresholds are crossed. The counter resets when
//! the local calendar date changes, detected lazily on each call — no
//! background timer. Exhaustion is a status value, not an error:
//! callers check `can_make_request` and skip work.
//!
//! This is an explicit state object passed around by the owner, never a
//! module-level singleton, so tests can run independent instances in
//! parallel.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{info, warn};

/// Today in the machine's local timezone (quota days are local days).
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Graduated quota pressure levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaHealth {
    Healthy,
    Warning,
    Critical,
    Emergency,
    Exhausted,
}

impl fmt::Display for QuotaHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaHealth::Healthy => write!(f, "healthy"),
            QuotaHealth::Warning => write!(f, "warning"),
            QuotaHealth::Critical => write!(f, "critical"),
            QuotaHealth::Emergency => write!(f, "emergency"),
            QuotaHealth::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Point-in-time quota snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub used: u32,
    pub remaining: u32,
    pub percentage: f64,
    pub health: QuotaHealth,
}

impl fmt::Display for QuotaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} used ({:.0}%, {})",
            self.used,
            self.used + self.remaining,
            self.percentage,
            self.health,
        )
    }
}

/// Percentage thresholds for the graduated statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaThresholds {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl Default for QuotaThresholds {
    fn default() -> Self {
        Self {
            warning: 80.0,
            critical: 90.0,
            emergency: 95.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Request log
// ---------------------------------------------------------------------------

/// One recorded request, kept in the bounded diagnostics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub endpoint: String,
    pub success: bool,
    pub response_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Alert callback, fired once per recorded request whenever the status
/// is anything other than healthy. Not deduplicated — debouncing is the
/// subscriber's job.
pub type QuotaAlertFn = Box<dyn Fn(&QuotaStatus) + Send + Sync>;

/// Default bound on the rolling request log.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

pub struct QuotaManager {
    daily_limit: u32,
    thresholds: QuotaThresholds,
    used: u32,
    day: NaiveDate,
    log: VecDeque<RequestRecord>,
    log_capacity: usize,
    alert: Option<QuotaAlertFn>,
}

impl QuotaManager {
    pub fn new(daily_limit: u32, thresholds: QuotaThresholds, today: NaiveDate) -> Self {
        Self {
            daily_limit,
            thresholds,
            used: 0,
            day: today,
            log: VecDeque::new(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            alert: None,
        }
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    pub fn with_alert(mut self, alert: impl Fn(&QuotaStatus) + Send + Sync + 'static) -> Self {
        self.alert = Some(Box::new(alert));
        self
    }

    /// Lazy day rollover: reset the counter when the local date moved on.
    fn roll_day(&mut self, today: NaiveDate) {
        if today != self.day {
            info!(
                previous_day = %self.day,
                used = self.used,
                "Quota day rolled over, counter reset"
            );
            self.day = today;
            self.used = 0;
        }
    }

    /// Whether a further request fits under today's limit.
    pub fn can_make_request(&mut self, today: NaiveDate) -> bool {
        self.roll_day(today);
        self.used < self.daily_limit
    }

    /// Record one request and return the resulting status. Alerts fire
    /// here for every non-healthy status.
    pub fn record_request(
        &mut self,
        endpoint: &str,
        success: bool,
        response_time_ms: u64,
        today: NaiveDate,
    ) -> QuotaStatus {
        self.roll_day(today);
        self.used += 1;

        if self.log.len() >= self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(RequestRecord {
            endpoint: endpoint.to_string(),
            success,
            response_time_ms,
        });

        let status = self.status();
        if status.health != QuotaHealth::Healthy {
            warn!(
                used = status.used,
                remaining = status.remaining,
                health = %status.health,
                "API quota pressure"
            );
            if let Some(alert) = &self.alert {
                alert(&status);
            }
        }
        status
    }

    /// Current snapshot without recording anything.
    pub fn status(&self) -> QuotaStatus {
        let percentage = if self.daily_limit == 0 {
            100.0
        } else {
            self.used as f64 / self.daily_limit as f64 * 100.0
        };
        let health = if percentage >= 100.0 {
            QuotaHealth::Exhausted
        } else if percentage >= self.thresholds.emergency {
            QuotaHealth::Emergency
        } else if percentage >= self.thresholds.critical {
            QuotaHealth::Critical
        } else if percentage >= self.thresholds.warning {
            QuotaHealth::Warning
        } else {
            QuotaHealth::Healthy
        };
        QuotaStatus {
            used: self.used,
            remaining: self.daily_limit.saturating_sub(self.used),
            percentage,
            health,
        }
    }

    // -- Diagnostics over the rolling log --------------------------------

    /// Fraction of logged requests that succeeded (0.0 when log empty).
    pub fn success_rate(&self) -> f64 {
        if self.log.is_empty() {
            return 0.0;
        }
        let ok = self.log.iter().filter(|r| r.success).count();
        ok as f64 / self.log.len() as f64
    }

    /// Mean latency over the logged requests (0.0 when log empty).
    pub fn average_latency_ms(&self) -> f64 {
        if self.log.is_empty() {
            return 0.0;
        }
        let total: u64 = self.log.iter().map(|r| r.response_time_ms).sum();
        total as f64 / self.log.len() as f64
    }

    /// Most frequently hit endpoints, descending.
    pub fn top_endpoints(&self, n: usize) -> Vec<(String, usize)> {
        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for record in &self.log {
            *counts.entry(record.endpoint.as_str()).or_default() += 1;
        }
        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(endpoint, count)| (endpoint.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
