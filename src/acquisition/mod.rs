//! Acquisition layer — the machinery guarding the metered pricing API.
//!
//! A persistent TTL cache, a per-card backoff state machine, the
//! controller composing them with a quota gate, and the quota manager
//! itself.

pub mod cache;
pub mod controller;
pub mod quota;
pub mod throttle;

pub use cache::{CacheEntry, CacheKey, FetchKind};
pub use controller::{Acquisition, AcquisitionConfig, AcquisitionController};
pub use quota::{QuotaHealth, QuotaManager, QuotaStatus, QuotaThresholds};
pub use throttle::{AttemptOutcome, ThrottleState};
