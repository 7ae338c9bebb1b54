//! PSA-10 probability estimation.
//!
//! Blends three methods in strict precedence order — recent population
//! snapshot, historical population snapshot, set-level baseline — and
//! tags every estimate with the method that produced it. Population data
//! always beats the baseline, and recency always beats volume.

use std::collections::HashMap;
use tracing::debug;

use crate::types::{GemRateEstimate, GemRateMethod, PopulationSnapshot};

// ---------------------------------------------------------------------------
// Configuration (defaults — overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

/// Gem-rate estimation parameters.
///
/// The hard bounds encode the domain belief that grading outcomes are
/// never near-certain in either direction.
#[derive(Debug, Clone)]
pub struct GemRateConfig {
    /// Per-set baseline gem rates, keyed by lowercase set id.
    pub set_baselines: HashMap<String, f64>,
    /// Baseline for sets with no entry above.
    pub default_baseline: f64,
    /// Multiplier for special/alt-art card numbers.
    pub special_number_multiplier: f64,
    /// Multiplier for promotional sets.
    pub promo_set_multiplier: f64,
    /// Multiplier for cards younger than `fresh_age_days`.
    pub fresh_release_multiplier: f64,
    /// Multiplier for cards older than `vintage_age_days`.
    pub vintage_multiplier: f64,
    pub fresh_age_days: i64,
    pub vintage_age_days: i64,
    /// Hard bounds applied on every branch.
    pub min_p10: f64,
    pub max_p10: f64,
}

impl Default for GemRateConfig {
    fn default() -> Self {
        let mut set_baselines = HashMap::new();
        // Modern sharp-cut sets gem noticeably more often than vintage.
        set_baselines.insert("base1".to_string(), 0.08);
        set_baselines.insert("neo1".to_string(), 0.10);
        set_baselines.insert("swsh12pt5".to_string(), 0.22);
        set_baselines.insert("sv3pt5".to_string(), 0.25);

        Self {
            set_baselines,
            default_baseline: 0.15,
            special_number_multiplier: 1.2,
            promo_set_multiplier: 1.1,
            fresh_release_multiplier: 1.15,
            vintage_multiplier: 0.8,
            fresh_age_days: 30,
            vintage_age_days: 365 * 5,
            min_p10: 0.03,
            max_p10: 0.60,
        }
    }
}

// ---------------------------------------------------------------------------
// Estimation context
// ---------------------------------------------------------------------------

/// Static card attributes used by the set-default method.
#[derive(Debug, Clone, Default)]
pub struct CardAttributes {
    pub set_id: String,
    pub set_name: String,
    pub number: String,
    /// Days since the card's set released, when known.
    pub age_days: Option<i64>,
}

/// Everything the estimator may draw on. All fields optional — the
/// precedence order decides what actually gets used.
#[derive(Debug, Clone, Default)]
pub struct GemRateContext {
    pub recent: Option<PopulationSnapshot>,
    pub historical: Option<PopulationSnapshot>,
    pub attributes: Option<CardAttributes>,
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Pure estimator: identical inputs always yield identical outputs.
pub struct GemRateEstimator {
    config: GemRateConfig,
}

impl GemRateEstimator {
    pub fn new(config: GemRateConfig) -> Self {
        Self { config }
    }

    /// Access the estimator configuration.
    pub fn config(&self) -> &GemRateConfig {
        &self.config
    }

    /// Estimate the PSA-10 probability for one card.
    ///
    /// Precedence (first applicable wins):
    /// 1. recent snapshot with graded volume
    /// 2. historical snapshot with graded volume
    /// 3. set baseline adjusted by attribute modifiers
    pub fn estimate(&self, ctx: &GemRateContext) -> GemRateEstimate {
        if let Some(recent) = ctx.recent.filter(|s| s.total > 0) {
            let p10 = self.clamp(recent.gem_fraction());
            let confidence = (recent.total as f64 / 100.0).min(1.0);
            debug!(
                pop10 = recent.pop10,
                total = recent.total,
                p10,
                "Gem rate from recent population"
            );
            return GemRateEstimate {
                p10,
                method: GemRateMethod::RecentProxy,
                confidence,
            };
        }

        if let Some(historical) = ctx.historical.filter(|s| s.total > 0) {
            let p10 = self.clamp(historical.gem_fraction());
            let confidence = (historical.total as f64 / 300.0).min(1.0);
            debug!(
                pop10 = historical.pop10,
                total = historical.total,
                p10,
                "Gem rate from historical population"
            );
            return GemRateEstimate {
                p10,
                method: GemRateMethod::PopulationProxy,
                confidence,
            };
        }

        let p10 = self.clamp(self.baseline_estimate(ctx.attributes.as_ref()));
        debug!(p10, "Gem rate from set baseline");
        GemRateEstimate {
            p10,
            method: GemRateMethod::SetDefault,
            confidence: 0.2,
        }
    }

    /// Set baseline with multiplicative attribute modifiers.
    fn baseline_estimate(&self, attrs: Option<&CardAttributes>) -> f64 {
        let Some(attrs) = attrs else {
            return self.config.default_baseline;
        };

        let mut p10 = self
            .config
            .set_baselines
            .get(&attrs.set_id.to_lowercase())
            .copied()
            .unwrap_or(self.config.default_baseline);

        if is_special_number(&attrs.number) {
            p10 *= self.config.special_number_multiplier;
        }
        if attrs.set_name.to_lowercase().contains("promo") {
            p10 *= self.config.promo_set_multiplier;
        }
        if let Some(age) = attrs.age_days {
            if age < self.config.fresh_age_days {
                p10 *= self.config.fresh_release_multiplier;
            } else if age > self.config.vintage_age_days {
                p10 *= self.config.vintage_multiplier;
            }
        }

        p10
    }

    fn clamp(&self, p10: f64) -> f64 {
        p10.clamp(self.config.min_p10, self.config.max_p10)
    }
}

/// Special/alt-art numbering: anything beyond a plain integer
/// ("TG12", "SV49", "161a", "GG07") signals an alternate print run.
fn is_special_number(number: &str) -> bool {
    !number.is_empty() && !number.chars().all(|c| c.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
