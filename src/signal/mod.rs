//! Signal engine — statistics, gem rate, valuation, and confidence.
//!
//! `SignalEngine` pipelines the four pure sub-modules into one composite
//! `CardSignal` per card, plus the badge flags the presentation layer
//! renders as chips.

pub mod confidence;
pub mod gemrate;
pub mod stats;
pub mod valuation;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::info;

use crate::types::{Badges, CardSignal, ConfidenceLevel, NormalizedCard, PriceSeries};
use gemrate::{GemRateContext, GemRateEstimator};
use stats::compute_basic_stats;
use valuation::ValuationCalculator;

// ---------------------------------------------------------------------------
// Badge thresholds
// ---------------------------------------------------------------------------

/// Fixed thresholds behind the boolean badge flags.
#[derive(Debug, Clone)]
pub struct BadgeConfig {
    /// Minimum 5-day raw delta for the momentum badge.
    pub momentum_min_pct_5d: f64,
    /// Minimum 5-day sale count for the momentum badge.
    pub momentum_min_sales_5d: usize,
    /// Minimum upside fraction for the grading-opportunity badge.
    pub grading_min_upside: f64,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            momentum_min_pct_5d: 0.10,
            momentum_min_sales_5d: 3,
            grading_min_upside: 0.35,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Composes stats → gem rate → valuation → confidence → badges.
///
/// Instantiate once and reuse; every build is a pure function of its
/// inputs plus the injected `now`.
pub struct SignalEngine {
    gemrate: GemRateEstimator,
    valuation: ValuationCalculator,
    badges: BadgeConfig,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self {
            gemrate: GemRateEstimator::new(Default::default()),
            valuation: ValuationCalculator::default(),
            badges: BadgeConfig::default(),
        }
    }
}

impl SignalEngine {
    pub fn new(
        gemrate: GemRateEstimator,
        valuation: ValuationCalculator,
        badges: BadgeConfig,
    ) -> Self {
        Self {
            gemrate,
            valuation,
            badges,
        }
    }

    /// Build the composite signal for one card.
    ///
    /// - Raw statistics drive confidence, momentum, and the EV anchor.
    /// - The PSA-10 price prefers observed grade-10 sales over the
    ///   normalizer's (possibly derived) graded price.
    /// - The PSA-9 price comes only from observed grade-9 sales.
    /// - No raw sales at all → confidence is absent ("Unknown" upstream).
    pub fn build(
        &self,
        card: &NormalizedCard,
        raw_series: &PriceSeries,
        grade9_series: &PriceSeries,
        grade10_series: &PriceSeries,
        gem_ctx: &GemRateContext,
        now: DateTime<Utc>,
    ) -> CardSignal {
        let stats = compute_basic_stats(raw_series, now);

        let confidence = if raw_series.is_empty() {
            None
        } else {
            Some(confidence::classify(stats.sales_30d, stats.volatility_30d))
        };

        let gem_rate = self.gemrate.estimate(gem_ctx);

        let grade10_stats = compute_basic_stats(grade10_series, now);
        let psa10_price = if grade10_stats.sales_30d > 0 {
            Some(grade10_stats.median_30d)
        } else {
            card.graded_price
        };

        let grade9_stats = compute_basic_stats(grade9_series, now);
        let psa9_price = (grade9_stats.sales_30d > 0).then_some(grade9_stats.median_30d);

        let raw_median_30d = (stats.median_30d > 0.0).then_some(stats.median_30d);
        let valuation = self.valuation.evaluate(
            card.raw_price,
            raw_median_30d,
            psa10_price,
            psa9_price,
            gem_rate.p10,
        );

        let badges = self.badge_flags(&stats, &valuation.upside_pct, confidence);

        let signal = CardSignal {
            identity: card.identity.clone(),
            stats,
            confidence,
            gem_rate,
            valuation,
            badges,
            computed_at: now,
        };
        info!(signal = %signal, "Signal built");
        signal
    }

    fn badge_flags(
        &self,
        stats: &crate::types::BasicStats,
        upside_pct: &Option<Decimal>,
        confidence: Option<ConfidenceLevel>,
    ) -> Badges {
        let momentum = stats.pct_5d >= self.badges.momentum_min_pct_5d
            && stats.sales_5d >= self.badges.momentum_min_sales_5d;

        let upside_cleared = match (upside_pct, Decimal::from_f64(self.badges.grading_min_upside)) {
            (Some(upside), Some(min)) => *upside >= min,
            _ => false,
        };
        let confidence_adequate = matches!(
            confidence,
            Some(ConfidenceLevel::High) | Some(ConfidenceLevel::Speculative)
        );

        Badges {
            momentum,
            grading_opportunity: upside_cleared && confidence_adequate,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
