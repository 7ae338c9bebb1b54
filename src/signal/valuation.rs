//! Fee-tiered grading economics.
//!
//! Converts raw/graded price pairs into spread after fees, grading
//! expected value, and upside. Fee tiers are contiguous, exhaustive
//! `[min, max)` value bands — a card at exactly a boundary lands in the
//! higher tier — and the tier is selected solely by the raw card value.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::ValuationResult;

// ---------------------------------------------------------------------------
// Fee schedule
// ---------------------------------------------------------------------------

/// One fee band: flat grading fee, flat shipping, percentage marketplace fee.
#[derive(Debug, Clone)]
pub struct FeeTier {
    pub name: &'static str,
    /// Inclusive lower bound of the value band.
    pub min_value: Decimal,
    /// Exclusive upper bound; `None` = unbounded.
    pub max_value: Option<Decimal>,
    pub grading_fee: Decimal,
    pub shipping: Decimal,
    pub marketplace_rate: Decimal,
}

/// Ordered, contiguous fee bands covering all card values.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    tiers: Vec<FeeTier>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            tiers: vec![
                FeeTier {
                    name: "value",
                    min_value: Decimal::ZERO,
                    max_value: Some(dec!(200)),
                    grading_fee: dec!(18.99),
                    shipping: dec!(4.99),
                    marketplace_rate: dec!(0.1325),
                },
                FeeTier {
                    name: "regular",
                    min_value: dec!(200),
                    max_value: Some(dec!(1000)),
                    grading_fee: dec!(39.99),
                    shipping: dec!(9.99),
                    marketplace_rate: dec!(0.1325),
                },
                FeeTier {
                    name: "express",
                    min_value: dec!(1000),
                    max_value: None,
                    grading_fee: dec!(74.99),
                    shipping: dec!(19.99),
                    marketplace_rate: dec!(0.125),
                },
            ],
        }
    }
}

impl FeeSchedule {
    /// Build a schedule from explicit tiers; an empty list falls back to
    /// the default schedule so `tier_for` always has a band to land in.
    pub fn new(tiers: Vec<FeeTier>) -> Self {
        if tiers.is_empty() {
            Self::default()
        } else {
            Self { tiers }
        }
    }

    pub fn tiers(&self) -> &[FeeTier] {
        &self.tiers
    }

    /// The tier whose `[min, max)` band contains `card_value`.
    /// Negative values are treated as zero.
    pub fn tier_for(&self, card_value: Decimal) -> &FeeTier {
        let value = card_value.max(Decimal::ZERO);
        self.tiers
            .iter()
            .find(|t| {
                value >= t.min_value && t.max_value.map(|max| value < max).unwrap_or(true)
            })
            .unwrap_or(&self.tiers[self.tiers.len() - 1])
    }

    /// Flat fees plus the percentage marketplace fee on the card value.
    pub fn total_fees(&self, card_value: Decimal) -> Decimal {
        let tier = self.tier_for(card_value);
        tier.grading_fee + tier.shipping + card_value * tier.marketplace_rate
    }

    /// The all-in cost of getting one card graded (no marketplace cut).
    pub fn grade_cost_all_in(&self, card_value: Decimal) -> Decimal {
        let tier = self.tier_for(card_value);
        tier.grading_fee + tier.shipping
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Default haircut on the non-gem (PSA 9) outcome.
const DEFAULT_PSA9_HAIRCUT: Decimal = dec!(0.9);

pub struct ValuationCalculator {
    fees: FeeSchedule,
    /// `k` in the EV formula — discount applied to the PSA-9 outcome.
    psa9_haircut: Decimal,
}

impl Default for ValuationCalculator {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            psa9_haircut: DEFAULT_PSA9_HAIRCUT,
        }
    }
}

impl ValuationCalculator {
    pub fn new(fees: FeeSchedule, psa9_haircut: Decimal) -> Self {
        Self { fees, psa9_haircut }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// `psa10 - (raw + total_fees(raw))`. `None` when either price is
    /// missing or non-positive.
    pub fn spread_after_fees(
        &self,
        psa10_price: Option<f64>,
        raw_price: Option<f64>,
    ) -> Option<Decimal> {
        let psa10 = to_positive_decimal(psa10_price)?;
        let raw = to_positive_decimal(raw_price)?;
        Some(psa10 - (raw + self.fees.total_fees(raw)))
    }

    /// `p10·psa10 + (1-p10)·psa9·k`. `None` when either graded price is
    /// missing — an explicit unknown rather than a fabricated PSA-9 value.
    pub fn ev_grade(
        &self,
        p10: f64,
        psa10_price: Option<f64>,
        psa9_price: Option<f64>,
    ) -> Option<Decimal> {
        let psa10 = to_positive_decimal(psa10_price)?;
        let psa9 = to_positive_decimal(psa9_price)?;
        let p = Decimal::from_f64(p10)?;
        Some(p * psa10 + (Decimal::ONE - p) * psa9 * self.psa9_haircut)
    }

    /// Full valuation for one card. The spread compares listed prices
    /// (`raw_price` from the normalizer); the EV figures anchor on the
    /// observed 30-day raw median. Each figure degrades to `None`
    /// independently when its inputs are missing.
    pub fn evaluate(
        &self,
        raw_price: Option<f64>,
        raw_median_30d: Option<f64>,
        psa10_price: Option<f64>,
        psa9_price: Option<f64>,
        p10: f64,
    ) -> ValuationResult {
        let raw = to_positive_decimal(raw_median_30d);

        let spread_after_fees = self.spread_after_fees(psa10_price, raw_price);
        let ev_grade = self.ev_grade(p10, psa10_price, psa9_price);

        let net_expected_value = match (ev_grade, raw) {
            (Some(ev), Some(r)) => Some(ev - r - self.fees.grade_cost_all_in(r)),
            _ => None,
        };

        let upside_pct = match (net_expected_value, raw) {
            (Some(net), Some(r)) => Some(net / r),
            _ => None,
        };

        let result = ValuationResult {
            spread_after_fees,
            ev_grade,
            net_expected_value,
            upside_pct,
        };
        debug!(valuation = %result, "Card valued");
        result
    }
}

/// Finite, strictly positive prices only; everything else is "missing".
fn to_positive_decimal(value: Option<f64>) -> Option<Decimal> {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .and_then(Decimal::from_f64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> ValuationCalculator {
        ValuationCalculator::default()
    }

    // -- Fee schedule --

    #[test]
    fn test_default_schedule_is_contiguous_and_exhaustive() {
        let schedule = FeeSchedule::default();
        let tiers = schedule.tiers();
        assert_eq!(tiers[0].min_value, Decimal::ZERO);
        for pair in tiers.windows(2) {
            assert_eq!(pair[0].max_value, Some(pair[1].min_value));
        }
        assert!(tiers.last().unwrap().max_value.is_none());
    }

    #[test]
    fn test_tier_boundary_goes_to_higher_tier() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.tier_for(dec!(199.99)).name, "value");
        assert_eq!(schedule.tier_for(dec!(200)).name, "regular");
        assert_eq!(schedule.tier_for(dec!(999.99)).name, "regular");
        assert_eq!(schedule.tier_for(dec!(1000)).name, "express");
    }

    #[test]
    fn test_tier_for_negative_value_clamps_to_first() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.tier_for(dec!(-10)).name, "value");
    }

    #[test]
    fn test_total_fees() {
        let schedule = FeeSchedule::default();
        // $100 card: 18.99 + 4.99 + 100 × 0.1325 = 37.23
        assert_eq!(schedule.total_fees(dec!(100)), dec!(37.23));
        // $500 card: 39.99 + 9.99 + 500 × 0.1325 = 116.23
        assert_eq!(schedule.total_fees(dec!(500)), dec!(116.23));
    }

    #[test]
    fn test_grade_cost_all_in() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.grade_cost_all_in(dec!(100)), dec!(23.98));
        assert_eq!(schedule.grade_cost_all_in(dec!(5000)), dec!(94.98));
    }

    // -- Spread --

    #[test]
    fn test_spread_after_fees() {
        // psa10 $450, raw $100 → 450 - (100 + 37.23) = 312.77
        let spread = calc().spread_after_fees(Some(450.0), Some(100.0)).unwrap();
        assert_eq!(spread, dec!(312.77));
    }

    #[test]
    fn test_spread_can_be_negative() {
        let spread = calc().spread_after_fees(Some(110.0), Some(100.0)).unwrap();
        assert!(spread < Decimal::ZERO);
    }

    #[test]
    fn test_spread_missing_inputs() {
        let c = calc();
        assert!(c.spread_after_fees(None, Some(100.0)).is_none());
        assert!(c.spread_after_fees(Some(450.0), None).is_none());
        assert!(c.spread_after_fees(Some(450.0), Some(0.0)).is_none());
        assert!(c.spread_after_fees(Some(f64::NAN), Some(100.0)).is_none());
    }

    // -- EV --

    #[test]
    fn test_ev_grade_formula() {
        // 0.25 × 400 + 0.75 × 120 × 0.9 = 100 + 81 = 181
        let ev = calc().ev_grade(0.25, Some(400.0), Some(120.0)).unwrap();
        assert_eq!(ev, dec!(181));
    }

    #[test]
    fn test_ev_grade_missing_psa9_is_unknown() {
        assert!(calc().ev_grade(0.25, Some(400.0), None).is_none());
    }

    #[test]
    fn test_custom_haircut() {
        let c = ValuationCalculator::new(FeeSchedule::default(), dec!(1.0));
        // No haircut: 0.5 × 200 + 0.5 × 100 = 150
        let ev = c.ev_grade(0.5, Some(200.0), Some(100.0)).unwrap();
        assert_eq!(ev, dec!(150));
    }

    // -- Full evaluation --

    #[test]
    fn test_evaluate_complete_inputs() {
        // listed raw $100, raw median $100, psa10 $400, psa9 $120, p10 0.25
        let v = calc().evaluate(Some(100.0), Some(100.0), Some(400.0), Some(120.0), 0.25);
        // ev = 181, cost all-in = 23.98 → net = 181 - 100 - 23.98 = 57.02
        assert_eq!(v.ev_grade, Some(dec!(181)));
        assert_eq!(v.net_expected_value, Some(dec!(57.02)));
        assert_eq!(v.upside_pct, Some(dec!(0.5702)));
        assert!(v.spread_after_fees.is_some());
    }

    #[test]
    fn test_evaluate_no_raw_data() {
        let v = calc().evaluate(None, None, Some(400.0), Some(120.0), 0.25);
        assert!(v.spread_after_fees.is_none());
        assert_eq!(v.ev_grade, Some(dec!(181))); // EV doesn't need raw
        assert!(v.net_expected_value.is_none());
        assert!(v.upside_pct.is_none());
    }

    #[test]
    fn test_evaluate_spread_and_net_use_their_own_raw() {
        // Listed price differs from the observed median: the spread uses
        // the listing, the net anchors on the median.
        let v = calc().evaluate(Some(100.0), Some(80.0), Some(400.0), Some(120.0), 0.25);
        // spread: 400 - (100 + 37.23) = 262.77
        assert_eq!(v.spread_after_fees, Some(dec!(262.77)));
        // net: 181 - 80 - 23.98 = 77.02
        assert_eq!(v.net_expected_value, Some(dec!(77.02)));
    }

    #[test]
    fn test_evaluate_nothing_known() {
        let v = calc().evaluate(None, None, None, None, 0.15);
        assert_eq!(v, ValuationResult::unknown());
    }

    #[test]
    fn test_evaluate_fields_degrade_independently() {
        // psa10 known, psa9 missing → spread yes, EV-derived figures no
        let v = calc().evaluate(Some(100.0), Some(100.0), Some(400.0), None, 0.25);
        assert!(v.spread_after_fees.is_some());
        assert!(v.ev_grade.is_none());
        assert!(v.net_expected_value.is_none());
        assert!(v.upside_pct.is_none());
    }
}
