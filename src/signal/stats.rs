//! Robust descriptive statistics over a sale-price series.
//!
//! Everything here is outlier-aware: windows are winsorized at the
//! 5th/95th percentiles before any median is taken, and dispersion is
//! measured with MAD rather than standard deviation. Extreme single
//! sales are clamped, not discarded, so volume counts survive intact.

use chrono::{DateTime, Utc};

use crate::types::{BasicStats, PriceSeries};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Winsorization bounds (clamp below/above these percentiles).
const WINSOR_LOW: f64 = 0.05;
const WINSOR_HIGH: f64 = 0.95;

/// Below this many samples the percentile bounds are not meaningful and
/// winsorization is skipped entirely.
const MIN_WINSOR_SAMPLES: usize = 10;

/// Sales count at which the liquidity score saturates to 1.0.
const LIQUIDITY_SATURATION: f64 = 10.0;

/// Momentum blend weights.
const MOMENTUM_W_PCT5: f64 = 0.5;
const MOMENTUM_W_PCT30: f64 = 0.3;
const MOMENTUM_W_LIQUIDITY: f64 = 0.2;
const MOMENTUM_W_INSTABILITY: f64 = 0.2;

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Textbook median: the middle order statistic, or the mean of the two
/// middle ones for even lengths. Returns 0.0 for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Clamp values below the 5th / above the 95th percentile to those bounds.
///
/// Bounds are order statistics (ceil of the low rank, floor of the high
/// rank), so re-winsorizing an already-winsorized list is a no-op. Order
/// is preserved and nothing is dropped — the return includes how many
/// values were clamped. Windows smaller than `MIN_WINSOR_SAMPLES` pass
/// through untouched.
pub fn winsorize(values: &[f64]) -> (Vec<f64>, usize) {
    if values.len() < MIN_WINSOR_SAMPLES {
        return (values.to_vec(), 0);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let low_idx = ((n - 1) as f64 * WINSOR_LOW).ceil() as usize;
    let high_idx = ((n - 1) as f64 * WINSOR_HIGH).floor() as usize;
    let low = sorted[low_idx];
    let high = sorted[high_idx];

    let mut clamped = 0usize;
    let out = values
        .iter()
        .map(|&v| {
            if v < low {
                clamped += 1;
                low
            } else if v > high {
                clamped += 1;
                high
            } else {
                v
            }
        })
        .collect();

    (out, clamped)
}

/// Median absolute deviation around a given center.
pub fn mad(values: &[f64], center: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Relative change `(current - previous) / previous`, 0 on a zero base.
fn pct_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous
    }
}

// ---------------------------------------------------------------------------
// BasicStats computation
// ---------------------------------------------------------------------------

/// Compute the full statistics snapshot for one card + market kind.
///
/// `now` anchors the trailing 5/30/90-day windows (inclusive of `now`).
/// An empty series yields an all-zero snapshot — insufficient data is a
/// representable state here, never an error.
pub fn compute_basic_stats(series: &PriceSeries, now: DateTime<Utc>) -> BasicStats {
    if series.is_empty() {
        return BasicStats::default();
    }

    let w5 = series.prices_in_trailing_days(5, now);
    let w30 = series.prices_in_trailing_days(30, now);
    let w90 = series.prices_in_trailing_days(90, now);

    let sales_5d = w5.len();
    let sales_30d = w30.len();
    let sales_90d = w90.len();

    let (w5_clamped, _) = winsorize(&w5);
    let (w30_clamped, outliers_clamped) = winsorize(&w30);
    let (w90_clamped, _) = winsorize(&w90);

    let median_5d = median(&w5_clamped);
    let median_30d = median(&w30_clamped);
    let median_90d = median(&w90_clamped);

    let pct_5d = pct_change(median_5d, median_30d);
    let pct_30d = pct_change(median_30d, median_90d);

    let mad_30d = mad(&w30_clamped, median_30d);
    let volatility_30d = if median_30d == 0.0 {
        0.0
    } else {
        mad_30d / median_30d
    };

    let liquidity = (sales_30d as f64 / LIQUIDITY_SATURATION).clamp(0.0, 1.0);
    let stability = 1.0 - volatility_30d.clamp(0.0, 1.0);

    let momentum = MOMENTUM_W_PCT5 * pct_5d + MOMENTUM_W_PCT30 * pct_30d
        + MOMENTUM_W_LIQUIDITY * liquidity
        - MOMENTUM_W_INSTABILITY * (1.0 - stability);

    BasicStats {
        median_5d,
        median_30d,
        median_90d,
        pct_5d,
        pct_30d,
        sales_5d,
        sales_30d,
        sales_90d,
        volatility_30d,
        liquidity,
        stability,
        momentum,
        outliers_clamped,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketKind, SaleObservation, SourceTag};
    use chrono::{Duration, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn series(points: &[(i64, f64)]) -> PriceSeries {
        let now = fixed_now();
        PriceSeries::from_observations(
            points
                .iter()
                .map(|&(days_ago, price)| SaleObservation {
                    timestamp: now - Duration::days(days_ago),
                    price,
                    kind: MarketKind::Raw,
                    source: SourceTag::Tracker,
                })
                .collect(),
        )
    }

    // -- Median tests --

    #[test]
    fn test_median_even_length() {
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_median_odd_length() {
        assert!((median(&[5.0, 1.0, 3.0]) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_median_single() {
        assert_eq!(median(&[42.0]), 42.0);
    }

    #[test]
    fn test_median_empty() {
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_median_unsorted_input() {
        assert!((median(&[9.0, 2.0, 7.0, 4.0]) - 5.5).abs() < 1e-10);
    }

    // -- Winsorize tests --

    #[test]
    fn test_winsorize_clamps_spike() {
        // 20 ordinary sales around $10 (pairwise duplicated so the low
        // bound sits on the minimum) plus one $500 spike
        let mut values: Vec<f64> = (0..20).map(|i| 10.0 + (i / 2) as f64 * 0.1).collect();
        values.push(500.0);
        let (clamped, count) = winsorize(&values);
        assert_eq!(count, 1);
        let max = clamped.iter().cloned().fold(f64::MIN, f64::max);
        assert!(max < 500.0, "spike should be clamped, got {max}");
        // Volume preserved
        assert_eq!(clamped.len(), values.len());
    }

    #[test]
    fn test_winsorize_idempotent() {
        let values: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 100.0];
        let (once, _) = winsorize(&values);
        let (twice, clamped_again) = winsorize(&once);
        assert_eq!(once, twice);
        assert_eq!(clamped_again, 0);
    }

    #[test]
    fn test_winsorize_preserves_order() {
        let values = vec![100.0, 5.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let (clamped, count) = winsorize(&values);
        // The spike is clamped down to the high bound but stays first
        assert_eq!(count, 1);
        assert_eq!(clamped[0], 12.0);
        assert_eq!(clamped[1..], values[1..]);
    }

    #[test]
    fn test_winsorize_small_window_untouched() {
        let small = vec![1.0, 100.0, 3.0, 4.0];
        let (out, count) = winsorize(&small);
        assert_eq!(out, small);
        assert_eq!(count, 0);
        let (out, count) = winsorize(&[]);
        assert!(out.is_empty());
        assert_eq!(count, 0);
    }

    // -- MAD tests --

    #[test]
    fn test_mad_basic() {
        // values 1..5, center 3 → deviations [2,1,0,1,2] → median 1
        let m = mad(&[1.0, 2.0, 3.0, 4.0, 5.0], 3.0);
        assert!((m - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_mad_empty() {
        assert_eq!(mad(&[], 0.0), 0.0);
    }

    #[test]
    fn test_mad_constant_series_is_zero() {
        assert_eq!(mad(&[7.0, 7.0, 7.0], 7.0), 0.0);
    }

    // -- pct_change tests --

    #[test]
    fn test_pct_change_zero_base() {
        assert_eq!(pct_change(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_pct_change_up_and_down() {
        assert!((pct_change(11.0, 10.0) - 0.1).abs() < 1e-10);
        assert!((pct_change(9.0, 10.0) + 0.1).abs() < 1e-10);
    }

    // -- compute_basic_stats tests --

    #[test]
    fn test_empty_series_all_zero() {
        let stats = compute_basic_stats(&PriceSeries::new(), fixed_now());
        assert_eq!(stats, BasicStats::default());
    }

    #[test]
    fn test_window_counts() {
        let s = series(&[(1, 10.0), (3, 11.0), (10, 12.0), (40, 13.0), (80, 14.0), (120, 15.0)]);
        let stats = compute_basic_stats(&s, fixed_now());
        assert_eq!(stats.sales_5d, 2);
        assert_eq!(stats.sales_30d, 3);
        assert_eq!(stats.sales_90d, 5);
    }

    #[test]
    fn test_medians_per_window() {
        // 5d window: [10, 12] → 11; 30d adds 20 → median 12; 90d adds 30, 40
        let s = series(&[(1, 10.0), (2, 12.0), (10, 20.0), (50, 30.0), (60, 40.0)]);
        let stats = compute_basic_stats(&s, fixed_now());
        assert!((stats.median_5d - 11.0).abs() < 1e-10);
        assert!((stats.median_30d - 12.0).abs() < 1e-10);
        assert!((stats.median_90d - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_pct_deltas_compare_adjacent_windows() {
        let s = series(&[(1, 12.0), (10, 10.0), (50, 8.0)]);
        let stats = compute_basic_stats(&s, fixed_now());
        // median_5d=12, median_30d=(12+10)/2=11, median_90d=10
        assert!((stats.pct_5d - (12.0 - 11.0) / 11.0).abs() < 1e-10);
        assert!((stats.pct_30d - (11.0 - 10.0) / 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_volatility_zero_for_constant_prices() {
        let s = series(&[(1, 10.0), (5, 10.0), (10, 10.0), (20, 10.0)]);
        let stats = compute_basic_stats(&s, fixed_now());
        assert_eq!(stats.volatility_30d, 0.0);
        assert_eq!(stats.stability, 1.0);
    }

    #[test]
    fn test_liquidity_saturates_at_ten_sales() {
        let points: Vec<(i64, f64)> = (1..=15).map(|d| (d, 10.0)).collect();
        let stats = compute_basic_stats(&series(&points), fixed_now());
        assert_eq!(stats.sales_30d, 15);
        assert_eq!(stats.liquidity, 1.0);
    }

    #[test]
    fn test_liquidity_partial() {
        let s = series(&[(1, 10.0), (2, 10.0), (3, 10.0), (4, 10.0)]);
        let stats = compute_basic_stats(&s, fixed_now());
        assert!((stats.liquidity - 0.4).abs() < 1e-10);
    }

    #[test]
    fn test_momentum_formula() {
        let s = series(&[(1, 12.0), (10, 10.0), (50, 8.0)]);
        let stats = compute_basic_stats(&s, fixed_now());
        let expected = 0.5 * stats.pct_5d + 0.3 * stats.pct_30d + 0.2 * stats.liquidity
            - 0.2 * (1.0 - stats.stability);
        assert!((stats.momentum - expected).abs() < 1e-10);
    }

    #[test]
    fn test_momentum_bounds() {
        // With pct in [-1, 1] and liquidity/stability in [0, 1] the blend
        // stays within [-1.5, 1.0]
        for pct5 in [-1.0, -0.5, 0.0, 0.5, 1.0] {
            for pct30 in [-1.0, 0.0, 1.0] {
                for liq in [0.0, 0.5, 1.0] {
                    for stab in [0.0, 0.5, 1.0] {
                        let m: f64 = 0.5 * pct5 + 0.3 * pct30 + 0.2 * liq - 0.2 * (1.0 - stab);
                        assert!(m.is_finite());
                        assert!((-1.5..=1.0).contains(&m), "momentum {m} out of bounds");
                    }
                }
            }
        }
    }

    #[test]
    fn test_single_spike_suppressed_by_winsorization() {
        // Ten sales at ~$10, one at $1000; the median must stay near $10
        // and the spike must be reported as clamped
        let mut points: Vec<(i64, f64)> = (1..=10).map(|d| (d, 10.0)).collect();
        points.push((12, 1000.0));
        let stats = compute_basic_stats(&series(&points), fixed_now());
        assert!(stats.median_30d < 15.0, "median {}", stats.median_30d);
        assert_eq!(stats.outliers_clamped, 1);
        assert_eq!(stats.sales_30d, 11); // the spike still counts as volume
    }
}
