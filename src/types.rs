//! Shared types for the SLABSIGNAL engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that source, normalizer,
//! signal, and acquisition modules can depend on them without
//! circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market kind & source tags
// ---------------------------------------------------------------------------

/// Which market a sale belongs to: ungraded, PSA 9, or PSA 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketKind {
    Raw,
    Grade9,
    Grade10,
}

impl MarketKind {
    /// All known kinds (useful for iteration).
    pub const ALL: &'static [MarketKind] =
        &[MarketKind::Raw, MarketKind::Grade9, MarketKind::Grade10];
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Raw => write!(f, "raw"),
            MarketKind::Grade9 => write!(f, "grade9"),
            MarketKind::Grade10 => write!(f, "grade10"),
        }
    }
}

impl std::str::FromStr for MarketKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" | "ungraded" => Ok(MarketKind::Raw),
            "grade9" | "psa9" => Ok(MarketKind::Grade9),
            "grade10" | "psa10" | "gem" => Ok(MarketKind::Grade10),
            _ => Err(anyhow::anyhow!("Unknown market kind: {s}")),
        }
    }
}

/// Identifies which vendor feed a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    /// Metered sold-price tracker (the quota-limited API).
    Tracker,
    /// Marketplace feed with per-finish market prices.
    Marketplace,
    /// European marketplace feed.
    Cardmarket,
    /// Auction-house feed.
    Auctions,
    /// Embedded card-catalog record.
    Catalog,
    /// Legacy image/price field carried on old rows.
    Legacy,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTag::Tracker => write!(f, "tracker"),
            SourceTag::Marketplace => write!(f, "marketplace"),
            SourceTag::Cardmarket => write!(f, "cardmarket"),
            SourceTag::Auctions => write!(f, "auctions"),
            SourceTag::Catalog => write!(f, "catalog"),
            SourceTag::Legacy => write!(f, "legacy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Card identity
// ---------------------------------------------------------------------------

/// Key addressing one card within one set. Throttle state is keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardKey {
    pub set_id: String,
    pub number: String,
}

impl CardKey {
    pub fn new(set_id: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            set_id: set_id.into(),
            number: number.into(),
        }
    }
}

impl fmt::Display for CardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.set_id, self.number)
    }
}

/// Full identity of a card as shown to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardIdentity {
    pub set_id: String,
    pub number: String,
    pub name: String,
}

impl CardIdentity {
    pub fn key(&self) -> CardKey {
        CardKey::new(self.set_id.clone(), self.number.clone())
    }
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} ({})", self.name, self.number, self.set_id)
    }
}

// ---------------------------------------------------------------------------
// Sale observations & price series
// ---------------------------------------------------------------------------

/// A single observed sale. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleObservation {
    pub timestamp: DateTime<Utc>,
    /// Sale price in dollars.
    pub price: f64,
    pub kind: MarketKind,
    pub source: SourceTag,
}

impl fmt::Display for SaleObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ${:.2} {} ({})",
            self.timestamp.format("%Y-%m-%d"),
            self.price,
            self.kind,
            self.source,
        )
    }
}

/// Date-ascending series of sales for one card + market kind.
///
/// Ordering is an invariant: `from_observations` sorts, `push` inserts in
/// place, and consumers may rely on ascending timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    observations: Vec<SaleObservation>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from unordered observations.
    pub fn from_observations(mut observations: Vec<SaleObservation>) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        Self { observations }
    }

    /// Insert an observation, preserving date order.
    pub fn push(&mut self, obs: SaleObservation) {
        let at = self
            .observations
            .partition_point(|o| o.timestamp <= obs.timestamp);
        self.observations.insert(at, obs);
    }

    pub fn observations(&self) -> &[SaleObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn latest(&self) -> Option<&SaleObservation> {
        self.observations.last()
    }

    /// Prices in the trailing window `(now - days, now]`.
    pub fn prices_in_trailing_days(&self, days: i64, now: DateTime<Utc>) -> Vec<f64> {
        let cutoff = now - chrono::Duration::days(days);
        self.observations
            .iter()
            .filter(|o| o.timestamp > cutoff && o.timestamp <= now)
            .map(|o| o.price)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Derived statistics
// ---------------------------------------------------------------------------

/// Snapshot of robust descriptive statistics over a price series.
/// Recomputed fully on each request; never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicStats {
    pub median_5d: f64,
    pub median_30d: f64,
    pub median_90d: f64,
    /// Relative change of the 5-day median vs the 30-day median.
    pub pct_5d: f64,
    /// Relative change of the 30-day median vs the 90-day median.
    pub pct_30d: f64,
    pub sales_5d: usize,
    pub sales_30d: usize,
    pub sales_90d: usize,
    /// MAD / median of the winsorized 30-day window.
    pub volatility_30d: f64,
    /// `clamp(sales_30d / 10, 0, 1)`.
    pub liquidity: f64,
    /// `1 - clamp(volatility_30d, 0, 1)`.
    pub stability: f64,
    pub momentum: f64,
    /// Samples clamped by winsorization in the 30-day window.
    pub outliers_clamped: usize,
}

impl fmt::Display for BasicStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m5=${:.2} m30=${:.2} m90=${:.2} | d5={:+.1}% d30={:+.1}% | n={}/{}/{} | vol={:.2} liq={:.2} mom={:+.2}",
            self.median_5d,
            self.median_30d,
            self.median_90d,
            self.pct_5d * 100.0,
            self.pct_30d * 100.0,
            self.sales_5d,
            self.sales_30d,
            self.sales_90d,
            self.volatility_30d,
            self.liquidity,
            self.momentum,
        )
    }
}

// ---------------------------------------------------------------------------
// Gem-rate estimate
// ---------------------------------------------------------------------------

/// How a gem-rate estimate was derived, in descending data quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GemRateMethod {
    /// Recent population snapshot.
    RecentProxy,
    /// Historical population snapshot.
    PopulationProxy,
    /// Set-level baseline with attribute modifiers.
    SetDefault,
}

impl fmt::Display for GemRateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GemRateMethod::RecentProxy => write!(f, "recent-proxy"),
            GemRateMethod::PopulationProxy => write!(f, "population-proxy"),
            GemRateMethod::SetDefault => write!(f, "set-default"),
        }
    }
}

/// Grading-count snapshot used as a gem-rate proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    /// Cards graded at the top tier.
    pub pop10: u64,
    /// Total cards graded.
    pub total: u64,
}

impl PopulationSnapshot {
    pub fn gem_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.pop10 as f64 / self.total as f64
        }
    }
}

/// Probability that a raw card grades PSA 10, with provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GemRateEstimate {
    /// Always within `[0.03, 0.60]`.
    pub p10: f64,
    pub method: GemRateMethod,
    /// Weight of the estimate (0-1), by data volume.
    pub confidence: f64,
}

impl GemRateEstimate {
    /// Whether the estimate respects the domain bounds. Estimates outside
    /// this range indicate a bug in the estimator, not bad data.
    pub fn is_within_bounds(&self) -> bool {
        (0.03..=0.60).contains(&self.p10)
    }
}

impl fmt::Display for GemRateEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P10={:.1}% ({}, conf={:.0}%)",
            self.p10 * 100.0,
            self.method,
            self.confidence * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Trust label derived from sample count and dispersion.
///
/// The "no price data at all" case is not a label; it is represented as
/// `Option<ConfidenceLevel>::None` on the Card Signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Speculative,
    Noisy,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::High => write!(f, "High"),
            ConfidenceLevel::Speculative => write!(f, "Speculative"),
            ConfidenceLevel::Noisy => write!(f, "Noisy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

/// Fee-aware economics of grading one card. `None` fields mean the inputs
/// needed for that figure were missing — an explicit unknown, never a guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub spread_after_fees: Option<Decimal>,
    pub ev_grade: Option<Decimal>,
    pub net_expected_value: Option<Decimal>,
    pub upside_pct: Option<Decimal>,
}

impl ValuationResult {
    /// All-unknown result for cards with no usable prices.
    pub fn unknown() -> Self {
        Self {
            spread_after_fees: None,
            ev_grade: None,
            net_expected_value: None,
            upside_pct: None,
        }
    }
}

impl fmt::Display for ValuationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt(v: Option<Decimal>) -> String {
            v.map(|d| format!("{d:.2}")).unwrap_or_else(|| "?".into())
        }
        write!(
            f,
            "spread=${} ev=${} net=${} upside={}",
            opt(self.spread_after_fees),
            opt(self.ev_grade),
            opt(self.net_expected_value),
            self.upside_pct
                .map(|d| format!("{:.1}%", d * Decimal::from(100)))
                .unwrap_or_else(|| "?".into()),
        )
    }
}

// ---------------------------------------------------------------------------
// Normalized card
// ---------------------------------------------------------------------------

/// Canonical merged record for one card, resolved from vendor feeds.
/// Each field is taken from the first source in priority order that
/// supplies a value; fields never mix sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCard {
    pub identity: CardIdentity,
    pub image: Option<String>,
    /// Ungraded market price in dollars.
    pub raw_price: Option<f64>,
    /// PSA-10 price in dollars (observed or derived).
    pub graded_price: Option<f64>,
    /// True when `graded_price` was derived from `raw_price` rather than
    /// observed on a vendor feed.
    pub graded_is_estimate: bool,
    /// `Some(ratio)` when graded/raw fell outside the plausible band.
    /// Advisory only; the record is still usable.
    pub suspicious_ratio: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl NormalizedCard {
    /// Shape validation: reports the first field violating its contract.
    pub fn validate(&self) -> Result<(), SignalError> {
        let shape_err = |field: &str, reason: &str| SignalError::Shape {
            card: self.identity.key().to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.identity.set_id.trim().is_empty() {
            return Err(shape_err("identity.set_id", "must not be empty"));
        }
        if self.identity.number.trim().is_empty() {
            return Err(shape_err("identity.number", "must not be empty"));
        }
        if self.identity.name.trim().is_empty() {
            return Err(shape_err("identity.name", "must not be empty"));
        }
        if let Some(img) = &self.image {
            if img.trim().is_empty() {
                return Err(shape_err("image", "must not be an empty string"));
            }
        }
        for (field, price) in [("raw_price", self.raw_price), ("graded_price", self.graded_price)] {
            if let Some(p) = price {
                if !p.is_finite() || p <= 0.0 {
                    return Err(shape_err(field, "must be a finite positive number"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for NormalizedCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} raw={} psa10={}{}{}",
            self.identity,
            self.raw_price
                .map(|p| format!("${p:.2}"))
                .unwrap_or_else(|| "?".into()),
            self.graded_price
                .map(|p| format!("${p:.2}"))
                .unwrap_or_else(|| "?".into()),
            if self.graded_is_estimate { " (est)" } else { "" },
            if self.suspicious_ratio.is_some() {
                " [suspicious]"
            } else {
                ""
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Card signal (output contract)
// ---------------------------------------------------------------------------

/// Boolean flags derived from simple thresholds, for chip rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badges {
    /// 5-day raw delta and 5-day volume both cleared their thresholds.
    pub momentum: bool,
    /// Grading upside cleared its threshold with adequate confidence.
    pub grading_opportunity: bool,
}

/// The composite record consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSignal {
    pub identity: CardIdentity,
    pub stats: BasicStats,
    /// `None` means no price data at all ("Unknown" in the UI).
    pub confidence: Option<ConfidenceLevel>,
    pub gem_rate: GemRateEstimate,
    pub valuation: ValuationResult,
    pub badges: Badges,
    pub computed_at: DateTime<Utc>,
}

impl fmt::Display for CardSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conf = self
            .confidence
            .map(|c| c.to_string())
            .unwrap_or_else(|| "Unknown".into());
        write!(
            f,
            "{} | {} | conf={conf} | {} | {}",
            self.identity, self.stats, self.gem_rate, self.valuation,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SLABSIGNAL.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Shape violation on {card}: field `{field}` {reason}")]
    Shape {
        card: String,
        field: String,
        reason: String,
    },

    #[error("Source error ({source_tag}): {message}")]
    Source { source_tag: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
