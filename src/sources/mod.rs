//! Vendor source adapters.
//!
//! Defines the `PriceSource` trait and the canonical shapes every vendor
//! feed is converted into at the adapter boundary. The engine never
//! branches on a vendor's wire format — adapters own that translation
//! and hand over one of the typed records below.

pub mod tracker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CardIdentity, CardKey, MarketKind, PopulationSnapshot, PriceSeries, SaleObservation, SourceTag};

// ---------------------------------------------------------------------------
// Canonical shapes
// ---------------------------------------------------------------------------

/// Canonical price quote from a vendor feed.
///
/// Prices travel as integer cents at the boundary; dollars only exist
/// inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorQuote {
    pub raw_price_cents: Option<i64>,
    pub psa10_price_cents: Option<i64>,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub source: SourceTag,
}

impl VendorQuote {
    /// Raw price in dollars; non-positive cents count as missing.
    pub fn raw_price(&self) -> Option<f64> {
        self.raw_price_cents.filter(|c| *c > 0).map(|c| c as f64 / 100.0)
    }

    /// PSA-10 price in dollars; non-positive cents count as missing.
    pub fn psa10_price(&self) -> Option<f64> {
        self.psa10_price_cents.filter(|c| *c > 0).map(|c| c as f64 / 100.0)
    }
}

/// Marketplace feed record: per-finish market prices plus an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceQuote {
    pub image: Option<String>,
    /// Market price for the normal finish, dollars.
    pub market_normal: Option<f64>,
    /// Market price for the holofoil finish, dollars.
    pub market_holo: Option<f64>,
}

/// Listing-only feeds (image, no usable prices).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorListing {
    pub image: Option<String>,
}

/// Embedded catalog row for one card, including legacy fields carried
/// over from older imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub identity: CardIdentity,
    pub set_name: String,
    /// Primary-catalog small image.
    pub image_small: Option<String>,
    /// Image embedded on the card row itself.
    pub image_embedded: Option<String>,
    /// Legacy image field from old imports.
    pub image_legacy: Option<String>,
    /// Embedded normal-finish price, dollars.
    pub price_normal: Option<f64>,
    /// Embedded holo-finish price, dollars.
    pub price_holo: Option<f64>,
    /// Days since the set released, when known.
    pub release_age_days: Option<i64>,
}

impl Default for CardRecord {
    fn default() -> Self {
        CardRecord::bare(
            CardIdentity {
                set_id: String::new(),
                number: String::new(),
                name: String::new(),
            },
            "",
        )
    }
}

impl CardRecord {
    /// Minimal record carrying only identity (watchlist entries start here).
    pub fn bare(identity: CardIdentity, set_name: impl Into<String>) -> Self {
        Self {
            identity,
            set_name: set_name.into(),
            image_small: None,
            image_embedded: None,
            image_legacy: None,
            price_normal: None,
            price_holo: None,
            release_age_days: None,
        }
    }
}

/// Everything one fetch from the metered tracker returns: the quote,
/// observed sales, grading populations, and (when the API knows the
/// card) a catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorPayload {
    pub quote: VendorQuote,
    pub sales: Vec<SaleObservation>,
    pub recent_population: Option<PopulationSnapshot>,
    pub historical_population: Option<PopulationSnapshot>,
    pub card: Option<CardRecord>,
}

impl VendorPayload {
    /// Sales of one market kind as an ordered series.
    pub fn series_for(&self, kind: MarketKind) -> PriceSeries {
        PriceSeries::from_observations(
            self.sales.iter().filter(|s| s.kind == kind).cloned().collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed fetch failures, so the throttle can classify outcomes without
/// string matching.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("rate limited by upstream")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over vendor price feeds.
///
/// Implementors translate their wire format into `VendorPayload` and map
/// failures onto `SourceError`. The engine composes these behind the
/// acquisition controller; nothing else performs network I/O.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Which feed this adapter covers.
    fn tag(&self) -> SourceTag;

    /// Fetch the full payload for one card.
    async fn fetch(&self, key: &CardKey) -> Result<VendorPayload, SourceError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
