//! Metered price-tracker integration.
//!
//! The only feed with sold-price history and grading populations, and
//! the reason the acquisition layer exists: calls are quota-limited per
//! day and burst-limited per minute upstream. Never call this client
//! directly — go through `AcquisitionController`.
//!
//! Auth: `Authorization: Bearer {key}` when a key is configured.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{CardRecord, PriceSource, SourceError, VendorPayload, VendorQuote};
use crate::types::{CardIdentity, CardKey, MarketKind, PopulationSnapshot, SaleObservation, SourceTag};

/// Request timeout at the HTTP client level. The acquisition controller
/// applies its own (shorter) bound on top.
const HTTP_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// API response types (tracker JSON → Rust)
// ---------------------------------------------------------------------------

/// Card payload returned by `/cards/{set}/{number}`. We only deserialize
/// the fields we need.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackerCard {
    set_id: String,
    number: String,
    name: String,

    #[serde(default)]
    raw_cents: Option<i64>,
    #[serde(default)]
    psa10_cents: Option<i64>,
    #[serde(default)]
    currency: Option<String>,

    #[serde(default)]
    sales: Vec<TrackerSale>,

    #[serde(default)]
    pop_recent: Option<TrackerPopulation>,
    #[serde(default)]
    pop_all_time: Option<TrackerPopulation>,

    #[serde(default)]
    set_name: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    released_days_ago: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackerSale {
    /// Sale timestamp (ms since epoch).
    sold_time: i64,
    price_cents: i64,
    /// "raw", "9", or "10".
    #[serde(default)]
    grade: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackerPopulation {
    pop10: u64,
    total: u64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Price-tracker API client.
pub struct TrackerClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TrackerClient {
    /// Create a new tracker client. `api_key` is optional for sandbox
    /// base URLs.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent("slabsignal/0.1.0 (market-signal-engine)")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client for tracker: {e}"))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    /// Convert a tracker timestamp (ms since epoch) to `DateTime<Utc>`.
    fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
    }

    fn classify_grade(grade: Option<&str>) -> MarketKind {
        match grade {
            Some("10") | Some("psa10") => MarketKind::Grade10,
            Some("9") | Some("psa9") => MarketKind::Grade9,
            _ => MarketKind::Raw,
        }
    }

    /// Translate the wire record into the canonical payload.
    fn to_payload(card: TrackerCard, fetched_at: DateTime<Utc>) -> VendorPayload {
        let sales = card
            .sales
            .iter()
            .filter(|s| s.price_cents > 0)
            .map(|s| SaleObservation {
                timestamp: Self::ms_to_datetime(s.sold_time),
                price: s.price_cents as f64 / 100.0,
                kind: Self::classify_grade(s.grade.as_deref()),
                source: SourceTag::Tracker,
            })
            .collect();

        let record = CardRecord {
            identity: CardIdentity {
                set_id: card.set_id,
                number: card.number,
                name: card.name,
            },
            set_name: card.set_name.unwrap_or_default(),
            image_small: card.image,
            image_embedded: None,
            image_legacy: None,
            price_normal: None,
            price_holo: None,
            release_age_days: card.released_days_ago,
        };

        VendorPayload {
            quote: VendorQuote {
                raw_price_cents: card.raw_cents,
                psa10_price_cents: card.psa10_cents,
                currency: card.currency.unwrap_or_else(|| "USD".to_string()),
                timestamp: fetched_at,
                source: SourceTag::Tracker,
            },
            sales,
            recent_population: card
                .pop_recent
                .map(|p| PopulationSnapshot { pop10: p.pop10, total: p.total }),
            historical_population: card
                .pop_all_time
                .map(|p| PopulationSnapshot { pop10: p.pop10, total: p.total }),
            card: Some(record),
        }
    }
}

#[async_trait]
impl PriceSource for TrackerClient {
    fn tag(&self) -> SourceTag {
        SourceTag::Tracker
    }

    async fn fetch(&self, key: &CardKey) -> Result<VendorPayload, SourceError> {
        let url = format!(
            "{}/cards/{}/{}?include=sales,population",
            self.base_url,
            urlencoding::encode(&key.set_id),
            urlencoding::encode(&key.number),
        );

        debug!(url = %url, "Fetching tracker card");

        let mut request = self.http.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout
            } else {
                SourceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let card: TrackerCard = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        Ok(Self::to_payload(card, Utc::now()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card() -> TrackerCard {
        serde_json::from_value(serde_json::json!({
            "setId": "swsh7",
            "number": "215",
            "name": "Umbreon VMAX",
            "rawCents": 42_000,
            "psa10Cents": 145_000,
            "currency": "USD",
            "sales": [
                { "soldTime": 1_772_000_000_000i64, "priceCents": 41_000, "grade": "raw" },
                { "soldTime": 1_772_100_000_000i64, "priceCents": 140_000, "grade": "10" },
                { "soldTime": 1_772_200_000_000i64, "priceCents": 62_000, "grade": "9" },
                { "soldTime": 1_772_300_000_000i64, "priceCents": 0, "grade": "raw" }
            ],
            "popRecent": { "pop10": 12, "total": 60 },
            "popAllTime": { "pop10": 900, "total": 4100 },
            "setName": "Evolving Skies",
            "image": "https://img.tracker.example.com/swsh7-215.jpg",
            "releasedDaysAgo": 1600
        }))
        .unwrap()
    }

    #[test]
    fn test_to_payload_maps_quote_and_card() {
        let fetched_at = Utc::now();
        let payload = TrackerClient::to_payload(sample_card(), fetched_at);

        assert_eq!(payload.quote.raw_price_cents, Some(42_000));
        assert_eq!(payload.quote.raw_price(), Some(420.0));
        assert_eq!(payload.quote.psa10_price(), Some(1450.0));
        assert_eq!(payload.quote.source, SourceTag::Tracker);
        assert_eq!(payload.quote.timestamp, fetched_at);

        let record = payload.card.unwrap();
        assert_eq!(record.identity.name, "Umbreon VMAX");
        assert_eq!(record.set_name, "Evolving Skies");
        assert!(record.image_small.is_some());
        assert_eq!(record.release_age_days, Some(1600));
    }

    #[test]
    fn test_to_payload_classifies_sales_and_drops_zero_prices() {
        let payload = TrackerClient::to_payload(sample_card(), Utc::now());
        assert_eq!(payload.sales.len(), 3); // zero-cent sale dropped

        let kinds: Vec<MarketKind> = payload.sales.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![MarketKind::Raw, MarketKind::Grade10, MarketKind::Grade9]
        );
        assert_eq!(payload.sales[1].price, 1400.0);
    }

    #[test]
    fn test_to_payload_populations() {
        let payload = TrackerClient::to_payload(sample_card(), Utc::now());
        assert_eq!(
            payload.recent_population,
            Some(PopulationSnapshot { pop10: 12, total: 60 })
        );
        assert_eq!(
            payload.historical_population,
            Some(PopulationSnapshot { pop10: 900, total: 4100 })
        );
    }

    #[test]
    fn test_grade_classification() {
        assert_eq!(TrackerClient::classify_grade(Some("10")), MarketKind::Grade10);
        assert_eq!(TrackerClient::classify_grade(Some("psa9")), MarketKind::Grade9);
        assert_eq!(TrackerClient::classify_grade(Some("raw")), MarketKind::Raw);
        assert_eq!(TrackerClient::classify_grade(None), MarketKind::Raw);
    }

    #[test]
    fn test_ms_to_datetime() {
        let dt = TrackerClient::ms_to_datetime(1_772_000_000_000);
        assert_eq!(dt.timestamp_millis(), 1_772_000_000_000);
    }

    #[test]
    fn test_client_construction() {
        let client = TrackerClient::new("https://api.tracker.example.com/v1", None);
        assert!(client.is_ok());
        assert_eq!(client.unwrap().tag(), SourceTag::Tracker);
    }
}
