//! Multi-source record normalization.
//!
//! Resolves one canonical price/image record per card from several
//! vendor feeds. Each field has a fixed priority chain — an explicit,
//! ordered list of named resolvers evaluated top-to-bottom — and the
//! first source supplying a value wins. Fields resolve independently;
//! a record never mixes two sources within one field.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::sources::{CardRecord, MarketplaceQuote, VendorListing, VendorQuote};
use crate::types::{NormalizedCard, SignalError, SourceTag};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Normalization parameters.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Raw → PSA-10 multiplier used when no graded price was observed.
    /// A calibrated heuristic, not a law — keep it in config.
    pub graded_multiplier: f64,
    /// Sanity bounds applied to the multiplier when deriving an estimate.
    pub multiplier_floor: f64,
    pub multiplier_ceiling: f64,
    /// Plausible band for the graded/raw ratio; outside it the record is
    /// flagged (advisory, never rejected).
    pub suspicious_ratio_min: f64,
    pub suspicious_ratio_max: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            graded_multiplier: 4.5,
            multiplier_floor: 2.5,
            multiplier_ceiling: 8.0,
            suspicious_ratio_min: 1.2,
            suspicious_ratio_max: 15.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Source bundle
// ---------------------------------------------------------------------------

/// All feeds available for one card, already converted to canonical
/// shapes at the adapter boundary.
#[derive(Debug, Clone, Default)]
pub struct SourceBundle {
    /// Embedded catalog row. Always present — it carries identity.
    pub card: CardRecord,
    pub tracker: Option<VendorQuote>,
    pub marketplace: Option<MarketplaceQuote>,
    pub cardmarket: Option<VendorListing>,
    pub auctions: Option<VendorListing>,
}

// ---------------------------------------------------------------------------
// Resolver chains
// ---------------------------------------------------------------------------

/// One step of a fallback chain: where the value comes from and how to
/// read it off the bundle.
pub struct Resolver<T> {
    pub source: SourceTag,
    pub label: &'static str,
    resolve: fn(&SourceBundle) -> Option<T>,
}

fn positive(price: Option<f64>) -> Option<f64> {
    price.filter(|p| p.is_finite() && *p > 0.0)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Image priority: catalog small → marketplace → cardmarket → auctions →
/// embedded card image → legacy field.
pub fn image_chain() -> Vec<Resolver<String>> {
    vec![
        Resolver {
            source: SourceTag::Catalog,
            label: "catalog small image",
            resolve: |b| non_empty(b.card.image_small.clone()),
        },
        Resolver {
            source: SourceTag::Marketplace,
            label: "marketplace image",
            resolve: |b| non_empty(b.marketplace.as_ref().and_then(|m| m.image.clone())),
        },
        Resolver {
            source: SourceTag::Cardmarket,
            label: "cardmarket image",
            resolve: |b| non_empty(b.cardmarket.as_ref().and_then(|m| m.image.clone())),
        },
        Resolver {
            source: SourceTag::Auctions,
            label: "auctions image",
            resolve: |b| non_empty(b.auctions.as_ref().and_then(|m| m.image.clone())),
        },
        Resolver {
            source: SourceTag::Catalog,
            label: "embedded card image",
            resolve: |b| non_empty(b.card.image_embedded.clone()),
        },
        Resolver {
            source: SourceTag::Legacy,
            label: "legacy image field",
            resolve: |b| non_empty(b.card.image_legacy.clone()),
        },
    ]
}

/// Raw-price priority: tracker → marketplace normal finish → marketplace
/// holo finish → embedded normal → embedded holo.
pub fn raw_price_chain() -> Vec<Resolver<f64>> {
    vec![
        Resolver {
            source: SourceTag::Tracker,
            label: "tracker raw",
            resolve: |b| positive(b.tracker.as_ref().and_then(|t| t.raw_price())),
        },
        Resolver {
            source: SourceTag::Marketplace,
            label: "marketplace normal market",
            resolve: |b| positive(b.marketplace.as_ref().and_then(|m| m.market_normal)),
        },
        Resolver {
            source: SourceTag::Marketplace,
            label: "marketplace holo market",
            resolve: |b| positive(b.marketplace.as_ref().and_then(|m| m.market_holo)),
        },
        Resolver {
            source: SourceTag::Catalog,
            label: "embedded normal price",
            resolve: |b| positive(b.card.price_normal),
        },
        Resolver {
            source: SourceTag::Catalog,
            label: "embedded holo price",
            resolve: |b| positive(b.card.price_holo),
        },
    ]
}

fn resolve_first<T>(bundle: &SourceBundle, chain: &[Resolver<T>]) -> Option<(T, SourceTag)> {
    for step in chain {
        if let Some(value) = (step.resolve)(bundle) {
            debug!(source = %step.source, via = step.label, "Field resolved");
            return Some((value, step.source));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Resolve one canonical card record from the bundle.
///
/// The graded price prefers an observed tracker value; failing that it is
/// derived as `raw × multiplier` and marked as an estimate. The output
/// passes shape validation — a violation names the offending field rather
/// than failing generically.
pub fn normalize_card(
    bundle: &SourceBundle,
    config: &NormalizerConfig,
    now: DateTime<Utc>,
) -> Result<NormalizedCard, SignalError> {
    let image = resolve_first(bundle, &image_chain()).map(|(v, _)| v);
    let raw_price = resolve_first(bundle, &raw_price_chain()).map(|(v, _)| v);

    let observed_graded = positive(bundle.tracker.as_ref().and_then(|t| t.psa10_price()));
    let (graded_price, graded_is_estimate) = match observed_graded {
        Some(observed) => (Some(observed), false),
        None => {
            let multiplier = config
                .graded_multiplier
                .clamp(config.multiplier_floor, config.multiplier_ceiling);
            (raw_price.map(|r| r * multiplier), raw_price.is_some())
        }
    };

    let suspicious_ratio = match (raw_price, graded_price) {
        (Some(raw), Some(graded)) => {
            let ratio = graded / raw;
            if ratio < config.suspicious_ratio_min || ratio > config.suspicious_ratio_max {
                warn!(
                    card = %bundle.card.identity.key(),
                    ratio = format!("{ratio:.2}"),
                    "Graded/raw ratio outside plausible band"
                );
                Some(ratio)
            } else {
                None
            }
        }
        _ => None,
    };

    let last_updated = bundle
        .tracker
        .as_ref()
        .map(|t| t.timestamp)
        .unwrap_or(now);

    let card = NormalizedCard {
        identity: bundle.card.identity.clone(),
        image,
        raw_price,
        graded_price,
        graded_is_estimate,
        suspicious_ratio,
        last_updated,
    };
    card.validate()?;
    Ok(card)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardIdentity;

    fn identity() -> CardIdentity {
        CardIdentity {
            set_id: "swsh7".to_string(),
            number: "215".to_string(),
            name: "Umbreon VMAX".to_string(),
        }
    }

    fn bundle() -> SourceBundle {
        SourceBundle {
            card: CardRecord::bare(identity(), "Evolving Skies"),
            ..Default::default()
        }
    }

    fn tracker_quote(raw_cents: Option<i64>, psa10_cents: Option<i64>) -> VendorQuote {
        VendorQuote {
            raw_price_cents: raw_cents,
            psa10_price_cents: psa10_cents,
            currency: "USD".to_string(),
            timestamp: Utc::now(),
            source: SourceTag::Tracker,
        }
    }

    // -- Chain ordering as a first-class value --

    #[test]
    fn test_image_chain_order() {
        let chain = image_chain();
        let sources: Vec<SourceTag> = chain.iter().map(|r| r.source).collect();
        assert_eq!(
            sources,
            vec![
                SourceTag::Catalog,
                SourceTag::Marketplace,
                SourceTag::Cardmarket,
                SourceTag::Auctions,
                SourceTag::Catalog,
                SourceTag::Legacy,
            ]
        );
    }

    #[test]
    fn test_raw_chain_starts_at_tracker() {
        let chain = raw_price_chain();
        assert_eq!(chain[0].source, SourceTag::Tracker);
        assert_eq!(chain.len(), 5);
    }

    // -- Field resolution --

    #[test]
    fn test_first_non_null_wins() {
        let mut b = bundle();
        b.tracker = Some(tracker_quote(Some(10_000), None));
        b.marketplace = Some(MarketplaceQuote {
            market_normal: Some(90.0),
            ..Default::default()
        });
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.raw_price, Some(100.0)); // tracker, not marketplace
    }

    #[test]
    fn test_embedded_holo_fallback() {
        // Only an embedded holo price — no tracker, no marketplace.
        let mut b = bundle();
        b.card.price_holo = Some(42.5);
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.raw_price, Some(42.5));
    }

    #[test]
    fn test_fields_resolve_independently() {
        // Image from catalog, price from marketplace — no mixing rule
        // violated because each field walks its own chain.
        let mut b = bundle();
        b.card.image_small = Some("https://img.example.com/small.png".to_string());
        b.marketplace = Some(MarketplaceQuote {
            image: Some("https://mp.example.com/large.png".to_string()),
            market_normal: Some(55.0),
            market_holo: None,
        });
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.image.as_deref(), Some("https://img.example.com/small.png"));
        assert_eq!(card.raw_price, Some(55.0));
    }

    #[test]
    fn test_image_falls_back_to_legacy() {
        let mut b = bundle();
        b.card.image_legacy = Some("https://old.example.com/img.jpg".to_string());
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.image.as_deref(), Some("https://old.example.com/img.jpg"));
    }

    #[test]
    fn test_blank_image_skipped() {
        let mut b = bundle();
        b.card.image_small = Some("   ".to_string());
        b.card.image_legacy = Some("https://old.example.com/img.jpg".to_string());
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.image.as_deref(), Some("https://old.example.com/img.jpg"));
    }

    // -- Graded price --

    #[test]
    fn test_observed_graded_price_preferred() {
        let mut b = bundle();
        b.tracker = Some(tracker_quote(Some(10_000), Some(45_000)));
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.graded_price, Some(450.0));
        assert!(!card.graded_is_estimate);
    }

    #[test]
    fn test_graded_estimate_from_multiplier() {
        let mut b = bundle();
        b.card.price_normal = Some(100.0);
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.graded_price, Some(450.0)); // 100 × 4.5
        assert!(card.graded_is_estimate);
    }

    #[test]
    fn test_estimate_multiplier_clamped_to_sane_range() {
        let mut config = NormalizerConfig::default();
        config.graded_multiplier = 20.0; // absurd configuration
        let mut b = bundle();
        b.card.price_normal = Some(100.0);
        let card = normalize_card(&b, &config, Utc::now()).unwrap();
        assert_eq!(card.graded_price, Some(800.0)); // clamped to ×8
    }

    #[test]
    fn test_observed_graded_never_clamped() {
        // 50× ratio from an observed feed is flagged, not rewritten.
        let mut b = bundle();
        b.tracker = Some(tracker_quote(Some(1_000), Some(50_000)));
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.graded_price, Some(500.0));
        assert!(card.suspicious_ratio.is_some());
    }

    #[test]
    fn test_no_prices_at_all() {
        let card = normalize_card(&bundle(), &NormalizerConfig::default(), Utc::now()).unwrap();
        assert!(card.raw_price.is_none());
        assert!(card.graded_price.is_none());
        assert!(!card.graded_is_estimate);
    }

    // -- Suspicious ratio --

    #[test]
    fn test_ratio_inside_band_not_flagged() {
        let mut b = bundle();
        b.tracker = Some(tracker_quote(Some(10_000), Some(45_000))); // 4.5×
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert!(card.suspicious_ratio.is_none());
    }

    #[test]
    fn test_ratio_below_band_flagged() {
        let mut b = bundle();
        b.tracker = Some(tracker_quote(Some(10_000), Some(11_000))); // 1.1×
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        let ratio = card.suspicious_ratio.unwrap();
        assert!((ratio - 1.1).abs() < 1e-10);
    }

    #[test]
    fn test_ratio_above_band_flagged_but_record_kept() {
        let mut b = bundle();
        b.tracker = Some(tracker_quote(Some(1_000), Some(20_000))); // 20×
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert!(card.suspicious_ratio.is_some());
        assert_eq!(card.raw_price, Some(10.0)); // still usable
    }

    // -- Shape validation --

    #[test]
    fn test_shape_violation_names_field() {
        let mut b = bundle();
        b.card.identity.name = String::new();
        let err = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap_err();
        match err {
            SignalError::Shape { field, card, .. } => {
                assert_eq!(field, "identity.name");
                assert_eq!(card, "swsh7/215");
            }
            other => panic!("expected shape error, got {other}"),
        }
    }

    // -- last_updated --

    #[test]
    fn test_last_updated_from_tracker_quote() {
        let mut b = bundle();
        let quote = tracker_quote(Some(10_000), None);
        let stamp = quote.timestamp;
        b.tracker = Some(quote);
        let card = normalize_card(&b, &NormalizerConfig::default(), Utc::now()).unwrap();
        assert_eq!(card.last_updated, stamp);
    }
}
