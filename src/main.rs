//! SLABSIGNAL — Market-Signal Engine for Trading-Card Price Analytics
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the acquisition store (fatal if misconfigured), then walks the
//! watchlist computing one Card Signal per card with cooperative pacing
//! between upstream calls.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use slabsignal::acquisition::{AcquisitionController, FetchKind};
use slabsignal::acquisition::quota::today_local;
use slabsignal::config::{AppConfig, WatchlistEntry};
use slabsignal::normalizer::{normalize_card, SourceBundle};
use slabsignal::signal::gemrate::{CardAttributes, GemRateContext, GemRateEstimator};
use slabsignal::signal::SignalEngine;
use slabsignal::sources::{tracker::TrackerClient, CardRecord, VendorPayload};
use slabsignal::storage::JsonFileStore;
use slabsignal::types::{CardSignal, MarketKind};

const BANNER: &str = r#"
  ___ _      _   ___ ___ ___ ___ _  _   _   _
 / __| |    /_\ | _ ) __|_ _/ __| \| | /_\ | |
 \__ \ |__ / _ \| _ \__ \| | (_ | .` |/ _ \| |__
 |___/____/_/ \_\___/___/___\___|_|\_/_/ \_\____|

  Market-Signal Engine for Trading-Card Price Analytics
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    println!("{BANNER}");
    info!(
        engine_name = %cfg.engine.name,
        watchlist = cfg.watchlist.len(),
        daily_limit = cfg.quota.daily_limit,
        pacing_delay_ms = cfg.engine.pacing_delay_ms,
        "SLABSIGNAL starting up"
    );

    // -- Wire components --------------------------------------------------

    // A missing store directory or corrupt store file is a startup
    // configuration error — fail now, not mid-batch.
    let store = Arc::new(
        JsonFileStore::open(&cfg.storage.path).context("Acquisition store unavailable")?,
    );

    anyhow::ensure!(
        cfg.tracker.enabled,
        "Tracker source is disabled in config — nothing to acquire"
    );
    let api_key = std::env::var(&cfg.tracker.api_key_env).ok();
    if api_key.is_none() {
        warn!(
            env = %cfg.tracker.api_key_env,
            "No tracker API key in environment — running unauthenticated"
        );
    }
    let tracker = Arc::new(TrackerClient::new(cfg.tracker.base_url.clone(), api_key)?);

    let controller = AcquisitionController::new(
        store,
        tracker,
        cfg.quota_manager(today_local()),
        cfg.acquisition_config(),
    );

    let engine = SignalEngine::new(
        GemRateEstimator::new(Default::default()),
        cfg.valuation_calculator(),
        cfg.badge_config(),
    );

    // -- Batch pass --------------------------------------------------------

    let mut computed = 0usize;
    let mut skipped = 0usize;

    for (index, entry) in cfg.watchlist.iter().enumerate() {
        // Cooperative pacing between upstream calls (burst limits are
        // tighter than the daily quota).
        if index > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(cfg.engine.pacing_delay_ms))
                .await;
        }

        match process_card(&cfg, &controller, &engine, entry).await {
            Ok(Some(signal)) => {
                println!("{signal}");
                computed += 1;
            }
            Ok(None) => skipped += 1,
            Err(e) => {
                warn!(card = %entry.key(), error = %e, "Card failed, continuing batch");
                skipped += 1;
            }
        }
    }

    // -- Summary -----------------------------------------------------------

    let (quota, success_rate, avg_latency) = controller.quota_summary().await;
    info!(
        computed,
        skipped,
        quota = %quota,
        success_rate = format!("{:.0}%", success_rate * 100.0),
        avg_latency_ms = format!("{avg_latency:.0}"),
        "Batch complete"
    );

    Ok(())
}

/// Acquire → normalize → compute for one watchlist entry.
/// Returns `Ok(None)` when no payload could be served for the card.
async fn process_card(
    cfg: &AppConfig,
    controller: &AcquisitionController,
    engine: &SignalEngine,
    entry: &WatchlistEntry,
) -> Result<Option<CardSignal>> {
    let key = entry.key();
    let acquisition = controller.acquire(&key, FetchKind::Prices).await?;

    let Some(value) = acquisition.payload() else {
        warn!(card = %key, "No payload available (backed off or failed)");
        return Ok(None);
    };
    let payload: VendorPayload = serde_json::from_value(value.clone())
        .context("Cached payload has an incompatible shape")?;
    info!(card = %key, served = acquisition.label(), "Payload acquired");

    // Bundle the tracker feed with the catalog record (watchlist identity
    // is the fallback when the tracker doesn't know the card).
    let card_record = payload.card.clone().unwrap_or_else(|| {
        CardRecord::bare(
            entry.identity(),
            entry.set_name.clone().unwrap_or_default(),
        )
    });
    let attributes = CardAttributes {
        set_id: card_record.identity.set_id.clone(),
        set_name: card_record.set_name.clone(),
        number: card_record.identity.number.clone(),
        age_days: card_record.release_age_days,
    };
    let bundle = SourceBundle {
        card: card_record,
        tracker: Some(payload.quote.clone()),
        marketplace: None,
        cardmarket: None,
        auctions: None,
    };

    let now = chrono::Utc::now();
    let normalized = match normalize_card(&bundle, &cfg.normalizer_config(), now) {
        Ok(card) => card,
        Err(e) => {
            // Shape violations skip just this record, never the batch.
            warn!(card = %key, error = %e, "Record failed shape validation");
            return Ok(None);
        }
    };

    let gem_ctx = GemRateContext {
        recent: payload.recent_population,
        historical: payload.historical_population,
        attributes: Some(attributes),
    };

    let signal = engine.build(
        &normalized,
        &payload.series_for(MarketKind::Raw),
        &payload.series_for(MarketKind::Grade9),
        &payload.series_for(MarketKind::Grade10),
        &gem_ctx,
        now,
    );

    Ok(Some(signal))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("slabsignal=info"));

    let json_logging = std::env::var("SLABSIGNAL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
