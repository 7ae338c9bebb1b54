//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::acquisition::{AcquisitionConfig, QuotaManager, QuotaThresholds};
use crate::normalizer::NormalizerConfig;
use crate::signal::valuation::{FeeSchedule, ValuationCalculator};
use crate::signal::BadgeConfig;
use crate::types::{CardIdentity, CardKey};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub acquisition: AcquisitionSection,
    pub quota: QuotaSection,
    pub valuation: ValuationSection,
    pub normalizer: NormalizerSection,
    pub storage: StorageSection,
    pub tracker: TrackerSection,
    #[serde(default)]
    pub watchlist: Vec<WatchlistEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub name: String,
    /// Fixed delay between cards in a batch pass — cooperative pacing
    /// under the upstream burst limit, layered on top of the throttle.
    pub pacing_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionSection {
    pub cache_max_age_minutes: i64,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaSection {
    pub daily_limit: u32,
    #[serde(default = "default_warning_pct")]
    pub warning_pct: f64,
    #[serde(default = "default_critical_pct")]
    pub critical_pct: f64,
    #[serde(default = "default_emergency_pct")]
    pub emergency_pct: f64,
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_warning_pct() -> f64 {
    80.0
}
fn default_critical_pct() -> f64 {
    90.0
}
fn default_emergency_pct() -> f64 {
    95.0
}
fn default_log_capacity() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValuationSection {
    /// Haircut on the PSA-9 outcome in the grading EV.
    pub psa9_haircut: f64,
    /// Upside fraction required for the grading-opportunity badge.
    pub grading_min_upside: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizerSection {
    /// Raw → PSA-10 multiplier for derived graded estimates.
    pub graded_multiplier: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSection {
    /// Path of the acquisition store file.
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerSection {
    pub enabled: bool,
    pub base_url: String,
    pub api_key_env: String,
}

/// One card the batch runner computes a signal for.
#[derive(Debug, Deserialize, Clone)]
pub struct WatchlistEntry {
    pub set_id: String,
    pub number: String,
    pub name: String,
    #[serde(default)]
    pub set_name: Option<String>,
}

impl WatchlistEntry {
    pub fn key(&self) -> CardKey {
        CardKey::new(self.set_id.clone(), self.number.clone())
    }

    pub fn identity(&self) -> CardIdentity {
        CardIdentity {
            set_id: self.set_id.clone(),
            number: self.number.clone(),
            name: self.name.clone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    // -- Component wiring ------------------------------------------------

    pub fn acquisition_config(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            cache_max_age_minutes: self.acquisition.cache_max_age_minutes,
            fetch_timeout_secs: self.acquisition.fetch_timeout_secs,
        }
    }

    pub fn quota_manager(&self, today: NaiveDate) -> QuotaManager {
        QuotaManager::new(
            self.quota.daily_limit,
            QuotaThresholds {
                warning: self.quota.warning_pct,
                critical: self.quota.critical_pct,
                emergency: self.quota.emergency_pct,
            },
            today,
        )
        .with_log_capacity(self.quota.log_capacity)
    }

    pub fn normalizer_config(&self) -> NormalizerConfig {
        NormalizerConfig {
            graded_multiplier: self.normalizer.graded_multiplier,
            ..NormalizerConfig::default()
        }
    }

    pub fn valuation_calculator(&self) -> ValuationCalculator {
        let haircut =
            Decimal::from_f64(self.valuation.psa9_haircut).unwrap_or_else(|| Decimal::new(9, 1));
        ValuationCalculator::new(FeeSchedule::default(), haircut)
    }

    pub fn badge_config(&self) -> BadgeConfig {
        BadgeConfig {
            grading_min_upside: self.valuation.grading_min_upside,
            ..BadgeConfig::default()
        }
    }
}
