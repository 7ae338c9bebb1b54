//! Persistence layer for acquisition state.
//!
//! The engine only assumes key-value upsert-with-timestamp semantics;
//! the store behind the trait is shared by concurrent workers. Two
//! implementations ship here: a JSON file (sufficient for single-host
//! deployments, mirrors how agent state was persisted before) and an
//! in-memory map for tests and ephemeral runs. A SQL-backed store can
//! slot in without touching the engine.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::acquisition::cache::{CacheEntry, CacheKey};
use crate::acquisition::throttle::ThrottleState;
use crate::types::CardKey;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Shared store for cache entries and throttle state.
///
/// Reads and writes are independent operations; the engine tolerates
/// read-then-write races on the same key (at-least-once semantics), so
/// implementations must not add blocking cross-key locks.
#[async_trait]
pub trait AcquisitionStore: Send + Sync {
    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Unconditional upsert.
    async fn put_cache(&self, entry: &CacheEntry) -> Result<()>;

    async fn get_throttle(&self, key: &CardKey) -> Result<Option<ThrottleState>>;

    /// Unconditional upsert.
    async fn put_throttle(&self, state: &ThrottleState) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Map-backed store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    cache: RwLock<HashMap<String, CacheEntry>>,
    throttle: RwLock<HashMap<String, ThrottleState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AcquisitionStore for MemoryStore {
    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.cache.read().await.get(&key.to_string()).cloned())
    }

    async fn put_cache(&self, entry: &CacheEntry) -> Result<()> {
        self.cache
            .write()
            .await
            .insert(entry.key.to_string(), entry.clone());
        Ok(())
    }

    async fn get_throttle(&self, key: &CardKey) -> Result<Option<ThrottleState>> {
        Ok(self.throttle.read().await.get(&key.to_string()).cloned())
    }

    async fn put_throttle(&self, state: &ThrottleState) -> Result<()> {
        self.throttle
            .write()
            .await
            .insert(state.key.to_string(), state.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// On-disk layout of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    cache: HashMap<String, CacheEntry>,
    throttle: HashMap<String, ThrottleState>,
}

/// Whole-file JSON persistence guarded by a single lock.
///
/// Load-mutate-save per operation keeps the file consistent under one
/// process; cross-process sharing should move to a real key-value store
/// behind the same trait.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or prepare to create) the store file.
    ///
    /// A missing parent directory or an unparseable existing file is a
    /// startup-time configuration error — reported immediately, never
    /// retried silently.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                anyhow::bail!(
                    "Store directory does not exist: {}",
                    parent.display()
                );
            }
        }
        if path.exists() {
            // Validate up front so a corrupt file fails at startup.
            Self::load(&path).context("Existing store file is unreadable")?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    fn load(path: &Path) -> Result<StoreFile> {
        if !path.exists() {
            return Ok(StoreFile::default());
        }
        let json = std::fs::read_to_string(path)
            .context(format!("Failed to read store file {}", path.display()))?;
        let file: StoreFile = serde_json::from_str(&json)
            .context(format!("Failed to parse store file {}", path.display()))?;
        Ok(file)
    }

    fn save(&self, file: &StoreFile) -> Result<()> {
        let json = serde_json::to_string_pretty(file).context("Failed to serialise store")?;
        std::fs::write(&self.path, json)
            .context(format!("Failed to write store file {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Store saved");
        Ok(())
    }
}

#[async_trait]
impl AcquisitionStore for JsonFileStore {
    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let _guard = self.lock.lock().await;
        Ok(Self::load(&self.path)?.cache.get(&key.to_string()).cloned())
    }

    async fn put_cache(&self, entry: &CacheEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = Self::load(&self.path)?;
        file.cache.insert(entry.key.to_string(), entry.clone());
        self.save(&file)
    }

    async fn get_throttle(&self, key: &CardKey) -> Result<Option<ThrottleState>> {
        let _guard = self.lock.lock().await;
        Ok(Self::load(&self.path)?
            .throttle
            .get(&key.to_string())
            .cloned())
    }

    async fn put_throttle(&self, state: &ThrottleState) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = Self::load(&self.path)?;
        file.throttle.insert(state.key.to_string(), state.clone());
        self.save(&file)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
