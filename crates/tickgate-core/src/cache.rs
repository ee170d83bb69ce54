//! Two-tier quote cache: an in-process map in front of the durable store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::store::{Collection, DurableStore};
use crate::{Quote, Symbol, UtcDateTime};

/// Cache key for a symbol's quote.
pub fn quote_cache_key(symbol: &Symbol) -> String {
    format!("quote_{}", symbol.as_str())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    value: Quote,
    expires_at: UtcDateTime,
}

impl CacheEntry {
    fn is_live(&self, now: UtcDateTime) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe two-tier cache with wall-clock expiry.
///
/// Reads consult memory first and fall back to the durable tier, copying a
/// live durable hit back into memory. An entry whose `expiresAt` is not in the
/// future is absent in both tiers whether or not it has been swept yet.
#[derive(Clone)]
pub struct ResponseCache {
    memory: Arc<RwLock<HashMap<String, CacheEntry>>>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        Self {
            memory: Arc::new(RwLock::new(HashMap::new())),
            store,
            clock,
            default_ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Quote> {
        let now = self.clock.now();
        {
            let memory = self.memory.read().await;
            if let Some(entry) = memory.get(key).filter(|entry| entry.is_live(now)) {
                return Some(entry.value.clone());
            }
        }

        let entry = match self.read_durable(key) {
            Some(entry) if entry.is_live(now) => entry,
            Some(_) => {
                self.evict(key).await;
                return None;
            }
            None => {
                self.memory.write().await.remove(key);
                return None;
            }
        };

        debug!("cache hit in durable tier for {key}");
        let value = entry.value.clone();
        self.memory.write().await.insert(key.to_owned(), entry);
        Some(value)
    }

    /// Writes both tiers. A durable failure is logged and otherwise ignored.
    pub async fn set(&self, key: &str, value: &Quote, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value: value.clone(),
            expires_at: self.clock.now().after(ttl.unwrap_or(self.default_ttl)),
        };

        match serde_json::to_value(&entry) {
            Ok(document) => {
                if let Err(err) = self.store.upsert(Collection::CacheData, key, &document) {
                    warn!("failed to write {key} to the durable cache: {err}");
                }
            }
            Err(err) => warn!("failed to encode cache entry {key}: {err}"),
        }

        self.memory.write().await.insert(key.to_owned(), entry);
    }

    /// Removes expired entries from both tiers. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = {
            let mut memory = self.memory.write().await;
            let before = memory.len();
            memory.retain(|_, entry| entry.is_live(now));
            before - memory.len()
        };

        match self.store.scan(Collection::CacheData) {
            Ok(documents) => {
                for (key, document) in documents {
                    let live = serde_json::from_value::<CacheEntry>(document)
                        .map(|entry| entry.is_live(now))
                        .unwrap_or(false);
                    if live {
                        continue;
                    }
                    match self.store.remove(Collection::CacheData, &key) {
                        Ok(true) => removed += 1,
                        Ok(false) => {}
                        Err(err) => warn!("failed to remove expired cache entry {key}: {err}"),
                    }
                }
            }
            Err(err) => warn!("failed to scan the durable cache: {err}"),
        }

        if removed > 0 {
            info!("cache sweep removed {removed} expired entries");
        }
        removed
    }

    /// Empties both tiers.
    pub async fn clear(&self) -> Result<(), crate::StoreError> {
        self.memory.write().await.clear();
        self.store.clear(Collection::CacheData)
    }

    /// In-memory entry count, expired entries included until swept.
    pub async fn len(&self) -> usize {
        self.memory.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memory.read().await.is_empty()
    }

    /// Runs [`ResponseCache::sweep_expired`] every `interval` until the handle
    /// is aborted. The first sweep happens one interval after spawning.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                cache.sweep_expired().await;
            }
        })
    }

    fn read_durable(&self, key: &str) -> Option<CacheEntry> {
        match self.store.read(Collection::CacheData, key) {
            Ok(Some(document)) => serde_json::from_value(document)
                .map_err(|err| warn!("ignoring unreadable cache entry {key}: {err}"))
                .ok(),
            Ok(None) => None,
            Err(err) => {
                warn!("failed to read {key} from the durable cache: {err}");
                None
            }
        }
    }

    async fn evict(&self, key: &str) {
        self.memory.write().await.remove(key);
        if let Err(err) = self.store.remove(Collection::CacheData, key) {
            debug!("failed to evict expired cache entry {key}: {err}");
        }
    }
}
