//! # Durable Store
//!
//! Key/document storage behind the registry, the ledger and the cache.
//!
//! | Collection | Key | Document |
//! |------------|-----|----------|
//! | `api_config` | provider name | [`crate::ProviderConfig`] |
//! | `rate_limits` | provider name | [`crate::RateLimitState`] |
//! | `cache_data` | cache key | cached quote plus `expiresAt` |
//!
//! Two backends implement [`DurableStore`]: [`FileStore`] keeps one JSON file
//! per collection and [`DuckDbStore`] keeps every document in an embedded
//! DuckDB table. [`open_store`] picks one from [`crate::StoreSettings`] and
//! falls back to the file backend when DuckDB cannot be opened.

mod duckdb;
mod file;
mod memory;

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{StoreError, StoreSettings};

pub use self::duckdb::DuckDbStore;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Logical document collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    ApiConfig,
    RateLimits,
    CacheData,
}

impl Collection {
    pub const ALL: [Self; 3] = [Self::ApiConfig, Self::RateLimits, Self::CacheData];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiConfig => "api_config",
            Self::RateLimits => "rate_limits",
            Self::CacheData => "cache_data",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend is serving durable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    DuckDb,
    Memory,
}

impl StoreBackend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::DuckDb => "duckdb",
            Self::Memory => "memory",
        }
    }
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "duckdb" | "db" => Ok(Self::DuckDb),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Synchronous key/document store shared by all gateway components.
///
/// Writes are replace-upserts of whole documents. Callers serialize writes to
/// one key by holding that key's lock across the call.
pub trait DurableStore: Send + Sync {
    fn backend(&self) -> StoreBackend;

    fn read(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError>;

    fn upsert(&self, collection: Collection, key: &str, document: &Value) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    fn remove(&self, collection: Collection, key: &str) -> Result<bool, StoreError>;

    /// All documents in `collection`, ordered by key.
    fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError>;

    fn clear(&self, collection: Collection) -> Result<(), StoreError>;
}

/// Opens the backend named by `settings`.
///
/// A DuckDB failure is logged and answered with a [`FileStore`] in the same
/// home directory. Only a failing file backend is an error.
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn DurableStore>, StoreError> {
    match settings.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => Ok(Arc::new(FileStore::open(&settings.home)?)),
        StoreBackend::DuckDb => match DuckDbStore::open(&settings.duckdb_path) {
            Ok(store) => {
                info!("using duckdb store at {}", settings.duckdb_path.display());
                Ok(Arc::new(store))
            }
            Err(err) => {
                warn!(
                    "duckdb store at {} unavailable ({err}), falling back to file store in {}",
                    settings.duckdb_path.display(),
                    settings.home.display()
                );
                Ok(Arc::new(FileStore::open(&settings.home)?))
            }
        },
    }
}
