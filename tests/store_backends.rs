//! Behavior-driven tests for the durable store backends.
//!
//! Every backend must honour the same collection contract, and the gateway's
//! persisted state must not depend on which one is in use.

use std::fs;
use std::sync::Arc;

use serde_json::json;
use tickgate_core::{
    open_store, Collection, DuckDbStore, DurableStore, FileStore, MemoryStore, ProviderConfig,
    ProviderId, ProviderRegistry, StoreBackend, StoreSettings,
};

fn exercise_contract(store: &dyn DurableStore) {
    // Writes are whole-document replacements addressed by key
    store
        .upsert(Collection::ApiConfig, "finnhub", &json!({"priority": 4}))
        .expect("insert");
    store
        .upsert(Collection::ApiConfig, "finnhub", &json!({"priority": 1}))
        .expect("replace");
    store
        .upsert(Collection::ApiConfig, "alphavantage", &json!({"priority": 2}))
        .expect("insert");
    assert_eq!(
        store.read(Collection::ApiConfig, "finnhub").expect("read"),
        Some(json!({"priority": 1}))
    );

    // Collections are independent namespaces
    assert_eq!(store.read(Collection::RateLimits, "finnhub").expect("read"), None);
    store
        .upsert(Collection::RateLimits, "finnhub", &json!({"requests": 3}))
        .expect("insert");

    // Scans are ordered by key
    let keys: Vec<String> = store
        .scan(Collection::ApiConfig)
        .expect("scan")
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    assert_eq!(keys, vec!["alphavantage", "finnhub"]);

    // Removal reports whether something was there
    assert!(store.remove(Collection::ApiConfig, "alphavantage").expect("remove"));
    assert!(!store.remove(Collection::ApiConfig, "alphavantage").expect("remove"));

    // Clearing one collection leaves the others alone
    store.clear(Collection::ApiConfig).expect("clear");
    assert!(store.scan(Collection::ApiConfig).expect("scan").is_empty());
    assert_eq!(
        store.read(Collection::RateLimits, "finnhub").expect("read"),
        Some(json!({"requests": 3}))
    );
}

// =============================================================================
// Store: Shared Contract
// =============================================================================

#[test]
fn the_file_backend_honours_the_collection_contract() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::open(dir.path()).expect("open");
    exercise_contract(&store);
    assert_eq!(store.backend(), StoreBackend::File);
}

#[test]
fn the_duckdb_backend_honours_the_collection_contract() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DuckDbStore::open(dir.path().join("state.duckdb")).expect("open");
    exercise_contract(&store);
    assert_eq!(store.backend(), StoreBackend::DuckDb);
}

#[test]
fn the_memory_backend_honours_the_collection_contract() {
    exercise_contract(&MemoryStore::new());
}

// =============================================================================
// Store: Durability
// =============================================================================

#[test]
fn when_the_duckdb_file_is_reopened_documents_are_still_there() {
    // Given: A document written through one connection
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("state.duckdb");
    {
        let store = DuckDbStore::open(&path).expect("open");
        store
            .upsert(Collection::CacheData, "quote_AAPL", &json!({"value": 1}))
            .expect("write");
    }

    // When: The database is opened again
    let store = DuckDbStore::open(&path).expect("reopen");

    // Then: The document is readable
    assert_eq!(
        store.read(Collection::CacheData, "quote_AAPL").expect("read"),
        Some(json!({"value": 1}))
    );
}

#[test]
fn when_the_file_backend_writes_a_collection_it_lands_in_its_own_json_file() {
    // Given: A file store
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::open(dir.path()).expect("open");

    // When: A rate limit document is written
    store
        .upsert(Collection::RateLimits, "polygon", &json!({"requests": 2}))
        .expect("write");

    // Then: rate_limits.json holds it, keyed by provider
    let contents = fs::read_to_string(dir.path().join("rate_limits.json")).expect("file exists");
    let parsed: serde_json::Value = serde_json::from_str(&contents).expect("valid json");
    assert_eq!(parsed["polygon"]["requests"], 2);
    assert!(!dir.path().join("api_config.json").exists());
}

// =============================================================================
// Store: Backend Selection
// =============================================================================

#[test]
fn when_duckdb_cannot_be_opened_the_file_backend_takes_over() {
    // Given: A DuckDB path whose parent is a regular file
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").expect("write blocker");
    let mut settings = StoreSettings::new(dir.path().join("home"), StoreBackend::DuckDb);
    settings.duckdb_path = blocker.join("tickgate.duckdb");

    // When: The store is opened
    let store = open_store(&settings).expect("fallback succeeds");

    // Then: The file backend is in use in the home directory
    assert_eq!(store.backend(), StoreBackend::File);
    store
        .upsert(Collection::ApiConfig, "finnhub", &json!({}))
        .expect("write");
    assert!(dir.path().join("home").join("api_config.json").exists());
}

#[test]
fn store_settings_follow_the_environment() {
    let settings = StoreSettings::from_lookup(|name| match name {
        "TICKGATE_HOME" => Some(String::from("/var/lib/tickgate")),
        "TICKGATE_STORE" => Some(String::from("duckdb")),
        _ => None,
    });

    assert_eq!(settings.backend, StoreBackend::DuckDb);
    assert_eq!(settings.home, std::path::PathBuf::from("/var/lib/tickgate"));
    assert_eq!(
        settings.duckdb_path,
        std::path::PathBuf::from("/var/lib/tickgate/tickgate.duckdb")
    );
}

// =============================================================================
// Store: Credentials
// =============================================================================

#[test]
fn environment_credentials_are_used_but_never_persisted() {
    // Given: A stored Finnhub record without a key and a key in the environment
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let table = vec![(
        ProviderId::Finnhub,
        ProviderConfig::new("https://finnhub.io/api/v1", 4, 60, 60),
    )];

    // When: The registry loads
    let registry = ProviderRegistry::load(store.clone(), table, |name| {
        (name == "TICKGATE_FINNHUB_API_KEY").then(|| String::from("env-secret"))
    });

    // Then: The key is live in memory only
    let config = registry.get(ProviderId::Finnhub).expect("provider known");
    assert_eq!(config.api_key.as_deref(), Some("env-secret"));

    registry.flush();
    let document = store
        .read(Collection::ApiConfig, "finnhub")
        .expect("read")
        .expect("record persisted");
    assert!(document.get("apiKey").is_none(), "secret leaked: {document}");
    assert_eq!(document["priority"], 4);
}

#[test]
fn persisted_overrides_win_over_built_in_defaults() {
    // Given: An operator lowered Polygon's priority in a previous run
    let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
    let mut stored = ProviderConfig::default_for(ProviderId::Polygon);
    stored.priority = 1;
    stored.api_key = Some(String::from("stored-key"));
    store
        .upsert(
            Collection::ApiConfig,
            "polygon",
            &serde_json::to_value(&stored).expect("serialize"),
        )
        .expect("write");

    // When: The registry loads with the built-in table
    let registry = ProviderRegistry::load_default(store.clone());

    // Then: The stored record is in effect, stored key included
    let config = registry.get(ProviderId::Polygon).expect("provider known");
    assert_eq!(config.priority, 1);
    assert_eq!(config.api_key.as_deref(), Some("stored-key"));
}
