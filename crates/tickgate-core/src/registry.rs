use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::config::default_provider_table;
use crate::store::{Collection, DurableStore};
use crate::sync::lock_or_recover;
use crate::{ProviderConfig, ProviderId, UtcDateTime};

/// Provider table with one lock per record.
///
/// Every mutation goes through [`ProviderRegistry::update`], which persists the
/// record to the `api_config` collection while its lock is still held. When the
/// write fails the in-memory record stays authoritative and the next mutation
/// rewrites it in full.
pub struct ProviderRegistry {
    store: Arc<dyn DurableStore>,
    order: Vec<ProviderId>,
    records: HashMap<ProviderId, Mutex<ProviderConfig>>,
}

impl ProviderRegistry {
    /// Registry over an explicit table. Nothing is read from the store.
    pub fn new(store: Arc<dyn DurableStore>, table: Vec<(ProviderId, ProviderConfig)>) -> Self {
        let mut order = Vec::with_capacity(table.len());
        let mut records = HashMap::with_capacity(table.len());
        for (provider, config) in table {
            if records.insert(provider, Mutex::new(config)).is_none() {
                order.push(provider);
            }
        }

        Self {
            store,
            order,
            records,
        }
    }

    /// Builds the registry from `base`, persisted `api_config` documents and
    /// environment credentials, in that order of precedence (last wins).
    pub fn load<F>(store: Arc<dyn DurableStore>, base: Vec<(ProviderId, ProviderConfig)>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let table = base
            .into_iter()
            .map(|(provider, default)| {
                let mut config = match store.read(Collection::ApiConfig, provider.as_str()) {
                    Ok(Some(document)) => match serde_json::from_value::<ProviderConfig>(document) {
                        Ok(persisted) => persisted,
                        Err(err) => {
                            warn!("ignoring unreadable {provider} config document: {err}");
                            default
                        }
                    },
                    Ok(None) => default,
                    Err(err) => {
                        warn!("failed to read {provider} config, using defaults: {err}");
                        default
                    }
                };
                config.apply_env_credential(provider, &lookup);
                (provider, config)
            })
            .collect();

        let registry = Self::new(store, table);
        for provider in registry.providers() {
            if let Some(record) = registry.records.get(provider) {
                registry.persist(*provider, &lock_or_recover(record, provider.as_str()));
            }
        }
        registry
    }

    /// Default table with persisted overrides and process environment credentials.
    pub fn load_default(store: Arc<dyn DurableStore>) -> Self {
        Self::load(store, default_provider_table(), |name| std::env::var(name).ok())
    }

    /// Provider ids in configuration order.
    pub fn providers(&self) -> &[ProviderId] {
        &self.order
    }

    pub fn get(&self, provider: ProviderId) -> Option<ProviderConfig> {
        self.records
            .get(&provider)
            .map(|record| lock_or_recover(record, provider.as_str()).clone())
    }

    pub fn snapshot(&self) -> Vec<(ProviderId, ProviderConfig)> {
        self.order
            .iter()
            .filter_map(|provider| self.get(*provider).map(|config| (*provider, config)))
            .collect()
    }

    /// Read-modify-write of one record under its lock. Persists only when the
    /// record changed. Returns `None` for unknown providers.
    pub fn update<R>(&self, provider: ProviderId, change: impl FnOnce(&mut ProviderConfig) -> R) -> Option<R> {
        let record = self.records.get(&provider)?;
        let mut config = lock_or_recover(record, provider.as_str());
        let before = config.clone();
        let result = change(&mut config);
        if *config != before {
            self.persist(provider, &config);
        }
        Some(result)
    }

    /// Records a provider-reported quota exhaustion lasting until `until`.
    pub fn mark_quota_exhausted(&self, provider: ProviderId, until: UtcDateTime) {
        self.update(provider, |config| config.reset_time = Some(until.unix_millis()));
        warn!("{provider} reported its quota exhausted, ineligible until {until}");
    }

    /// Clears a provider-reported exhaustion window that ended before `now`.
    pub fn clear_expired_reset(&self, provider: ProviderId, now: UtcDateTime) -> bool {
        let cleared = self
            .update(provider, |config| match config.reset_time {
                Some(reset) if reset <= now.unix_millis() => {
                    config.reset_time = None;
                    true
                }
                _ => false,
            })
            .unwrap_or(false);
        if cleared {
            info!("{provider} quota window reopened");
        }
        cleared
    }

    /// Operator switch. Either direction clears any auto-disable window, so an
    /// operator disable stays in force until the operator enables again.
    pub fn set_enabled(&self, provider: ProviderId, enabled: bool) -> bool {
        self.update(provider, |config| {
            config.enabled = enabled;
            config.disabled_until = None;
            config.disabled_reason = None;
        })
        .is_some()
    }

    /// Writes every record to the store.
    pub fn flush(&self) {
        for provider in &self.order {
            if let Some(record) = self.records.get(provider) {
                self.persist(*provider, &lock_or_recover(record, provider.as_str()));
            }
        }
    }

    fn persist(&self, provider: ProviderId, config: &ProviderConfig) {
        let document = match serde_json::to_value(config.to_document()) {
            Ok(document) => document,
            Err(err) => {
                warn!("failed to encode {provider} config: {err}");
                return;
            }
        };

        match self.store.upsert(Collection::ApiConfig, provider.as_str(), &document) {
            Ok(()) => debug!("persisted {provider} config"),
            Err(err) => warn!("failed to persist {provider} config, keeping in-memory state: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn persisted_documents_override_defaults() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(
                Collection::ApiConfig,
                "finnhub",
                &json!({"baseUrl": "http://proxy", "priority": 1, "dailyLimit": 5, "minuteLimit": 1, "enabled": false}),
            )
            .expect("seed document");

        let registry = ProviderRegistry::load(store, default_provider_table(), no_env);
        let finnhub = registry.get(ProviderId::Finnhub).expect("finnhub present");

        assert_eq!(finnhub.base_url, "http://proxy");
        assert!(!finnhub.enabled);
        assert_eq!(registry.providers().len(), 7);
    }

    #[test]
    fn operator_disable_replaces_an_auto_disable_window() {
        let store = Arc::new(MemoryStore::new());
        let registry = ProviderRegistry::new(
            store.clone(),
            vec![(ProviderId::Finnhub, ProviderConfig::default_for(ProviderId::Finnhub))],
        );
        registry.update(ProviderId::Finnhub, |config| {
            config.enabled = false;
            config.disabled_until = Some(1_717_243_200_000);
            config.disabled_reason = Some(String::from("network"));
        });

        assert!(registry.set_enabled(ProviderId::Finnhub, false));

        let finnhub = registry.get(ProviderId::Finnhub).expect("finnhub present");
        assert!(!finnhub.enabled);
        assert_eq!(finnhub.disabled_until, None);
        assert_eq!(finnhub.disabled_reason, None);
        let document = store
            .read(Collection::ApiConfig, "finnhub")
            .expect("read")
            .expect("persisted");
        assert_eq!(document["enabled"], false);
        assert!(document.get("disabledUntil").is_none());
    }

    #[test]
    fn update_persists_changed_records() {
        let store = Arc::new(MemoryStore::new());
        let registry = ProviderRegistry::new(
            store.clone(),
            vec![(ProviderId::Polygon, ProviderConfig::default_for(ProviderId::Polygon))],
        );

        registry.update(ProviderId::Polygon, |config| config.priority = 2);

        let document = store
            .read(Collection::ApiConfig, "polygon")
            .expect("read")
            .expect("persisted");
        assert_eq!(document["priority"], 2);
    }

    #[test]
    fn update_on_unknown_provider_is_none() {
        let registry = ProviderRegistry::new(Arc::new(MemoryStore::new()), Vec::new());
        assert!(registry.update(ProviderId::Finnhub, |_| ()).is_none());
    }

    #[test]
    fn expired_reset_time_is_cleared() {
        let registry = ProviderRegistry::new(
            Arc::new(MemoryStore::new()),
            vec![(ProviderId::Alphavantage, ProviderConfig::default_for(ProviderId::Alphavantage))],
        );
        let now = UtcDateTime::parse("2024-01-02T00:00:00Z").expect("valid timestamp");
        registry.update(ProviderId::Alphavantage, |config| {
            config.reset_time = Some(now.unix_millis() - 1)
        });

        assert!(registry.clear_expired_reset(ProviderId::Alphavantage, now));
        assert!(!registry.clear_expired_reset(ProviderId::Alphavantage, now));
        assert_eq!(registry.get(ProviderId::Alphavantage).and_then(|c| c.reset_time), None);
    }
}
