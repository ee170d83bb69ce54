//! Provider table, gateway tuning and store selection.
//!
//! Built-in provider defaults live here. Persisted overrides from the
//! `api_config` collection and environment credentials are layered on top by
//! [`crate::ProviderRegistry::load`].

use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::availability::AvailabilityPolicy;
use crate::store::StoreBackend;
use crate::{ProviderId, UtcDateTime};

/// Configuration and mutable health flags for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub priority: u32,
    pub daily_limit: u32,
    pub minute_limit: u32,
    #[serde(default)]
    pub supports_bulk: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_limit: Option<u32>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Epoch millis until which the provider reported its own quota exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<i64>,
    /// Epoch millis until which the provider is auto-disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_until: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    /// Set when `api_key` came from the environment; such keys are not persisted.
    #[serde(skip)]
    pub credential_from_env: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, priority: u32, daily_limit: u32, minute_limit: u32) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            priority,
            daily_limit,
            minute_limit,
            supports_bulk: false,
            bulk_limit: None,
            enabled: true,
            reset_time: None,
            disabled_until: None,
            disabled_reason: None,
            credential_from_env: false,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_bulk_limit(mut self, bulk_limit: u32) -> Self {
        self.supports_bulk = true;
        self.bulk_limit = Some(bulk_limit);
        self
    }

    /// Built-in defaults for `provider`.
    pub fn default_for(provider: ProviderId) -> Self {
        match provider {
            ProviderId::Alphavantage => Self::new("https://www.alphavantage.co/query", 1, 25, 5),
            ProviderId::Twelvedata => {
                Self::new("https://api.twelvedata.com", 2, 800, 8).with_bulk_limit(120)
            }
            ProviderId::Finnhub => Self::new("https://finnhub.io/api/v1", 4, 60, 60),
            ProviderId::Iexcloud => {
                Self::new("https://cloud.iexapis.com/stable", 5, 500_000, 100).with_bulk_limit(100)
            }
            ProviderId::Polygon => Self::new("https://api.polygon.io/v2", 6, 5, 5),
            ProviderId::Worldtradingdata => {
                Self::new("https://api.worldtradingdata.com/api/v1", 8, 250, 5).with_bulk_limit(5)
            }
            ProviderId::Marketstack => Self::new("http://api.marketstack.com/v1", 9, 1000, 10),
        }
    }

    /// Whether a provider-reported exhaustion window is still running at `now`.
    pub fn is_rate_limited_at(&self, now: UtcDateTime) -> bool {
        self.reset_time
            .is_some_and(|reset| now.unix_millis() < reset)
    }

    pub fn reset_time_utc(&self) -> Option<UtcDateTime> {
        self.reset_time.and_then(|ms| UtcDateTime::from_unix_millis(ms).ok())
    }

    pub fn disabled_until_utc(&self) -> Option<UtcDateTime> {
        self.disabled_until
            .and_then(|ms| UtcDateTime::from_unix_millis(ms).ok())
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }

    /// Replaces the credential with one from `lookup`, if any.
    ///
    /// `TICKGATE_<PROVIDER>_API_KEY` wins over `<PROVIDER>_API_KEY`.
    pub fn apply_env_credential<F>(&mut self, provider: ProviderId, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let plain = provider.credential_env_var();
        let prefixed = format!("TICKGATE_{plain}");
        let found = [prefixed, plain]
            .iter()
            .filter_map(|name| lookup(name.as_str()))
            .find(|value| !value.trim().is_empty());

        if let Some(value) = found {
            self.api_key = Some(value.trim().to_owned());
            self.credential_from_env = true;
        }
    }

    /// Durable form of this record. Environment credentials stay out of the store.
    pub fn to_document(&self) -> Self {
        let mut document = self.clone();
        if document.credential_from_env {
            document.api_key = None;
        }
        document
    }
}

/// Default provider table in configuration order.
pub fn default_provider_table() -> Vec<(ProviderId, ProviderConfig)> {
    ProviderId::ALL
        .into_iter()
        .map(|provider| (provider, ProviderConfig::default_for(provider)))
        .collect()
}

/// Tuning knobs for [`crate::QuoteGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    /// Providers tried per request before the offline fallback.
    pub max_provider_attempts: usize,
    /// Length of the coarse quota window.
    pub quota_window: Duration,
    /// How long a provider stays ineligible after reporting quota exhaustion.
    pub provider_reset_after: Duration,
    pub availability: AvailabilityPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(60 * 60),
            max_provider_attempts: 1,
            quota_window: Duration::from_secs(24 * 60 * 60),
            provider_reset_after: Duration::from_secs(24 * 60 * 60),
            availability: AvailabilityPolicy::default(),
        }
    }
}

/// Where durable state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub home: PathBuf,
    pub backend: StoreBackend,
    pub duckdb_path: PathBuf,
}

impl StoreSettings {
    pub fn new(home: impl Into<PathBuf>, backend: StoreBackend) -> Self {
        let home = home.into();
        let duckdb_path = home.join("tickgate.duckdb");
        Self {
            home,
            backend,
            duckdb_path,
        }
    }

    /// Resolves `TICKGATE_HOME`, `TICKGATE_STORE` and `TICKGATE_DUCKDB_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("TICKGATE_HOME")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(".tickgate")))
            .unwrap_or_else(|| PathBuf::from(".tickgate"));

        let backend = match lookup("TICKGATE_STORE") {
            None => StoreBackend::File,
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!("unknown TICKGATE_STORE value '{value}', using the file store");
                StoreBackend::File
            }),
        };

        let mut settings = Self::new(home, backend);
        if let Some(path) = lookup("TICKGATE_DUCKDB_PATH").filter(|value| !value.trim().is_empty()) {
            settings.duckdb_path = PathBuf::from(path);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn default_table_follows_priority_and_limits() {
        let table = default_provider_table();
        assert_eq!(table.len(), 7);
        assert_eq!(table[0].0, ProviderId::Alphavantage);
        assert_eq!(table[0].1.priority, 1);
        assert_eq!(table[0].1.daily_limit, 25);

        let twelvedata = ProviderConfig::default_for(ProviderId::Twelvedata);
        assert!(twelvedata.supports_bulk);
        assert_eq!(twelvedata.bulk_limit, Some(120));
    }

    #[test]
    fn prefixed_env_credential_wins_and_is_not_persisted() {
        let mut config = ProviderConfig::default_for(ProviderId::Finnhub).with_api_key("stored");
        config.apply_env_credential(
            ProviderId::Finnhub,
            lookup_from(&[
                ("FINNHUB_API_KEY", "plain"),
                ("TICKGATE_FINNHUB_API_KEY", "prefixed"),
            ]),
        );

        assert_eq!(config.api_key.as_deref(), Some("prefixed"));
        assert_eq!(config.to_document().api_key, None);
    }

    #[test]
    fn missing_env_credential_keeps_stored_key() {
        let mut config = ProviderConfig::default_for(ProviderId::Polygon).with_api_key("stored");
        config.apply_env_credential(ProviderId::Polygon, lookup_from(&[]));

        assert_eq!(config.api_key.as_deref(), Some("stored"));
        assert_eq!(config.to_document().api_key.as_deref(), Some("stored"));
    }

    #[test]
    fn documents_use_camel_case_and_default_enabled() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"baseUrl":"http://x","priority":3,"dailyLimit":10,"minuteLimit":2,"resetTime":1700000000000}"#,
        )
        .expect("document should parse");

        assert!(config.enabled);
        assert_eq!(config.reset_time, Some(1_700_000_000_000));
        let json = serde_json::to_value(&config).expect("serializable");
        assert_eq!(json["dailyLimit"], 10);
        assert!(json.get("disabledUntil").is_none());
    }

    #[test]
    fn store_settings_resolve_from_environment() {
        let settings = StoreSettings::from_lookup(lookup_from(&[
            ("TICKGATE_HOME", "/var/lib/tickgate"),
            ("TICKGATE_STORE", "duckdb"),
        ]));
        assert_eq!(settings.home, PathBuf::from("/var/lib/tickgate"));
        assert_eq!(settings.backend, StoreBackend::DuckDb);
        assert_eq!(settings.duckdb_path, PathBuf::from("/var/lib/tickgate/tickgate.duckdb"));

        let fallback = StoreSettings::from_lookup(lookup_from(&[("TICKGATE_STORE", "redis")]));
        assert_eq!(fallback.backend, StoreBackend::File);
        assert_eq!(fallback.home, PathBuf::from(".tickgate"));
    }
}
