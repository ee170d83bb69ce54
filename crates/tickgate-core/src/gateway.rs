use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::adapters::default_adapters;
use crate::availability::AvailabilityTracker;
use crate::cache::{quote_cache_key, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::default_provider_table;
use crate::data_source::{FetchContext, FetchError, FetchErrorKind, QuoteAdapter};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::offline::offline_sample_quote;
use crate::rate_limit::RateLimitLedger;
use crate::selector::ProviderSelector;
use crate::status::{FirewallAssessment, GatewayStatus, ProviderStatus};
use crate::store::DurableStore;
use crate::{GatewaySettings, ProviderConfig, ProviderId, ProviderRegistry, Quote, StoreError, Symbol};

type CredentialLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Quote gateway: cache, quota ledger, availability tracking and provider
/// fallback behind one total operation, [`QuoteGateway::get_quote`].
///
/// All state lives in the instance. Share it behind an `Arc`.
pub struct QuoteGateway {
    settings: GatewaySettings,
    clock: Arc<dyn Clock>,
    store: Arc<dyn DurableStore>,
    registry: ProviderRegistry,
    ledger: RateLimitLedger,
    tracker: AvailabilityTracker,
    cache: ResponseCache,
    adapters: HashMap<ProviderId, Arc<dyn QuoteAdapter>>,
}

/// Builder for [`QuoteGateway`].
///
/// Defaults: system clock, default settings, the built-in provider table,
/// credentials from the process environment and reqwest-backed adapters.
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use tickgate_core::{open_store, QuoteGatewayBuilder, StoreSettings};
///
/// let store = open_store(&StoreSettings::from_env())?;
/// let gateway = Arc::new(QuoteGatewayBuilder::new(store).build());
/// let quote = gateway.get_quote(&"AAPL".parse()?).await;
/// ```
pub struct QuoteGatewayBuilder {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    settings: GatewaySettings,
    table: Vec<(ProviderId, ProviderConfig)>,
    credentials: CredentialLookup,
    http_client: Option<Arc<dyn HttpClient>>,
    adapters: Vec<Arc<dyn QuoteAdapter>>,
}

impl QuoteGatewayBuilder {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            settings: GatewaySettings::default(),
            table: default_provider_table(),
            credentials: Arc::new(|name: &str| std::env::var(name).ok()),
            http_client: None,
            adapters: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: GatewaySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the built-in provider table. Persisted overrides still apply.
    pub fn with_provider_table(mut self, table: Vec<(ProviderId, ProviderConfig)>) -> Self {
        self.table = table;
        self
    }

    pub fn with_credential_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.credentials = Arc::new(lookup);
        self
    }

    /// Ignores environment credentials; only configured keys are used.
    pub fn without_env_credentials(self) -> Self {
        self.with_credential_lookup(|_| None)
    }

    /// Transport for the built-in adapters.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Replaces the built-in adapter for `adapter.id()`.
    pub fn with_adapter(mut self, adapter: Arc<dyn QuoteAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> QuoteGateway {
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let mut adapters: HashMap<ProviderId, Arc<dyn QuoteAdapter>> = default_adapters(http_client)
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect();
        for adapter in self.adapters {
            adapters.insert(adapter.id(), adapter);
        }

        let credentials = self.credentials;
        let registry = ProviderRegistry::load(Arc::clone(&self.store), self.table, |name: &str| credentials(name));
        let ledger = RateLimitLedger::load(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.settings.quota_window,
            &registry,
        );
        let tracker = AvailabilityTracker::new(self.settings.availability, Arc::clone(&self.clock));
        let cache = ResponseCache::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.settings.cache_ttl,
        );

        info!(
            "quote gateway ready: {} providers, {} store",
            registry.providers().len(),
            self.store.backend()
        );

        QuoteGateway {
            settings: self.settings,
            clock: self.clock,
            store: self.store,
            registry,
            ledger,
            tracker,
            cache,
            adapters,
        }
    }
}

impl QuoteGateway {
    pub fn builder(store: Arc<dyn DurableStore>) -> QuoteGatewayBuilder {
        QuoteGatewayBuilder::new(store)
    }

    /// Latest quote for `symbol`. Never fails: when no provider can answer the
    /// result is an offline sample with [`crate::QuoteSource::OfflineSample`].
    pub async fn get_quote(&self, symbol: &Symbol) -> Quote {
        self.get_quote_until(symbol, std::future::pending::<()>())
            .await
    }

    /// Like [`QuoteGateway::get_quote`], giving up on the provider after `deadline`.
    pub async fn get_quote_with_deadline(&self, symbol: &Symbol, deadline: Duration) -> Quote {
        self.get_quote_until(symbol, tokio::time::sleep(deadline))
            .await
    }

    /// Like [`QuoteGateway::get_quote`], abandoning the in-flight provider call
    /// once `cancel` completes. A cancelled call releases its quota slot, does
    /// not count as a provider failure and yields the offline sample.
    pub async fn get_quote_until<C>(&self, symbol: &Symbol, cancel: C) -> Quote
    where
        C: Future<Output = ()>,
    {
        let request_id = Uuid::new_v4();
        let key = quote_cache_key(symbol);

        if let Some(quote) = self.cache.get(&key).await {
            debug!("[{request_id}] cache hit for {symbol}");
            return quote;
        }

        self.ledger.maybe_reset_all(&self.registry);
        let candidates = self.selector().ranked();
        if candidates.is_empty() {
            info!("[{request_id}] no eligible provider for {symbol}");
        }

        tokio::pin!(cancel);
        let mut attempts_left = self.settings.max_provider_attempts.max(1);
        for provider in candidates {
            if attempts_left == 0 {
                break;
            }
            match self.attempt(provider, symbol, cancel.as_mut()).await {
                Ok(quote) => {
                    info!("[{request_id}] {symbol} served by {provider}");
                    self.cache
                        .set(&key, &quote, Some(self.settings.cache_ttl))
                        .await;
                    return quote;
                }
                Err(err) if err.is_cancelled() => {
                    info!("[{request_id}] {symbol} request cancelled while waiting on {provider}");
                    break;
                }
                // Lost the budget to a concurrent request; no call was made.
                Err(err) if err.kind() == FetchErrorKind::RateLimited => {
                    debug!("[{request_id}] {provider} budget spent since selection, trying next");
                    continue;
                }
                Err(err) => warn!("[{request_id}] {symbol} via {provider} failed: {err}"),
            }
            attempts_left -= 1;
        }

        info!("[{request_id}] serving offline sample for {symbol}");
        offline_sample_quote(symbol, self.clock.now())
    }

    /// Quotes for every symbol, fetched concurrently, in input order.
    pub async fn get_quotes(self: &Arc<Self>, symbols: &[Symbol]) -> Vec<Quote> {
        let mut tasks = JoinSet::new();
        for (index, symbol) in symbols.iter().cloned().enumerate() {
            let gateway = Arc::clone(self);
            tasks.spawn(async move { (index, gateway.get_quote(&symbol).await) });
        }

        let mut slots: Vec<Option<Quote>> = vec![None; symbols.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, quote)) => slots[index] = Some(quote),
                Err(err) => warn!("quote task failed: {err}"),
            }
        }

        symbols
            .iter()
            .zip(slots)
            .map(|(symbol, slot)| slot.unwrap_or_else(|| offline_sample_quote(symbol, self.clock.now())))
            .collect()
    }

    /// One provider attempt: reserve a slot, call with a timeout, settle the
    /// ledger and the tracker from the outcome.
    async fn attempt<C>(&self, provider: ProviderId, symbol: &Symbol, mut cancel: Pin<&mut C>) -> Result<Quote, FetchError>
    where
        C: Future<Output = ()>,
    {
        let adapter = self
            .adapters
            .get(&provider)
            .ok_or_else(|| FetchError::unsupported(provider))?;
        let config = self
            .registry
            .get(provider)
            .ok_or_else(|| FetchError::unsupported(provider))?;
        if !self.ledger.try_acquire(provider, &config) {
            return Err(FetchError::rate_limited(provider));
        }

        let timeout = self.settings.request_timeout;
        let context = FetchContext::new(self.clock.now(), timeout);
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, adapter.fetch(symbol, &config, context)) => {
                result.unwrap_or_else(|_| {
                    Err(FetchError::network(
                        provider,
                        format!("no response within {}ms", timeout.as_millis()),
                    ))
                })
            }
            () = &mut cancel => Err(FetchError::cancelled(provider)),
        };

        match &outcome {
            Ok(_) => self.tracker.record_success(provider),
            Err(err) => {
                if !err.consumed_quota() {
                    self.ledger.release(provider);
                }
                if err.is_network() {
                    self.tracker.record_failure(provider, err, &self.registry);
                }
                if err.kind() == FetchErrorKind::QuotaExhausted {
                    let until = self.clock.now().after(self.settings.provider_reset_after);
                    self.registry.mark_quota_exhausted(provider, until);
                }
            }
        }
        outcome
    }

    /// Administrative snapshot of every provider, the cache and the store.
    pub async fn status(&self) -> GatewayStatus {
        self.ledger.maybe_reset_all(&self.registry);
        let now = self.clock.now();
        let providers: Vec<ProviderStatus> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|(provider, config)| {
                ProviderStatus::from_config(
                    provider,
                    &config,
                    self.ledger.requests(provider),
                    self.tracker.failure_count(provider),
                    now,
                )
            })
            .collect();
        let firewall = FirewallAssessment::from_providers(&providers);

        GatewayStatus {
            generated_at: now,
            storage: self.store.backend(),
            cache_entries: self.cache.len().await,
            providers,
            firewall,
        }
    }

    /// Empties both cache tiers.
    pub async fn clear_cache(&self) -> Result<(), StoreError> {
        self.cache.clear().await?;
        info!("quote cache cleared");
        Ok(())
    }

    pub async fn sweep_cache(&self) -> usize {
        self.cache.sweep_expired().await
    }

    /// Starts the periodic cache sweep every `sweep_interval`. Abort the
    /// handle to stop it. Must be called inside a tokio runtime.
    pub fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        self.cache.spawn_sweeper(self.settings.sweep_interval)
    }

    /// Operator switch for a provider. Returns `false` for unknown providers.
    pub fn set_provider_enabled(&self, provider: ProviderId, enabled: bool) -> bool {
        let known = self.registry.set_enabled(provider, enabled);
        if known && enabled {
            self.tracker.record_success(provider);
        }
        known
    }

    /// Writes provider records and ledger counters to the store.
    pub fn flush(&self) {
        self.registry.flush();
        self.ledger.flush();
        debug!("gateway state flushed");
    }

    pub fn selector(&self) -> ProviderSelector<'_> {
        ProviderSelector::new(&self.registry, &self.ledger, &self.tracker)
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &RateLimitLedger {
        &self.ledger
    }

    pub fn tracker(&self) -> &AvailabilityTracker {
        &self.tracker
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::http_client::{HttpError, HttpResponse, ScriptedHttpClient};
    use crate::store::MemoryStore;
    use crate::{QuoteSource, UtcDateTime};

    const FINNHUB_OK: &str = r#"{"c":415.26,"d":-3.22,"dp":-0.77}"#;

    fn finnhub_only() -> Vec<(ProviderId, ProviderConfig)> {
        vec![(
            ProviderId::Finnhub,
            ProviderConfig::new("http://finnhub.test", 1, 60, 0).with_api_key("key"),
        )]
    }

    fn gateway_with(client: Arc<ScriptedHttpClient>) -> QuoteGateway {
        QuoteGatewayBuilder::new(Arc::new(MemoryStore::new()))
            .with_clock(Arc::new(ManualClock::new(
                UtcDateTime::parse("2024-06-01T12:00:00Z").expect("valid timestamp"),
            )))
            .with_provider_table(finnhub_only())
            .without_env_credentials()
            .with_http_client(client)
            .build()
    }

    fn msft() -> Symbol {
        Symbol::parse("MSFT").expect("valid symbol")
    }

    #[tokio::test]
    async fn success_counts_one_call_and_caches() {
        let client = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(FINNHUB_OK))));
        let gateway = gateway_with(client.clone());

        let first = gateway.get_quote(&msft()).await;
        let second = gateway.get_quote(&msft()).await;

        assert_eq!(first.source, QuoteSource::Provider(ProviderId::Finnhub));
        assert_eq!(first, second);
        assert_eq!(client.call_count(), 1);
        assert_eq!(gateway.ledger().requests(ProviderId::Finnhub), 1);
    }

    #[tokio::test]
    async fn network_failure_releases_the_slot_and_falls_back() {
        let client = Arc::new(ScriptedHttpClient::always(Err(HttpError::refused("ECONNREFUSED"))));
        let gateway = gateway_with(client);

        let quote = gateway.get_quote(&msft()).await;

        assert!(quote.is_synthetic());
        assert_eq!(gateway.ledger().requests(ProviderId::Finnhub), 0);
        assert_eq!(gateway.tracker().failure_count(ProviderId::Finnhub), 1);
    }

    #[tokio::test]
    async fn application_failure_keeps_the_slot_and_leaves_the_tracker_alone() {
        let client = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::with_status(
            500,
            "internal error",
        ))));
        let gateway = gateway_with(client);

        let quote = gateway.get_quote(&msft()).await;

        assert!(quote.is_synthetic());
        assert_eq!(gateway.ledger().requests(ProviderId::Finnhub), 1);
        assert_eq!(gateway.tracker().failure_count(ProviderId::Finnhub), 0);
    }

    #[tokio::test]
    async fn offline_samples_are_not_cached() {
        let client = Arc::new(ScriptedHttpClient::always(Err(HttpError::dns("ENOTFOUND"))));
        let gateway = gateway_with(client.clone());

        gateway.get_quote(&msft()).await;
        gateway.get_quote(&msft()).await;

        assert_eq!(client.call_count(), 2);
        assert_eq!(gateway.cache().len().await, 0);
    }
}
