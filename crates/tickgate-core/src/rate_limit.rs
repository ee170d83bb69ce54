//! Per-provider call accounting.
//!
//! Two budgets apply to every provider. The daily budget is a persisted
//! counter that resets once its 24h window has elapsed. The per-minute budget
//! is an in-memory token bucket driven by the ledger's clock and is never
//! persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::store::{Collection, DurableStore};
use crate::sync::lock_or_recover;
use crate::{ProviderConfig, ProviderId, ProviderRegistry, UtcDateTime};

/// Calls made in the current quota window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub requests: u32,
    pub last_reset: UtcDateTime,
}

impl RateLimitState {
    pub fn fresh(now: UtcDateTime) -> Self {
        Self {
            requests: 0,
            last_reset: now,
        }
    }
}

/// Token bucket refilled continuously at `capacity` tokens per minute.
#[derive(Debug)]
struct MinuteBucket {
    capacity: f64,
    tokens: f64,
    last_refill: UtcDateTime,
}

impl MinuteBucket {
    fn new(per_minute: u32, now: UtcDateTime) -> Self {
        let capacity = f64::from(per_minute);
        Self {
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: UtcDateTime) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.capacity / 60.0).min(self.capacity);
        self.last_refill = now;
    }

    fn has_token(&mut self, now: UtcDateTime) -> bool {
        self.refill(now);
        self.tokens >= 1.0
    }

    fn take(&mut self, now: UtcDateTime) -> bool {
        if !self.has_token(now) {
            return false;
        }
        self.tokens -= 1.0;
        true
    }

    fn refund(&mut self) {
        self.tokens = (self.tokens + 1.0).min(self.capacity);
    }
}

/// Daily counters plus per-minute buckets, one lock per provider.
///
/// When both locks are needed the daily counter is taken first.
pub struct RateLimitLedger {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    states: HashMap<ProviderId, Mutex<RateLimitState>>,
    minute_buckets: HashMap<ProviderId, Mutex<MinuteBucket>>,
}

impl RateLimitLedger {
    /// Loads persisted counters for every provider in `registry`.
    pub fn load(
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
        registry: &ProviderRegistry,
    ) -> Self {
        let now = clock.now();
        let mut states = HashMap::new();
        let mut minute_buckets = HashMap::new();

        for (provider, config) in registry.snapshot() {
            let state: RateLimitState = match store.read(Collection::RateLimits, provider.as_str()) {
                Ok(Some(document)) => serde_json::from_value(document).unwrap_or_else(|err| {
                    warn!("ignoring unreadable {provider} rate limit document: {err}");
                    RateLimitState::fresh(now)
                }),
                Ok(None) => RateLimitState::fresh(now),
                Err(err) => {
                    warn!("failed to read {provider} rate limits, starting fresh: {err}");
                    RateLimitState::fresh(now)
                }
            };
            states.insert(provider, Mutex::new(state));

            if config.minute_limit > 0 {
                minute_buckets.insert(
                    provider,
                    Mutex::new(MinuteBucket::new(config.minute_limit, now)),
                );
            }
        }

        Self {
            store,
            clock,
            window,
            states,
            minute_buckets,
        }
    }

    /// Resets every counter whose window has elapsed and reopens providers
    /// whose self-reported exhaustion window has passed. Returns how many
    /// counters were reset.
    pub fn maybe_reset_all(&self, registry: &ProviderRegistry) -> usize {
        let now = self.clock.now();
        let mut reset = 0;

        for provider in registry.providers() {
            if let Some(record) = self.states.get(provider) {
                let mut state = lock_or_recover(record, provider.as_str());
                if now.duration_since(state.last_reset) >= self.window {
                    info!(
                        "resetting {provider} quota window ({} calls since {})",
                        state.requests, state.last_reset
                    );
                    *state = RateLimitState::fresh(now);
                    self.persist(*provider, &state);
                    reset += 1;
                }
            }
            registry.clear_expired_reset(*provider, now);
        }

        reset
    }

    /// Whether `provider` may be called within its daily budget.
    pub fn has_remaining_quota(&self, provider: ProviderId, config: &ProviderConfig) -> bool {
        if config.is_rate_limited_at(self.clock.now()) {
            debug!("{provider} is rate limited until {:?}", config.reset_time_utc());
            return false;
        }

        self.requests(provider) < config.daily_limit
    }

    /// Whether `provider` has a per-minute token left. Consumes nothing.
    ///
    /// Providers without a minute limit always have capacity.
    pub fn has_minute_capacity(&self, provider: ProviderId) -> bool {
        self.minute_buckets.get(&provider).map_or(true, |bucket| {
            lock_or_recover(bucket, provider.as_str()).has_token(self.clock.now())
        })
    }

    pub fn record_call(&self, provider: ProviderId) {
        let Some(record) = self.states.get(&provider) else {
            warn!("record_call for unknown provider {provider}");
            return;
        };

        let mut state = lock_or_recover(record, provider.as_str());
        state.requests = state.requests.saturating_add(1);
        self.persist(provider, &state);
    }

    /// Atomic check-and-increment against both budgets.
    ///
    /// Returns `false` without consuming anything when either budget is spent.
    pub fn try_acquire(&self, provider: ProviderId, config: &ProviderConfig) -> bool {
        if config.is_rate_limited_at(self.clock.now()) {
            return false;
        }
        let Some(record) = self.states.get(&provider) else {
            return false;
        };

        let mut state = lock_or_recover(record, provider.as_str());
        if state.requests >= config.daily_limit {
            debug!("{provider} daily budget spent ({}/{})", state.requests, config.daily_limit);
            return false;
        }
        if let Some(bucket) = self.minute_buckets.get(&provider) {
            if !lock_or_recover(bucket, provider.as_str()).take(self.clock.now()) {
                debug!("{provider} per-minute budget spent");
                return false;
            }
        }

        state.requests += 1;
        self.persist(provider, &state);
        true
    }

    /// Hands back a slot whose call never reached the provider, on both
    /// budgets.
    pub fn release(&self, provider: ProviderId) {
        if let Some(record) = self.states.get(&provider) {
            let mut state = lock_or_recover(record, provider.as_str());
            state.requests = state.requests.saturating_sub(1);
            self.persist(provider, &state);
            if let Some(bucket) = self.minute_buckets.get(&provider) {
                lock_or_recover(bucket, provider.as_str()).refund();
            }
        }
    }

    pub fn requests(&self, provider: ProviderId) -> u32 {
        self.state(provider).map_or(0, |state| state.requests)
    }

    pub fn state(&self, provider: ProviderId) -> Option<RateLimitState> {
        self.states
            .get(&provider)
            .map(|record| *lock_or_recover(record, provider.as_str()))
    }

    /// Writes every counter to the store.
    pub fn flush(&self) {
        for (provider, record) in &self.states {
            self.persist(*provider, &lock_or_recover(record, provider.as_str()));
        }
    }

    fn persist(&self, provider: ProviderId, state: &RateLimitState) {
        let result = serde_json::to_value(state)
            .map_err(crate::StoreError::from)
            .and_then(|document| {
                self.store
                    .upsert(Collection::RateLimits, provider.as_str(), &document)
            });
        if let Err(err) = result {
            warn!("failed to persist {provider} rate limits, keeping in-memory state: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn start() -> UtcDateTime {
        UtcDateTime::parse("2024-06-01T09:00:00Z").expect("valid timestamp")
    }

    fn fixture(daily_limit: u32, minute_limit: u32) -> (ProviderRegistry, RateLimitLedger, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let registry = ProviderRegistry::new(
            store.clone(),
            vec![(
                ProviderId::Finnhub,
                ProviderConfig::new("http://finnhub.test", 1, daily_limit, minute_limit),
            )],
        );
        let ledger = RateLimitLedger::load(store.clone(), clock.clone(), DAY, &registry);
        (registry, ledger, clock, store)
    }

    #[test]
    fn try_acquire_stops_at_the_daily_limit() {
        let (registry, ledger, _, _) = fixture(2, 0);
        let config = registry.get(ProviderId::Finnhub).expect("configured");

        assert!(ledger.try_acquire(ProviderId::Finnhub, &config));
        assert!(ledger.try_acquire(ProviderId::Finnhub, &config));
        assert!(!ledger.try_acquire(ProviderId::Finnhub, &config));
        assert_eq!(ledger.requests(ProviderId::Finnhub), 2);
    }

    #[test]
    fn minute_limit_rejects_bursts_without_counting_them() {
        let (registry, ledger, _, _) = fixture(100, 1);
        let config = registry.get(ProviderId::Finnhub).expect("configured");

        assert!(ledger.try_acquire(ProviderId::Finnhub, &config));
        assert!(!ledger.try_acquire(ProviderId::Finnhub, &config));
        assert_eq!(ledger.requests(ProviderId::Finnhub), 1);
    }

    #[test]
    fn minute_capacity_is_peeked_without_spending_it() {
        let (registry, ledger, clock, _) = fixture(100, 2);
        let config = registry.get(ProviderId::Finnhub).expect("configured");

        assert!(ledger.has_minute_capacity(ProviderId::Finnhub));
        assert!(ledger.has_minute_capacity(ProviderId::Finnhub));
        assert!(ledger.try_acquire(ProviderId::Finnhub, &config));
        assert!(ledger.try_acquire(ProviderId::Finnhub, &config));
        assert!(!ledger.has_minute_capacity(ProviderId::Finnhub));

        clock.advance(Duration::from_secs(30));
        assert!(ledger.has_minute_capacity(ProviderId::Finnhub));
    }

    #[test]
    fn providers_without_a_minute_limit_always_have_capacity() {
        let (_, ledger, _, _) = fixture(100, 0);
        assert!(ledger.has_minute_capacity(ProviderId::Finnhub));
    }

    #[test]
    fn release_hands_back_the_minute_token_too() {
        let (registry, ledger, _, _) = fixture(100, 1);
        let config = registry.get(ProviderId::Finnhub).expect("configured");

        assert!(ledger.try_acquire(ProviderId::Finnhub, &config));
        assert!(!ledger.has_minute_capacity(ProviderId::Finnhub));

        ledger.release(ProviderId::Finnhub);
        assert!(ledger.has_minute_capacity(ProviderId::Finnhub));
        assert!(ledger.try_acquire(ProviderId::Finnhub, &config));
        assert_eq!(ledger.requests(ProviderId::Finnhub), 1);
    }

    #[test]
    fn release_returns_a_slot() {
        let (registry, ledger, _, _) = fixture(1, 0);
        let config = registry.get(ProviderId::Finnhub).expect("configured");

        assert!(ledger.try_acquire(ProviderId::Finnhub, &config));
        ledger.release(ProviderId::Finnhub);
        assert!(ledger.has_remaining_quota(ProviderId::Finnhub, &config));
    }

    #[test]
    fn future_reset_time_blocks_regardless_of_counters() {
        let (registry, ledger, clock, _) = fixture(10, 0);
        let until = clock.now().after(Duration::from_secs(60));
        registry.mark_quota_exhausted(ProviderId::Finnhub, until);
        let config = registry.get(ProviderId::Finnhub).expect("configured");

        assert!(!ledger.has_remaining_quota(ProviderId::Finnhub, &config));
        assert!(!ledger.try_acquire(ProviderId::Finnhub, &config));

        clock.advance(Duration::from_secs(61));
        ledger.maybe_reset_all(&registry);
        let config = registry.get(ProviderId::Finnhub).expect("configured");
        assert_eq!(config.reset_time, None);
        assert!(ledger.has_remaining_quota(ProviderId::Finnhub, &config));
    }

    #[test]
    fn counters_are_persisted_on_every_call() {
        let (_, ledger, _, store) = fixture(10, 0);
        ledger.record_call(ProviderId::Finnhub);
        ledger.record_call(ProviderId::Finnhub);

        let document = store
            .read(Collection::RateLimits, "finnhub")
            .expect("read")
            .expect("persisted");
        assert_eq!(document["requests"], 2);
        assert!(document.get("lastReset").is_some());
    }
}
