use crate::availability::AvailabilityTracker;
use crate::rate_limit::RateLimitLedger;
use crate::{ProviderId, ProviderRegistry};

/// Picks eligible providers: available and within both budgets, lowest
/// priority first.
pub struct ProviderSelector<'a> {
    registry: &'a ProviderRegistry,
    ledger: &'a RateLimitLedger,
    tracker: &'a AvailabilityTracker,
}

impl<'a> ProviderSelector<'a> {
    pub fn new(
        registry: &'a ProviderRegistry,
        ledger: &'a RateLimitLedger,
        tracker: &'a AvailabilityTracker,
    ) -> Self {
        Self {
            registry,
            ledger,
            tracker,
        }
    }

    /// Eligible providers by ascending priority. Equal priorities keep
    /// configuration order.
    pub fn ranked(&self) -> Vec<ProviderId> {
        let mut eligible: Vec<(u32, ProviderId)> = self
            .registry
            .providers()
            .iter()
            .copied()
            .filter(|provider| self.tracker.is_available(*provider, self.registry))
            .filter_map(|provider| {
                let config = self.registry.get(provider)?;
                (self.ledger.has_remaining_quota(provider, &config)
                    && self.ledger.has_minute_capacity(provider))
                .then_some((config.priority, provider))
            })
            .collect();

        eligible.sort_by_key(|(priority, _)| *priority);
        eligible.into_iter().map(|(_, provider)| provider).collect()
    }

    pub fn select_best(&self) -> Option<ProviderId> {
        self.ranked().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::availability::AvailabilityPolicy;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::ProviderConfig;

    struct Fixture {
        registry: ProviderRegistry,
        ledger: RateLimitLedger,
        tracker: AvailabilityTracker,
    }

    fn fixture(table: Vec<(ProviderId, ProviderConfig)>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let registry = ProviderRegistry::new(store.clone(), table);
        let ledger = RateLimitLedger::load(store, clock.clone(), Duration::from_secs(86_400), &registry);
        let tracker = AvailabilityTracker::new(AvailabilityPolicy::default(), clock);
        Fixture {
            registry,
            ledger,
            tracker,
        }
    }

    #[test]
    fn equal_priorities_keep_configuration_order() {
        let f = fixture(vec![
            (ProviderId::Polygon, ProviderConfig::new("http://p", 3, 10, 0)),
            (ProviderId::Finnhub, ProviderConfig::new("http://f", 3, 10, 0)),
            (ProviderId::Iexcloud, ProviderConfig::new("http://i", 1, 10, 0)),
        ]);
        let selector = ProviderSelector::new(&f.registry, &f.ledger, &f.tracker);

        assert_eq!(
            selector.ranked(),
            vec![ProviderId::Iexcloud, ProviderId::Polygon, ProviderId::Finnhub]
        );
    }

    #[test]
    fn a_provider_out_of_minute_tokens_is_passed_over() {
        let f = fixture(vec![
            (ProviderId::Finnhub, ProviderConfig::new("http://f", 1, 10, 1)),
            (ProviderId::Polygon, ProviderConfig::new("http://p", 2, 10, 0)),
        ]);
        let config = f.registry.get(ProviderId::Finnhub).expect("configured");
        assert!(f.ledger.try_acquire(ProviderId::Finnhub, &config));

        let selector = ProviderSelector::new(&f.registry, &f.ledger, &f.tracker);
        assert_eq!(selector.ranked(), vec![ProviderId::Polygon]);
    }

    #[test]
    fn nothing_eligible_yields_none() {
        let f = fixture(vec![(ProviderId::Polygon, ProviderConfig::new("http://p", 1, 0, 0))]);
        let selector = ProviderSelector::new(&f.registry, &f.ledger, &f.tracker);
        assert_eq!(selector.select_best(), None);
    }
}
