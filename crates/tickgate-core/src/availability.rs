use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::data_source::FetchError;
use crate::sync::lock_or_recover;
use crate::{ProviderId, ProviderRegistry};

/// Reason recorded on a provider tripped by repeated network failures.
pub const NETWORK_DISABLE_REASON: &str = "Network/Firewall restrictions detected";

/// Auto-disable threshold and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityPolicy {
    pub failure_threshold: u32,
    pub disable_for: Duration,
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            disable_for: Duration::from_secs(30 * 60),
        }
    }
}

/// Per-provider network failure streaks and the auto-disable state machine.
///
/// `Enabled -> (threshold consecutive network failures) -> Disabled(window)
/// -> (window elapses) -> Enabled`. Streaks live in memory only; the disable
/// window is written to the provider record so it survives a restart.
#[derive(Debug)]
pub struct AvailabilityTracker {
    policy: AvailabilityPolicy,
    clock: Arc<dyn Clock>,
    failures: Mutex<HashMap<ProviderId, u32>>,
}

impl AvailabilityTracker {
    pub fn new(policy: AvailabilityPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> AvailabilityPolicy {
        self.policy
    }

    /// Whether `provider` may be selected, re-enabling it when its disable
    /// window has run out.
    pub fn is_available(&self, provider: ProviderId, registry: &ProviderRegistry) -> bool {
        let now = self.clock.now().unix_millis();
        registry
            .update(provider, |config| match config.disabled_until {
                Some(until) if now < until => {
                    let minutes = ((until - now) as f64 / 60_000.0).round();
                    info!("{provider} auto-disabled for another {minutes} minutes");
                    false
                }
                Some(_) => {
                    config.enabled = true;
                    config.disabled_until = None;
                    config.disabled_reason = None;
                    info!("{provider} disable window elapsed, re-enabling");
                    true
                }
                None => config.enabled,
            })
            .unwrap_or(false)
    }

    /// Counts a failure toward the streak if it is network-class. Returns
    /// `true` when this failure tripped the provider.
    pub fn record_failure(&self, provider: ProviderId, error: &FetchError, registry: &ProviderRegistry) -> bool {
        if !error.is_network() {
            debug!("{provider} application failure does not affect availability: {error}");
            return false;
        }

        let streak = {
            let mut failures = lock_or_recover(&self.failures, "availability");
            let streak = failures.entry(provider).or_insert(0);
            *streak = streak.saturating_add(1);
            let current = *streak;
            if current >= self.policy.failure_threshold {
                *streak = 0;
            }
            current
        };

        if streak < self.policy.failure_threshold {
            warn!(
                "{provider} network failure {streak}/{}: {error}",
                self.policy.failure_threshold
            );
            return false;
        }

        let until = self.clock.now().after(self.policy.disable_for);
        registry.update(provider, |config| {
            config.enabled = false;
            config.disabled_until = Some(until.unix_millis());
            config.disabled_reason = Some(NETWORK_DISABLE_REASON.to_owned());
        });
        warn!("{provider} auto-disabled until {until} after {streak} consecutive network failures");
        true
    }

    pub fn record_success(&self, provider: ProviderId) {
        lock_or_recover(&self.failures, "availability").remove(&provider);
    }

    pub fn failure_count(&self, provider: ProviderId) -> u32 {
        lock_or_recover(&self.failures, "availability")
            .get(&provider)
            .copied()
            .unwrap_or(0)
    }
}
