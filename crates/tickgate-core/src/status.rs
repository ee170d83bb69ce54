use serde::Serialize;

use crate::availability::NETWORK_DISABLE_REASON;
use crate::store::StoreBackend;
use crate::{ProviderConfig, ProviderId, UtcDateTime};

/// Blocked providers needed before a restricted network is suspected.
pub const FIREWALL_THRESHOLD: usize = 3;

/// Administrative view of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub enabled: bool,
    pub available: bool,
    pub priority: u32,
    pub requests: u32,
    pub daily_limit: u32,
    pub minute_limit: u32,
    pub has_capacity: bool,
    pub has_credential: bool,
    pub rate_limited: bool,
    pub reset_time: Option<UtcDateTime>,
    pub auto_disabled: bool,
    pub disabled_until: Option<UtcDateTime>,
    pub disabled_reason: Option<String>,
    pub failure_count: u32,
    pub status: String,
}

impl ProviderStatus {
    /// Read-only projection; unlike the availability check it never
    /// re-enables a provider.
    pub fn from_config(
        provider: ProviderId,
        config: &ProviderConfig,
        requests: u32,
        failure_count: u32,
        now: UtcDateTime,
    ) -> Self {
        let rate_limited = config.is_rate_limited_at(now);
        let auto_disabled = config
            .disabled_until
            .is_some_and(|until| now.unix_millis() < until);
        let available = match config.disabled_until {
            Some(_) => !auto_disabled,
            None => config.enabled,
        };

        let status = if rate_limited {
            String::from("Rate Limited")
        } else if available {
            String::from("Available")
        } else {
            config
                .disabled_reason
                .clone()
                .unwrap_or_else(|| String::from("Disabled"))
        };

        Self {
            provider,
            enabled: config.enabled,
            available,
            priority: config.priority,
            requests,
            daily_limit: config.daily_limit,
            minute_limit: config.minute_limit,
            has_capacity: requests < config.daily_limit,
            has_credential: config.has_credential(),
            rate_limited,
            reset_time: config.reset_time_utc(),
            auto_disabled,
            disabled_until: config.disabled_until_utc().filter(|_| auto_disabled),
            disabled_reason: config.disabled_reason.clone(),
            failure_count,
            status,
        }
    }

    fn blocked_by_network(&self) -> bool {
        self.auto_disabled && self.disabled_reason.as_deref() == Some(NETWORK_DISABLE_REASON)
    }
}

/// Whether the host looks cut off from the providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallAssessment {
    pub blocked_providers: usize,
    pub suspected: bool,
    pub message: String,
}

impl FirewallAssessment {
    pub fn from_providers(providers: &[ProviderStatus]) -> Self {
        let blocked_providers = providers
            .iter()
            .filter(|status| status.blocked_by_network())
            .count();
        let suspected = blocked_providers >= FIREWALL_THRESHOLD;
        let message = if suspected {
            format!("{blocked_providers} providers blocked by network restrictions; serving sample data")
        } else {
            String::from("External APIs reachable")
        };

        Self {
            blocked_providers,
            suspected,
            message,
        }
    }
}

/// Snapshot returned by [`crate::QuoteGateway::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub generated_at: UtcDateTime,
    pub storage: StoreBackend,
    pub cache_entries: usize,
    pub providers: Vec<ProviderStatus>,
    pub firewall: FirewallAssessment,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn now() -> UtcDateTime {
        UtcDateTime::parse("2024-06-01T12:00:00Z").expect("valid timestamp")
    }

    fn blocked(provider: ProviderId) -> ProviderStatus {
        let mut config = ProviderConfig::default_for(provider);
        config.enabled = false;
        config.disabled_until = Some(now().after(Duration::from_secs(600)).unix_millis());
        config.disabled_reason = Some(NETWORK_DISABLE_REASON.to_owned());
        ProviderStatus::from_config(provider, &config, 0, 0, now())
    }

    #[test]
    fn labels_follow_rate_limit_then_availability() {
        let mut config = ProviderConfig::default_for(ProviderId::Alphavantage);
        config.reset_time = Some(now().after(Duration::from_secs(60)).unix_millis());
        let status = ProviderStatus::from_config(ProviderId::Alphavantage, &config, 25, 0, now());
        assert_eq!(status.status, "Rate Limited");
        assert!(!status.has_capacity);

        let status = blocked(ProviderId::Finnhub);
        assert!(!status.available);
        assert_eq!(status.status, NETWORK_DISABLE_REASON);

        let mut config = ProviderConfig::default_for(ProviderId::Polygon);
        config.enabled = false;
        let status = ProviderStatus::from_config(ProviderId::Polygon, &config, 0, 0, now());
        assert_eq!(status.status, "Disabled");
    }

    #[test]
    fn three_blocked_providers_suggest_a_firewall() {
        let mut providers = vec![blocked(ProviderId::Finnhub), blocked(ProviderId::Polygon)];
        assert!(!FirewallAssessment::from_providers(&providers).suspected);

        providers.push(blocked(ProviderId::Marketstack));
        let assessment = FirewallAssessment::from_providers(&providers);
        assert!(assessment.suspected);
        assert_eq!(assessment.blocked_providers, 3);
    }
}
