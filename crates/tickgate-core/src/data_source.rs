//! Quote adapter contract and fetch error taxonomy.
//!
//! Errors fall into two classes that the gateway treats differently:
//!
//! | Class | Kinds | Effect |
//! |-------|-------|--------|
//! | network | [`FetchErrorKind::Network`] | slot released, counts toward auto-disable |
//! | application | everything else except `Cancelled` | slot kept, provider skipped for this request |
//!
//! [`FetchErrorKind::QuotaExhausted`] is application-class and additionally
//! marks the provider ineligible until its reset time.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::http_client::HttpError;
use crate::{ProviderConfig, ProviderId, Quote, Symbol, UtcDateTime, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The provider could not be reached.
    Network,
    /// Non-2xx HTTP status.
    Http,
    /// The provider answered with an error payload.
    Provider,
    /// The payload did not match the provider's schema.
    Malformed,
    /// The provider said its quota is spent.
    QuotaExhausted,
    /// No credential is configured, so no call was made.
    MissingCredential,
    /// No adapter is registered for the provider.
    Unsupported,
    /// The local daily or per-minute budget was spent before the call.
    RateLimited,
    /// The caller gave up before the provider answered.
    Cancelled,
}

/// Structured fetch failure used by the gateway's fallback logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    provider: ProviderId,
    message: String,
    status: Option<u16>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, provider: ProviderId, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider,
            message: message.into(),
            status: None,
        }
    }

    pub fn network(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, provider, message)
    }

    pub fn http_status(provider: ProviderId, status: u16, body: &str) -> Self {
        let excerpt: String = body.chars().take(200).collect();
        Self {
            status: Some(status),
            ..Self::new(
                FetchErrorKind::Http,
                provider,
                format!("HTTP {status}: {excerpt}"),
            )
        }
    }

    pub fn provider(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Provider, provider, message)
    }

    pub fn malformed(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Malformed, provider, message)
    }

    pub fn quota_exhausted(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::QuotaExhausted, provider, message)
    }

    pub fn missing_credential(provider: ProviderId) -> Self {
        Self::new(
            FetchErrorKind::MissingCredential,
            provider,
            format!("no API key configured (set {})", provider.credential_env_var()),
        )
    }

    pub fn unsupported(provider: ProviderId) -> Self {
        Self::new(
            FetchErrorKind::Unsupported,
            provider,
            format!("no quote adapter registered for '{provider}'"),
        )
    }

    pub fn rate_limited(provider: ProviderId) -> Self {
        Self::new(
            FetchErrorKind::RateLimited,
            provider,
            "local request budget spent",
        )
    }

    pub fn cancelled(provider: ProviderId) -> Self {
        Self::new(FetchErrorKind::Cancelled, provider, "request cancelled by caller")
    }

    pub fn from_http(provider: ProviderId, err: HttpError) -> Self {
        let kind = if err.is_network() {
            FetchErrorKind::Network
        } else {
            FetchErrorKind::Provider
        };
        Self::new(kind, provider, err.to_string())
    }

    pub fn from_validation(provider: ProviderId, err: ValidationError) -> Self {
        Self::malformed(provider, err.to_string())
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub const fn provider_id(&self) -> ProviderId {
        self.provider
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn is_network(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Network)
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Cancelled)
    }

    /// Whether the provider's quota was touched by this attempt.
    ///
    /// Network failures, cancellations and calls that were never sent do not
    /// consume a slot.
    pub const fn consumed_quota(&self) -> bool {
        !matches!(
            self.kind,
            FetchErrorKind::Network
                | FetchErrorKind::Cancelled
                | FetchErrorKind::MissingCredential
                | FetchErrorKind::Unsupported
                | FetchErrorKind::RateLimited
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Network => "fetch.network",
            FetchErrorKind::Http => "fetch.http_status",
            FetchErrorKind::Provider => "fetch.provider_error",
            FetchErrorKind::Malformed => "fetch.malformed",
            FetchErrorKind::QuotaExhausted => "fetch.quota_exhausted",
            FetchErrorKind::MissingCredential => "fetch.missing_credential",
            FetchErrorKind::Unsupported => "fetch.unsupported",
            FetchErrorKind::RateLimited => "fetch.rate_limited",
            FetchErrorKind::Cancelled => "fetch.cancelled",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.provider, self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Per-call inputs the gateway hands to an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchContext {
    /// Timestamp for the normalized quote, read from the gateway's clock.
    pub as_of: UtcDateTime,
    /// Transport timeout for the provider request.
    pub timeout: Duration,
}

impl FetchContext {
    pub fn new(as_of: UtcDateTime, timeout: Duration) -> Self {
        Self { as_of, timeout }
    }
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Quote, FetchError>> + Send + 'a>>;

/// One upstream provider's quote endpoint.
///
/// An adapter owns its request format and its response mapping. It holds no
/// quota or health state; the gateway decides whether it may be called.
pub trait QuoteAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Fetches and normalizes one quote.
    ///
    /// # Errors
    ///
    /// Returns a network-class [`FetchError`] when the provider cannot be
    /// reached, and an application-class one for every other failure.
    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
        config: &'a ProviderConfig,
        context: FetchContext,
    ) -> FetchFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpErrorKind;

    #[test]
    fn http_transport_errors_keep_their_class() {
        let network = FetchError::from_http(ProviderId::Finnhub, HttpError::dns("getaddrinfo ENOTFOUND"));
        let body = FetchError::from_http(
            ProviderId::Finnhub,
            HttpError::new(HttpErrorKind::Body, "truncated"),
        );

        assert!(network.is_network());
        assert!(!network.consumed_quota());
        assert_eq!(body.kind(), FetchErrorKind::Provider);
        assert!(body.consumed_quota());
    }

    #[test]
    fn status_errors_carry_the_status_and_a_short_excerpt() {
        let body = "x".repeat(500);
        let err = FetchError::http_status(ProviderId::Polygon, 503, &body);

        assert_eq!(err.status(), Some(503));
        assert_eq!(err.code(), "fetch.http_status");
        assert!(err.message().len() < 220);
    }
}
