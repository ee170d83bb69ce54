//! # Provider Adapters
//!
//! One [`QuoteAdapter`](crate::QuoteAdapter) per upstream provider. Each
//! adapter builds its request URL, calls the shared [`HttpClient`] and maps
//! the provider's payload into a canonical [`Quote`](crate::Quote).
//!
//! | Provider | Adapter | Credential parameter |
//! |----------|---------|----------------------|
//! | alphavantage | [`AlphaVantageAdapter`] | `apikey` |
//! | twelvedata | [`TwelveDataAdapter`] | `apikey` |
//! | finnhub | [`FinnhubAdapter`] | `token` |
//! | iexcloud | [`IexCloudAdapter`] | `token` |
//! | polygon | [`PolygonAdapter`] | `apiKey` |
//! | worldtradingdata | [`WorldTradingDataAdapter`] | `api_token` |
//! | marketstack | [`MarketstackAdapter`] | `access_key` |
//!
//! Numeric fields are accepted as JSON numbers or numeric strings; a trailing
//! `%` is ignored.

mod alphavantage;
mod finnhub;
mod iexcloud;
mod marketstack;
mod polygon;
mod twelvedata;
mod worldtradingdata;

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer};

use crate::data_source::{FetchError, QuoteAdapter};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{ProviderConfig, ProviderId};

pub use alphavantage::AlphaVantageAdapter;
pub use finnhub::FinnhubAdapter;
pub use iexcloud::IexCloudAdapter;
pub use marketstack::MarketstackAdapter;
pub use polygon::PolygonAdapter;
pub use twelvedata::TwelveDataAdapter;
pub use worldtradingdata::WorldTradingDataAdapter;

/// Adapters for every known provider, sharing one transport.
pub fn default_adapters(http_client: Arc<dyn HttpClient>) -> Vec<Arc<dyn QuoteAdapter>> {
    ProviderId::ALL
        .into_iter()
        .map(|provider| adapter_for(provider, Arc::clone(&http_client)))
        .collect()
}

pub fn adapter_for(provider: ProviderId, http_client: Arc<dyn HttpClient>) -> Arc<dyn QuoteAdapter> {
    match provider {
        ProviderId::Alphavantage => Arc::new(AlphaVantageAdapter::new(http_client)),
        ProviderId::Twelvedata => Arc::new(TwelveDataAdapter::new(http_client)),
        ProviderId::Finnhub => Arc::new(FinnhubAdapter::new(http_client)),
        ProviderId::Iexcloud => Arc::new(IexCloudAdapter::new(http_client)),
        ProviderId::Polygon => Arc::new(PolygonAdapter::new(http_client)),
        ProviderId::Worldtradingdata => Arc::new(WorldTradingDataAdapter::new(http_client)),
        ProviderId::Marketstack => Arc::new(MarketstackAdapter::new(http_client)),
    }
}

pub(crate) fn require_api_key(provider: ProviderId, config: &ProviderConfig) -> Result<&str, FetchError> {
    config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| FetchError::missing_credential(provider))
}

pub(crate) fn encode(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// Issues a GET and returns the body of a 2xx response.
pub(crate) async fn get_body(
    http_client: &dyn HttpClient,
    provider: ProviderId,
    url: String,
    timeout: Duration,
) -> Result<String, FetchError> {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let request = HttpRequest::get(url).with_timeout_ms(timeout_ms);
    debug!("{provider} GET {}", request.redacted_url());

    let response = http_client
        .execute(request)
        .await
        .map_err(|err| FetchError::from_http(provider, err))?;

    if !response.is_success() {
        return Err(FetchError::http_status(provider, response.status, &response.body));
    }
    Ok(response.body)
}

pub(crate) fn parse_payload<T: DeserializeOwned>(provider: ProviderId, body: &str) -> Result<T, FetchError> {
    serde_json::from_str(body)
        .map_err(|err| FetchError::malformed(provider, format!("unexpected payload: {err}")))
}

pub(crate) fn require_field(provider: ProviderId, field: &str, value: Option<f64>) -> Result<f64, FetchError> {
    value.ok_or_else(|| FetchError::malformed(provider, format!("missing field '{field}'")))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn parse_numeric(text: &str) -> Option<f64> {
    text.trim().trim_end_matches('%').trim().parse::<f64>().ok()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

/// Accepts `1.5` and `"1.5"` (and `"1.5%"`).
pub(crate) fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawNumber::deserialize(deserializer)? {
        RawNumber::Number(value) => Ok(value),
        RawNumber::Text(text) => {
            parse_numeric(&text).ok_or_else(|| D::Error::custom(format!("not a number: '{text}'")))
        }
    }
}

/// Like [`de_f64`], with `null` and blank strings mapping to `None`.
pub(crate) fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawNumber>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawNumber::Number(value)) => Ok(Some(value)),
        Some(RawNumber::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawNumber::Text(text)) => parse_numeric(&text)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("not a number: '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ScriptedHttpClient;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "de_f64")]
        value: f64,
        #[serde(default, deserialize_with = "de_opt_f64")]
        maybe: Option<f64>,
    }

    #[test]
    fn lenient_numbers_accept_strings_and_percentages() {
        let parsed: Sample = serde_json::from_str(r#"{"value":"1.2700%","maybe":null}"#).expect("parses");
        assert_eq!(parsed.value, 1.27);
        assert_eq!(parsed.maybe, None);

        let parsed: Sample = serde_json::from_str(r#"{"value":3,"maybe":"4.5"}"#).expect("parses");
        assert_eq!(parsed.value, 3.0);
        assert_eq!(parsed.maybe, Some(4.5));

        assert!(serde_json::from_str::<Sample>(r#"{"value":"n/a"}"#).is_err());
    }

    #[test]
    fn default_adapters_cover_every_provider_once() {
        let adapters = default_adapters(Arc::new(ScriptedHttpClient::new()));
        let ids: Vec<ProviderId> = adapters.iter().map(|adapter| adapter.id()).collect();
        assert_eq!(ids, ProviderId::ALL.to_vec());
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = ProviderConfig::default_for(ProviderId::Finnhub).with_api_key("  ");
        let err = require_api_key(ProviderId::Finnhub, &config).expect_err("must fail");
        assert_eq!(err.code(), "fetch.missing_credential");
    }
}
