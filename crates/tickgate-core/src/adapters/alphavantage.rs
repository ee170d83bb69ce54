use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{de_f64, encode, get_body, parse_payload, require_api_key};
use crate::data_source::{FetchContext, FetchError, FetchFuture, QuoteAdapter};
use crate::http_client::HttpClient;
use crate::{ProviderConfig, ProviderId, Quote, Symbol, UtcDateTime};

const PROVIDER: ProviderId = ProviderId::Alphavantage;

/// Alpha Vantage `GLOBAL_QUOTE` endpoint.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    http_client: Arc<dyn HttpClient>,
}

impl AlphaVantageAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl QuoteAdapter for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
        config: &'a ProviderConfig,
        context: FetchContext,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let api_key = require_api_key(PROVIDER, config)?;
            let url = format!(
                "{}?function=GLOBAL_QUOTE&symbol={}&apikey={}",
                config.base_url,
                encode(symbol.as_str()),
                encode(api_key)
            );
            let body = get_body(self.http_client.as_ref(), PROVIDER, url, context.timeout).await?;
            normalize(symbol, &body, context.as_of)
        })
    }
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    quote: Option<Value>,
    #[serde(rename = "Error Message", default)]
    error_message: Option<String>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price", deserialize_with = "de_f64")]
    price: f64,
    #[serde(rename = "09. change", deserialize_with = "de_f64")]
    change: f64,
    #[serde(rename = "10. change percent", deserialize_with = "de_f64")]
    change_percent: f64,
}

fn normalize(symbol: &Symbol, body: &str, as_of: UtcDateTime) -> Result<Quote, FetchError> {
    let response: GlobalQuoteResponse = parse_payload(PROVIDER, body)?;

    if let Some(message) = response.error_message {
        return Err(FetchError::provider(PROVIDER, message));
    }
    // Throttle notices arrive as 200s with one of these two keys.
    if let Some(message) = response.note.or(response.information) {
        return Err(FetchError::quota_exhausted(PROVIDER, message));
    }

    let raw = match response.quote {
        Some(Value::Object(fields)) if !fields.is_empty() => Value::Object(fields),
        _ => {
            return Err(FetchError::provider(
                PROVIDER,
                format!("no quote returned for {symbol}"),
            ))
        }
    };
    let quote: GlobalQuote = serde_json::from_value(raw)
        .map_err(|err| FetchError::malformed(PROVIDER, format!("unexpected Global Quote: {err}")))?;

    Quote::from_provider(
        symbol.clone(),
        PROVIDER,
        quote.price,
        quote.change,
        quote.change_percent,
        as_of,
    )
    .map_err(|err| FetchError::from_validation(PROVIDER, err))
}
