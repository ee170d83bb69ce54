use std::sync::Arc;

use serde::Deserialize;

use super::{de_opt_f64, encode, get_body, parse_payload, require_api_key, require_field};
use crate::data_source::{FetchContext, FetchError, FetchFuture, QuoteAdapter};
use crate::http_client::HttpClient;
use crate::{ProviderConfig, ProviderId, Quote, Symbol, UtcDateTime};

const PROVIDER: ProviderId = ProviderId::Twelvedata;

/// Twelve Data `/quote` endpoint.
#[derive(Clone)]
pub struct TwelveDataAdapter {
    http_client: Arc<dyn HttpClient>,
}

impl TwelveDataAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl QuoteAdapter for TwelveDataAdapter {
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
                "{}/quote?symbol={}&apikey={}",
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
struct QuoteResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    close: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    change: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    percent_change: Option<f64>,
}

fn normalize(symbol: &Symbol, body: &str, as_of: UtcDateTime) -> Result<Quote, FetchError> {
    let response: QuoteResponse = parse_payload(PROVIDER, body)?;

    if response.status.as_deref() == Some("error") {
        let message = response
            .message
            .unwrap_or_else(|| String::from("unspecified error"));
        return Err(match response.code {
            Some(429) => FetchError::quota_exhausted(PROVIDER, message),
            _ => FetchError::provider(PROVIDER, message),
        });
    }

    Quote::from_provider(
        symbol.clone(),
        PROVIDER,
        require_field(PROVIDER, "close", response.close)?,
        require_field(PROVIDER, "change", response.change)?,
        require_field(PROVIDER, "percent_change", response.percent_change)?,
        as_of,
    )
    .map_err(|err| FetchError::from_validation(PROVIDER, err))
}
