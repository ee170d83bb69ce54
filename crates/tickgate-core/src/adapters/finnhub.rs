use std::sync::Arc;

use serde::Deserialize;

use super::{de_opt_f64, encode, get_body, parse_payload, require_api_key, require_field};
use crate::data_source::{FetchContext, FetchError, FetchFuture, QuoteAdapter};
use crate::http_client::HttpClient;
use crate::{ProviderConfig, ProviderId, Quote, Symbol, UtcDateTime};

const PROVIDER: ProviderId = ProviderId::Finnhub;

/// Finnhub `/quote` endpoint.
#[derive(Clone)]
pub struct FinnhubAdapter {
    http_client: Arc<dyn HttpClient>,
}

impl FinnhubAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl QuoteAdapter for FinnhubAdapter {
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
                "{}/quote?symbol={}&token={}",
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
    #[serde(default, deserialize_with = "de_opt_f64")]
    c: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    d: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    dp: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

fn normalize(symbol: &Symbol, body: &str, as_of: UtcDateTime) -> Result<Quote, FetchError> {
    let response: QuoteResponse = parse_payload(PROVIDER, body)?;
    if let Some(message) = response.error {
        return Err(FetchError::provider(PROVIDER, message));
    }

    let price = require_field(PROVIDER, "c", response.c)?;
    // Unknown tickers come back as all zeros with null deltas.
    if price == 0.0 && response.d.is_none() {
        return Err(FetchError::provider(PROVIDER, format!("unknown symbol {symbol}")));
    }

    Quote::from_provider(
        symbol.clone(),
        PROVIDER,
        price,
        response.d.unwrap_or(0.0),
        response.dp.unwrap_or(0.0),
        as_of,
    )
    .map_err(|err| FetchError::from_validation(PROVIDER, err))
}
