use std::sync::Arc;

use serde::Deserialize;

use super::{de_opt_f64, encode, get_body, parse_payload, require_api_key, require_field, round2};
use crate::data_source::{FetchContext, FetchError, FetchFuture, QuoteAdapter};
use crate::http_client::HttpClient;
use crate::{ProviderConfig, ProviderId, Quote, Symbol, UtcDateTime};

const PROVIDER: ProviderId = ProviderId::Marketstack;

/// Error codes marketstack uses for spent quotas.
const QUOTA_CODES: [&str; 2] = ["usage_limit_reached", "rate_limit_reached"];

/// Marketstack `/eod/latest` endpoint. Change is derived from the day's open.
#[derive(Clone)]
pub struct MarketstackAdapter {
    http_client: Arc<dyn HttpClient>,
}

impl MarketstackAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl QuoteAdapter for MarketstackAdapter {
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
                "{}/eod/latest?access_key={}&symbols={}",
                config.base_url,
                encode(api_key),
                encode(symbol.as_str())
            );
            let body = get_body(self.http_client.as_ref(), PROVIDER, url, context.timeout).await?;
            normalize(symbol, &body, context.as_of)
        })
    }
}

#[derive(Debug, Deserialize)]
struct EodResponse {
    #[serde(default)]
    data: Vec<EodRow>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct EodRow {
    #[serde(default, deserialize_with = "de_opt_f64")]
    open: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    close: Option<f64>,
}

fn normalize(symbol: &Symbol, body: &str, as_of: UtcDateTime) -> Result<Quote, FetchError> {
    let response: EodResponse = parse_payload(PROVIDER, body)?;

    if let Some(error) = response.error {
        let message = format!("{}: {}", error.code, error.message);
        return Err(if QUOTA_CODES.contains(&error.code.as_str()) {
            FetchError::quota_exhausted(PROVIDER, message)
        } else {
            FetchError::provider(PROVIDER, message)
        });
    }

    let Some(row) = response.data.into_iter().next() else {
        return Err(FetchError::provider(PROVIDER, format!("no data returned for {symbol}")));
    };
    let close = require_field(PROVIDER, "close", row.close)?;
    let open = require_field(PROVIDER, "open", row.open)?;

    let change = close - open;
    let change_percent = if open == 0.0 { 0.0 } else { change / open * 100.0 };

    Quote::from_provider(
        symbol.clone(),
        PROVIDER,
        close,
        round2(change),
        round2(change_percent),
        as_of,
    )
    .map_err(|err| FetchError::from_validation(PROVIDER, err))
}
