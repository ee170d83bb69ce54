use std::sync::Arc;

use serde::Deserialize;

use super::{de_opt_f64, encode, get_body, parse_payload, require_api_key, require_field};
use crate::data_source::{FetchContext, FetchError, FetchFuture, QuoteAdapter};
use crate::http_client::HttpClient;
use crate::{ProviderConfig, ProviderId, Quote, Symbol, UtcDateTime};

const PROVIDER: ProviderId = ProviderId::Polygon;

pub const LAST_TRADE_NOTE: &str = "Last trade price only - change data not available";

/// Polygon `/last/trade/{symbol}` endpoint. Carries no change data.
#[derive(Clone)]
pub struct PolygonAdapter {
    http_client: Arc<dyn HttpClient>,
}

impl PolygonAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl QuoteAdapter for PolygonAdapter {
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
                "{}/last/trade/{}?apiKey={}",
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
struct LastTradeResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Option<LastTrade>,
}

#[derive(Debug, Deserialize)]
struct LastTrade {
    #[serde(default, deserialize_with = "de_opt_f64")]
    p: Option<f64>,
}

fn normalize(symbol: &Symbol, body: &str, as_of: UtcDateTime) -> Result<Quote, FetchError> {
    let response: LastTradeResponse = parse_payload(PROVIDER, body)?;

    if response.status.as_deref() == Some("ERROR") {
        let message = response
            .error
            .unwrap_or_else(|| String::from("unspecified error"));
        return Err(FetchError::provider(PROVIDER, message));
    }

    let price = require_field(PROVIDER, "results.p", response.results.and_then(|trade| trade.p))?;
    Quote::from_provider(symbol.clone(), PROVIDER, price, 0.0, 0.0, as_of)
        .map(|quote| quote.with_note(LAST_TRADE_NOTE))
        .map_err(|err| FetchError::from_validation(PROVIDER, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::FetchErrorKind;

    fn nvda() -> Symbol {
        Symbol::parse("NVDA").expect("valid symbol")
    }

    #[test]
    fn last_trade_price_comes_with_a_note() {
        let body = r#"{"request_id":"r1","status":"OK","results":{"T":"NVDA","p":915.75,"s":100}}"#;
        let quote = normalize(&nvda(), body, UtcDateTime::now()).expect("normalizes");

        assert_eq!(quote.price, 915.75);
        assert_eq!(quote.change, 0.0);
        assert_eq!(quote.note.as_deref(), Some(LAST_TRADE_NOTE));
    }

    #[test]
    fn error_status_is_a_provider_error() {
        let body = r#"{"status":"ERROR","error":"You've exceeded the maximum requests per minute"}"#;
        let err = normalize(&nvda(), body, UtcDateTime::now()).expect_err("must fail");
        assert_eq!(err.kind(), FetchErrorKind::Provider);
    }
}
