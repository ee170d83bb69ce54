use std::sync::Arc;

use serde::Deserialize;

use super::{de_opt_f64, encode, get_body, parse_payload, require_api_key, require_field};
use crate::data_source::{FetchContext, FetchError, FetchFuture, QuoteAdapter};
use crate::http_client::HttpClient;
use crate::{ProviderConfig, ProviderId, Quote, Symbol, UtcDateTime};

const PROVIDER: ProviderId = ProviderId::Iexcloud;

/// IEX Cloud `/stock/{symbol}/quote` endpoint.
#[derive(Clone)]
pub struct IexCloudAdapter {
    http_client: Arc<dyn HttpClient>,
}

impl IexCloudAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl QuoteAdapter for IexCloudAdapter {
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
                "{}/stock/{}/quote?token={}",
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
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    #[serde(default, deserialize_with = "de_opt_f64")]
    latest_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    change: Option<f64>,
    /// Fraction, not percent.
    #[serde(default, deserialize_with = "de_opt_f64")]
    change_percent: Option<f64>,
}

fn normalize(symbol: &Symbol, body: &str, as_of: UtcDateTime) -> Result<Quote, FetchError> {
    let response: QuoteResponse = parse_payload(PROVIDER, body)?;

    Quote::from_provider(
        symbol.clone(),
        PROVIDER,
        require_field(PROVIDER, "latestPrice", response.latest_price)?,
        response.change.unwrap_or(0.0),
        response.change_percent.unwrap_or(0.0) * 100.0,
        as_of,
    )
    .map_err(|err| FetchError::from_validation(PROVIDER, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::FetchErrorKind;

    fn amzn() -> Symbol {
        Symbol::parse("AMZN").expect("valid symbol")
    }

    #[test]
    fn change_percent_fraction_is_scaled_to_percent() {
        let body = r#"{"symbol":"AMZN","latestPrice":186.37,"change":4.12,"changePercent":0.0226}"#;
        let quote = normalize(&amzn(), body, UtcDateTime::now()).expect("normalizes");

        assert_eq!(quote.price, 186.37);
        assert!((quote.change_percent - 2.26).abs() < 1e-9);
    }

    #[test]
    fn missing_latest_price_is_malformed() {
        let err = normalize(&amzn(), r#"{"change":1}"#, UtcDateTime::now()).expect_err("must fail");
        assert_eq!(err.kind(), FetchErrorKind::Malformed);
    }
}
