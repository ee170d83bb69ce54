use std::sync::Arc;

use serde::Deserialize;

use super::{de_opt_f64, encode, get_body, parse_payload, require_api_key, require_field};
use crate::data_source::{FetchContext, FetchError, FetchFuture, QuoteAdapter};
use crate::http_client::HttpClient;
use crate::{ProviderConfig, ProviderId, Quote, Symbol, UtcDateTime};

const PROVIDER: ProviderId = ProviderId::Worldtradingdata;

/// World Trading Data `/stock` endpoint.
#[derive(Clone)]
pub struct WorldTradingDataAdapter {
    http_client: Arc<dyn HttpClient>,
}

impl WorldTradingDataAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl QuoteAdapter for WorldTradingDataAdapter {
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
                "{}/stock?symbol={}&api_token={}",
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
struct StockResponse {
    #[serde(default)]
    data: Vec<StockRow>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockRow {
    #[serde(default, deserialize_with = "de_opt_f64")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    day_change: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    change_pct: Option<f64>,
}

fn normalize(symbol: &Symbol, body: &str, as_of: UtcDateTime) -> Result<Quote, FetchError> {
    let response: StockResponse = parse_payload(PROVIDER, body)?;
    let Some(row) = response.data.into_iter().next() else {
        let message = response
            .message
            .unwrap_or_else(|| format!("no data returned for {symbol}"));
        return Err(FetchError::provider(PROVIDER, message));
    };

    Quote::from_provider(
        symbol.clone(),
        PROVIDER,
        require_field(PROVIDER, "price", row.price)?,
        row.day_change.unwrap_or(0.0),
        row.change_pct.unwrap_or(0.0),
        as_of,
    )
    .map_err(|err| FetchError::from_validation(PROVIDER, err))
}
