//! # Tickgate Core
//!
//! Quote gateway for multiple upstream market-data providers.
//!
//! ## Overview
//!
//! [`QuoteGateway::get_quote`] always answers. It tries, in order:
//!
//! - the response cache (in memory, backed by the durable store)
//! - the best eligible provider by priority, subject to its daily and
//!   per-minute budget and its availability window
//! - an offline sample quote, clearly labelled as synthetic
//!
//! Provider records, quota counters and cached quotes survive restarts
//! through a [`DurableStore`] (JSON files, DuckDB or memory).
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters and response normalization |
//! | [`availability`] | Consecutive network failure tracking and auto-disable |
//! | [`cache`] | Two-tier quote cache with TTL |
//! | [`clock`] | Injectable wall clock |
//! | [`config`] | Provider records, gateway and store settings |
//! | [`data_source`] | Adapter trait and fetch error taxonomy |
//! | [`domain`] | Symbol, Quote and timestamp types |
//! | [`error`] | Validation and store errors |
//! | [`gateway`] | The gateway and its builder |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`offline`] | Offline sample quotes |
//! | [`rate_limit`] | Per-provider quota ledger |
//! | [`registry`] | Persisted provider records |
//! | [`selector`] | Provider ranking |
//! | [`source`] | Provider identifiers |
//! | [`status`] | Administrative status projection |
//! | [`store`] | Durable store backends |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickgate_core::{open_store, QuoteGateway, StoreSettings, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = open_store(&StoreSettings::from_env())?;
//!     let gateway = Arc::new(QuoteGateway::builder(store).build());
//!
//!     let quote = gateway.get_quote(&Symbol::parse("AAPL")?).await;
//!     println!("{} {:.2} via {}", quote.symbol, quote.price, quote.source);
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! - API keys never appear in logs; request URLs are redacted
//! - Keys taken from the environment are not written to the store

pub mod adapters;
pub mod availability;
pub mod cache;
pub mod clock;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod offline;
pub mod rate_limit;
pub mod registry;
pub mod selector;
pub mod source;
pub mod status;
pub mod store;
mod sync;

pub use adapters::{
    AlphaVantageAdapter, FinnhubAdapter, IexCloudAdapter, MarketstackAdapter, PolygonAdapter,
    TwelveDataAdapter, WorldTradingDataAdapter,
};

pub use availability::{AvailabilityPolicy, AvailabilityTracker};

pub use cache::ResponseCache;

pub use clock::{Clock, ManualClock, SystemClock};

pub use config::{GatewaySettings, ProviderConfig, StoreSettings};

pub use data_source::{FetchContext, FetchError, FetchErrorKind, QuoteAdapter};

pub use domain::{Quote, QuoteSource, Symbol, UtcDateTime};

pub use error::{StoreError, ValidationError};

pub use gateway::{QuoteGateway, QuoteGatewayBuilder};

pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};

pub use offline::offline_sample_quote;

pub use rate_limit::{RateLimitLedger, RateLimitState};

pub use registry::ProviderRegistry;

pub use selector::ProviderSelector;

pub use source::ProviderId;

pub use status::{FirewallAssessment, GatewayStatus, ProviderStatus};

pub use store::{open_store, Collection, DuckDbStore, DurableStore, FileStore, MemoryStore, StoreBackend};
