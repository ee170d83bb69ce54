//! Synthetic quotes for when no provider can answer.

use crate::{Quote, Symbol, UtcDateTime};

pub const OFFLINE_NOTE: &str =
    "Sample data - External APIs currently unavailable due to network restrictions";

/// Plausible recent values for well-known tickers: price, change, change %.
const SAMPLE_QUOTES: [(&str, f64, f64, f64); 10] = [
    ("AAPL", 195.89, 2.45, 1.27),
    ("MSFT", 415.26, -3.22, -0.77),
    ("GOOGL", 175.43, 1.85, 1.07),
    ("TSLA", 248.50, -5.30, -2.09),
    ("AMZN", 186.37, 4.12, 2.26),
    ("NVDA", 915.75, 12.43, 1.38),
    ("META", 495.82, -7.18, -1.43),
    ("NFLX", 642.11, 8.95, 1.41),
    ("CRM", 284.33, 3.67, 1.31),
    ("UBER", 72.18, -1.22, -1.66),
];

/// Offline sample for `symbol`. Unknown symbols get a random plausible quote.
pub fn offline_sample_quote(symbol: &Symbol, as_of: UtcDateTime) -> Quote {
    let (price, change, change_percent) = SAMPLE_QUOTES
        .iter()
        .find(|(ticker, ..)| *ticker == symbol.as_str())
        .map(|(_, price, change, pct)| (*price, *change, *pct))
        .unwrap_or_else(random_sample);

    Quote::offline_sample(symbol.clone(), price, change, change_percent, as_of, OFFLINE_NOTE)
}

fn random_sample() -> (f64, f64, f64) {
    let price = 50.0 + fastrand::f64() * 500.0;
    let change = (fastrand::f64() - 0.5) * 20.0;
    let change_percent = (fastrand::f64() - 0.5) * 4.0;
    (round_cents(price), round_cents(change), round_cents(change_percent))
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
