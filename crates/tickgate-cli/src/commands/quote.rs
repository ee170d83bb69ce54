use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tickgate_core::{Quote, QuoteGateway, Symbol};

use crate::cli::QuoteArgs;
use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct QuoteResponseData {
    quotes: Vec<Quote>,
}

pub async fn run(args: &QuoteArgs, gateway: &Arc<QuoteGateway>) -> Result<CommandResult, CliError> {
    let symbols = args
        .symbols
        .iter()
        .map(|raw| Symbol::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let quotes = match (args.deadline_ms, symbols.as_slice()) {
        (Some(deadline_ms), [symbol]) => vec![
            gateway
                .get_quote_with_deadline(symbol, Duration::from_millis(deadline_ms))
                .await,
        ],
        (Some(_), _) => {
            return Err(CliError::Command(String::from(
                "--deadline-ms applies to a single symbol",
            )))
        }
        (None, _) => gateway.get_quotes(&symbols).await,
    };

    let table = quote_table(&quotes);
    let synthetic: Vec<&str> = quotes
        .iter()
        .filter(|quote| quote.is_synthetic())
        .map(|quote| quote.symbol.as_str())
        .collect();
    let warning = (!synthetic.is_empty())
        .then(|| format!("offline sample data served for {}", synthetic.join(",")));

    let mut result = CommandResult::ok(serde_json::to_value(QuoteResponseData { quotes })?, table);
    if let Some(warning) = warning {
        result = result.with_warning(warning);
    }
    Ok(result)
}

fn quote_table(quotes: &[Quote]) -> Table {
    let mut table = Table::new(["symbol", "price", "change", "change %", "source", "timestamp"]);
    for quote in quotes {
        table.push([
            quote.symbol.to_string(),
            format!("{:.2}", quote.price),
            format!("{:+.2}", quote.change),
            format!("{:+.2}", quote.change_percent),
            quote.source.to_string(),
            quote.timestamp.to_string(),
        ]);
    }
    table
}
