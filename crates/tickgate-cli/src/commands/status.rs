use tickgate_core::{GatewayStatus, QuoteGateway};

use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

pub async fn run(gateway: &QuoteGateway) -> Result<CommandResult, CliError> {
    let status = gateway.status().await;
    let table = status_table(&status);
    let warning = status
        .firewall
        .suspected
        .then(|| status.firewall.message.clone());

    let mut result = CommandResult::ok(serde_json::to_value(&status)?, table);
    if let Some(warning) = warning {
        result = result.with_warning(warning);
    }
    Ok(result)
}

fn status_table(status: &GatewayStatus) -> Table {
    let mut table = Table::new(["provider", "priority", "used", "daily", "key", "status"]);
    for provider in &status.providers {
        table.push([
            provider.provider.to_string(),
            provider.priority.to_string(),
            provider.requests.to_string(),
            provider.daily_limit.to_string(),
            if provider.has_credential { "yes" } else { "no" }.to_owned(),
            provider.status.clone(),
        ]);
    }
    table.with_footer(format!(
        "store: {}  cache entries: {}  {}",
        status.storage, status.cache_entries, status.firewall.message
    ))
}
