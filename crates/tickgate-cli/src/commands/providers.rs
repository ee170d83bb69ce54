use serde::Serialize;
use tickgate_core::{ProviderId, QuoteGateway};

use crate::cli::{ProvidersArgs, ProvidersCommand};
use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderRow {
    provider: ProviderId,
    priority: u32,
    enabled: bool,
    daily_limit: u32,
    minute_limit: u32,
    has_credential: bool,
    base_url: String,
}

pub fn run(args: &ProvidersArgs, gateway: &QuoteGateway) -> Result<CommandResult, CliError> {
    match &args.command {
        None | Some(ProvidersCommand::List) => Ok(list(gateway)),
        Some(ProvidersCommand::Enable { name }) => switch(gateway, name, true),
        Some(ProvidersCommand::Disable { name }) => switch(gateway, name, false),
    }
}

fn list(gateway: &QuoteGateway) -> CommandResult {
    let rows: Vec<ProviderRow> = gateway
        .registry()
        .snapshot()
        .into_iter()
        .map(|(provider, config)| ProviderRow {
            provider,
            priority: config.priority,
            enabled: config.enabled,
            daily_limit: config.daily_limit,
            minute_limit: config.minute_limit,
            has_credential: config.has_credential(),
            base_url: config.base_url,
        })
        .collect();

    let mut table = Table::new(["provider", "priority", "enabled", "daily", "per min", "key"]);
    for row in &rows {
        table.push([
            row.provider.to_string(),
            row.priority.to_string(),
            row.enabled.to_string(),
            row.daily_limit.to_string(),
            row.minute_limit.to_string(),
            if row.has_credential { "yes" } else { "no" }.to_owned(),
        ]);
    }

    let missing = rows.iter().filter(|row| !row.has_credential).count();
    let result = CommandResult::ok(serde_json::json!({ "providers": &rows }), table);
    if missing > 0 {
        result.with_warning(format!(
            "{missing} providers have no API key; set TICKGATE_<PROVIDER>_API_KEY"
        ))
    } else {
        result
    }
}

fn switch(gateway: &QuoteGateway, name: &str, enabled: bool) -> Result<CommandResult, CliError> {
    let provider: ProviderId = name.parse()?;
    if !gateway.set_provider_enabled(provider, enabled) {
        return Err(CliError::Command(format!("{provider} is not configured")));
    }

    let mut table = Table::new(["provider", "enabled"]);
    table.push([provider.to_string(), enabled.to_string()]);
    Ok(CommandResult::ok(
        serde_json::json!({ "provider": provider, "enabled": enabled }),
        table,
    ))
}
