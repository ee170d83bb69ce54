use serde_json::json;
use tickgate_core::QuoteGateway;

use crate::cli::{CacheArgs, CacheCommand};
use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

pub async fn run(args: &CacheArgs, gateway: &QuoteGateway) -> Result<CommandResult, CliError> {
    match args.command {
        CacheCommand::Clear => {
            gateway.clear_cache().await?;
            let mut table = Table::new(["action", "result"]);
            table.push(["clear", "ok"]);
            Ok(CommandResult::ok(json!({ "cleared": true }), table))
        }
        CacheCommand::Sweep => {
            let removed = gateway.sweep_cache().await;
            let mut table = Table::new(["action", "removed"]);
            table.push([String::from("sweep"), removed.to_string()]);
            Ok(CommandResult::ok(json!({ "removed": removed }), table))
        }
    }
}
