mod cache;
mod providers;
mod quote;
mod status;

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde_json::Value;
use tickgate_core::{open_store, GatewaySettings, QuoteGateway, StoreBackend, StoreSettings};

use crate::cli::{Cli, Command, StoreChoice};
use crate::error::CliError;
use crate::output::Table;

/// What a command hands to the renderer: the JSON payload, its tabular view
/// and any warnings for the operator.
pub struct CommandResult {
    pub data: Value,
    pub table: Table,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value, table: Table) -> Self {
        Self {
            data,
            table,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let gateway = Arc::new(build_gateway(cli)?);

    let result = match &cli.command {
        Command::Quote(args) => quote::run(args, &gateway).await?,
        Command::Status => status::run(&gateway).await?,
        Command::Cache(args) => cache::run(args, &gateway).await?,
        Command::Providers(args) => providers::run(args, &gateway)?,
    };

    gateway.flush();
    Ok(result)
}

fn build_gateway(cli: &Cli) -> Result<QuoteGateway, CliError> {
    let mut store_settings = StoreSettings::from_lookup(|name| match (name, &cli.home) {
        ("TICKGATE_HOME", Some(home)) => Some(home.display().to_string()),
        _ => std::env::var(name).ok(),
    });
    if let Some(choice) = cli.store {
        store_settings.backend = to_backend(choice);
    }
    debug!(
        "opening {} store in {}",
        store_settings.backend,
        store_settings.home.display()
    );
    let store = open_store(&store_settings)?;

    let settings = GatewaySettings {
        max_provider_attempts: cli.attempts.max(1),
        request_timeout: Duration::from_millis(cli.timeout_ms.max(1)),
        ..GatewaySettings::default()
    };

    Ok(QuoteGateway::builder(store).with_settings(settings).build())
}

const fn to_backend(choice: StoreChoice) -> StoreBackend {
    match choice {
        StoreChoice::File => StoreBackend::File,
        StoreChoice::Duckdb => StoreBackend::DuckDb,
        StoreChoice::Memory => StoreBackend::Memory,
    }
}
