mod config;
mod dlq;
mod domain;
mod engine;
mod ingestion;
mod ledger;
mod matcher;
mod output_repository;
mod registry;
mod retry;
mod runtime;
mod saga;
mod service;
mod signal;

use std::io::IsTerminal;
use std::{env, fs::File, path::Path, sync::Arc};

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::dlq::LogDLQ;
use crate::engine::Engine;
use crate::ingestion::CsvReader;
use crate::ledger::MemoryLedger;
use crate::output_repository::CsvOutput;
use crate::registry::MemoryRegistry;
use crate::service::HoldService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let file_path = env::args()
        .nth(1)
        .ok_or("usage: hold_settlement <commands.csv>")?;
    let file = File::open(Path::new(&file_path))?;

    let config = EngineConfig::load()?;
    info!(
        hold_deadline_ms = config.hold_deadline_ms,
        ledger = config.ledger,
        code = config.code,
        "configuration loaded"
    );

    // Set up the components
    let ledger = Arc::new(MemoryLedger::new(config.ledger, config.code));
    let registry = Arc::new(MemoryRegistry::new());
    let service = HoldService::new(ledger, registry, config);
    let reconcile = service.config().reconcile_on_start;

    let mut engine = Engine::new(
        service,
        CsvReader::new(file),
        CsvOutput::stdout(),
        LogDLQ::default(),
    );

    if reconcile {
        engine.reconcile().await?;
    }
    engine.process().await?;
    engine.flush();

    Ok(())
}
