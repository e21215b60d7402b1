//! # cardex-node
//!
//! Process wiring around the engine: configuration, logging, store,
//! background catalog load and the periodic match sweep. Request routing
//! and authentication live in front of this process and talk to
//! [`cardex_engine::Marketplace`].

mod cli;
mod config;
mod logging;

use std::{process::ExitCode, sync::Arc};

use cardex_catalog::{CatalogSource, JsonFileSource, StaticSource};
use cardex_engine::Marketplace;
use cardex_store::MemoryStore;
use cardex_types::{CardexError, Result, constants};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use crate::{
    cli::{Cli, Commands},
    config::NodeConfig,
    logging::LogFormat,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match NodeConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if cli.json_logs {
        config.logging.format = LogFormat::Json;
    }
    config.logging.init();

    let outcome = match cli.command() {
        Commands::Check => {
            info!(path = %cli.config.display(), "Configuration is valid");
            Ok(())
        }
        Commands::Audit => audit(&config).await,
        Commands::Run => run(config).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, code = %e.code(), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

fn open_market(config: &NodeConfig) -> Result<Marketplace<MemoryStore>> {
    let store = Arc::new(MemoryStore::from_config(&config.market)?);
    Marketplace::new(store, config.market.clone())
}

async fn audit(config: &NodeConfig) -> Result<()> {
    let market = open_market(config)?;
    let report = market.audit().await?;
    for d in &report.discrepancies {
        warn!(item = %d.item, ledger = d.ledger, census = d.census, "Supply mismatch");
    }
    if report.is_clean() {
        Ok(())
    } else {
        Err(CardexError::InvariantViolation {
            reason: format!("{} item(s) disagree with the ledger", report.discrepancies.len()),
        })
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    info!(
        engine = constants::ENGINE_NAME,
        version = constants::VERSION,
        "Node starting"
    );
    let market = open_market(&config)?;

    let source: Arc<dyn CatalogSource> = match &config.catalog.source_path {
        Some(path) => Arc::new(JsonFileSource::new(path.clone())),
        None => {
            warn!("No catalog source configured, relying on the cached snapshot");
            Arc::new(StaticSource::default())
        }
    };
    let loading = market.spawn_catalog_load(source);

    let sweep = config.sweep_period().map(|period| {
        info!(period_ms = config.market.match_sweep_interval_ms, "Match sweep enabled");
        market.spawn_match_sweep(period)
    });

    signal::ctrl_c()
        .await
        .map_err(|e| CardexError::Internal(format!("signal handler: {e}")))?;
    info!("Shutdown signal received");

    loading.abort();
    if let Some(sweep) = sweep {
        sweep.abort();
    }
    info!(ready = market.is_ready(), "Node stopped");
    Ok(())
}
