//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cardex - collectible-card marketplace node.
#[derive(Parser, Debug)]
#[command(name = "cardex-node")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "cardex.toml")]
    pub config: PathBuf,

    /// Force JSON log lines regardless of the configured format.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Load the catalog, start the match sweep and serve until Ctrl-C (default)
    Run,

    /// Compare every album and pending trade against the supply ledger
    Audit,

    /// Validate the configuration file and exit
    Check,
}

impl Cli {
    /// The requested command, `run` when none is given.
    #[must_use]
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}
