//! Node configuration, loaded from a TOML file.
//!
//! ```toml
//! [market]
//! packet_size = 5
//! store_path = "/var/lib/cardex/store.json"
//!
//! [catalog]
//! source_path = "/etc/cardex/characters.json"
//!
//! [logging]
//! level = "cardex=debug,info"
//! format = "json"
//! ```
//!
//! Every section and field is optional; missing values take the defaults
//! listed on `MarketConfig` and `LoggingConfig`.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use cardex_types::{CardexError, MarketConfig, Result};
use serde::Deserialize;

use crate::logging::LoggingConfig;

/// Where the upstream catalog comes from when no cached snapshot exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON array of upstream entries. Without it only the cache is used.
    pub source_path: Option<PathBuf>,
}

/// Top-level configuration of one node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub market: MarketConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Read and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CardexError::Configuration(format!("{}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    /// Parse and validate TOML text.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| CardexError::Configuration(e.to_string()))?;
        config.market.validate()?;
        Ok(config)
    }

    /// Period of the background match sweep, if enabled.
    #[must_use]
    pub fn sweep_period(&self) -> Option<Duration> {
        match self.market.match_sweep_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
