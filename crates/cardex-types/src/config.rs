//! Configuration types for the Cardex engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{CardexError, Result, constants};

/// Tunables of the marketplace engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Cards drawn per packet.
    pub packet_size: usize,
    /// Coins debited per packet.
    pub packet_price: u32,
    /// Coins credited per card sold.
    pub sell_price: u32,
    /// Balance cap.
    pub max_balance: u32,
    /// Attempts for a transaction that keeps hitting commit conflicts.
    pub commit_attempts: u32,
    /// Idempotency records kept by the store.
    pub idempotency_retention: usize,
    /// Interval of the background match sweep, in milliseconds. Zero disables it.
    pub match_sweep_interval_ms: u64,
    /// On-disk JSON snapshot of the catalog.
    pub catalog_snapshot_path: PathBuf,
    /// Durable store file. `None` keeps the store in memory only.
    pub store_path: Option<PathBuf>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            packet_size: constants::PACKET_SIZE,
            packet_price: constants::PACKET_PRICE,
            sell_price: constants::SELL_PRICE,
            max_balance: constants::MAX_BALANCE,
            commit_attempts: constants::DEFAULT_COMMIT_ATTEMPTS,
            idempotency_retention: constants::DEFAULT_IDEMPOTENCY_RETENTION,
            match_sweep_interval_ms: constants::DEFAULT_MATCH_SWEEP_INTERVAL_MS,
            catalog_snapshot_path: PathBuf::from(constants::DEFAULT_CATALOG_SNAPSHOT_PATH),
            store_path: None,
        }
    }
}

impl MarketConfig {
    /// Reject configurations the engine cannot run with.
    ///
    /// # Errors
    /// Returns `Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.packet_size == 0 {
            return Err(CardexError::Configuration("packet_size must be > 0".into()));
        }
        if self.packet_price == 0 {
            return Err(CardexError::Configuration("packet_price must be > 0".into()));
        }
        if self.commit_attempts == 0 {
            return Err(CardexError::Configuration(
                "commit_attempts must be > 0".into(),
            ));
        }
        if self.idempotency_retention == 0 {
            return Err(CardexError::Configuration(
                "idempotency_retention must be > 0".into(),
            ));
        }
        if self.max_balance > constants::MAX_BALANCE {
            return Err(CardexError::Configuration(format!(
                "max_balance must be <= {}",
                constants::MAX_BALANCE
            )));
        }
        Ok(())
    }
}
