//! In-process [`CollectionStore`] with optional JSON persistence.
//!
//! The committed state is an immutable `Arc<StoreState>` swapped on every
//! commit. Readers never block writers: `begin` just clones the `Arc`.
//! Commits are serialized by a mutex so validation and publication happen
//! as one step.
//!
//! With a persistence path, the new state is written to disk (temp file +
//! rename) *before* it is published. A failed write fails the commit and
//! leaves the previous state in place.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use cardex_types::{CardexError, MarketConfig, Result};
use parking_lot::{Mutex, RwLock};

use crate::{
    CollectionStore,
    state::{Retention, StoreFile, StoreState},
    transaction::{CommitReceipt, Transaction},
};

/// The bundled store implementation.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<Arc<StoreState>>,
    commit_lock: Mutex<()>,
    path: Option<PathBuf>,
    retention: Retention,
}

impl MemoryStore {
    /// A purely in-memory store.
    #[must_use]
    pub fn new(idempotency_retention: usize) -> Self {
        Self {
            state: RwLock::new(Arc::new(StoreState::default())),
            commit_lock: Mutex::new(()),
            path: None,
            retention: Retention::new(idempotency_retention),
        }
    }

    /// A durable store backed by the JSON file at `path`.
    ///
    /// An existing file is loaded; a missing one starts an empty store.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the file exists but cannot be read
    /// or parsed.
    pub fn open(path: impl Into<PathBuf>, idempotency_retention: usize) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|e| unavailable(&path, &e))?;
            let file = StoreFile::from_json(&json).map_err(|e| unavailable(&path, &e))?;
            let state = StoreState::from_file(file);
            tracing::info!(
                path = %path.display(),
                sequence = state.sequence(),
                users = state.user_count(),
                trades = state.trade_count(),
                "Store loaded"
            );
            state
        } else {
            tracing::info!(path = %path.display(), "Store file absent, starting empty");
            StoreState::default()
        };

        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            commit_lock: Mutex::new(()),
            path: Some(path),
            retention: Retention::new(idempotency_retention),
        })
    }

    /// Build the store described by `config`.
    ///
    /// # Errors
    /// See [`open`](Self::open).
    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        match &config.store_path {
            Some(path) => Self::open(path, config.idempotency_retention),
            None => Ok(Self::new(config.idempotency_retention)),
        }
    }

    /// The latest committed state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<StoreState> {
        self.state.read().clone()
    }

    /// Persistence path, if durable.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = state.to_file().to_json()?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| unavailable(path, &e))?;
        fs::rename(&tmp, path).map_err(|e| unavailable(path, &e))?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(cardex_types::constants::DEFAULT_IDEMPOTENCY_RETENTION)
    }
}

fn unavailable(path: &Path, err: &dyn std::fmt::Display) -> CardexError {
    CardexError::StorageUnavailable {
        reason: format!("{}: {err}", path.display()),
    }
}

impl CollectionStore for MemoryStore {
    fn begin(&self) -> Result<Transaction> {
        Ok(Transaction::new(self.snapshot()))
    }

    fn commit(&self, tx: Transaction) -> Result<CommitReceipt> {
        let _serial = self.commit_lock.lock();
        let latest = self.snapshot();

        if tx.is_read_only() {
            return Ok(CommitReceipt {
                sequence: latest.sequence(),
                documents_written: 0,
            });
        }

        if let Some(key) = tx.stale_key(&latest) {
            tracing::debug!(
                ?key,
                snapshot = tx.snapshot_sequence(),
                latest = latest.sequence(),
                "Commit rejected: stale read"
            );
            return Err(CardexError::TransactionConflict { attempts: 1 });
        }

        let mut next = (*latest).clone();
        let documents_written = tx.apply(&mut next, self.retention);
        self.persist(&next)?;

        let sequence = next.sequence();
        *self.state.write() = Arc::new(next);
        tracing::debug!(sequence, documents_written, "Commit applied");

        Ok(CommitReceipt {
            sequence,
            documents_written,
        })
    }
}
