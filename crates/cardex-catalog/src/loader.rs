//! Catalog loading: on-disk JSON cache first, upstream source second.
//!
//! ```text
//! load_or_fetch(path, source)
//!   ├─ path readable & parsable ──▶ snapshot
//!   └─ otherwise ──▶ source.fetch_all() ──▶ rate ──▶ write cache ──▶ snapshot
//! ```
//!
//! A cache write failure is logged and ignored: the process can still run,
//! it just refetches on the next start.

use std::{fs, path::{Path, PathBuf}};

use cardex_types::{CardexError, CatalogEntry, Result};

use crate::CatalogSnapshot;

/// The external catalog collaborator (`GetAllItems`).
///
/// Implementations return the full catalog or fail; never a partial list.
pub trait CatalogSource: Send + Sync {
    /// # Errors
    /// Returns `CatalogUnavailable` when the upstream cannot be read.
    fn fetch_all(&self) -> Result<Vec<CatalogEntry>>;
}

/// A fixed, in-memory list of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: Vec<CatalogEntry>,
}

impl StaticSource {
    #[must_use]
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }
}

impl CatalogSource for StaticSource {
    fn fetch_all(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.entries.clone())
    }
}

/// Raw entries exported by the upstream provider as a JSON array.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogSource for JsonFileSource {
    fn fetch_all(&self) -> Result<Vec<CatalogEntry>> {
        let raw = fs::read_to_string(&self.path).map_err(|e| CardexError::CatalogUnavailable {
            reason: format!("cannot read {}: {e}", self.path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| CardexError::CatalogUnavailable {
            reason: format!("cannot parse {}: {e}", self.path.display()),
        })
    }
}

/// Load the cached snapshot at `path`, or build it from `source`.
///
/// # Errors
/// Returns `CatalogUnavailable` if there is no usable cache and the source
/// fails or yields no usable entries.
pub fn load_or_fetch(path: &Path, source: &dyn CatalogSource) -> Result<CatalogSnapshot> {
    match CatalogSnapshot::load(path) {
        Ok(snapshot) if !snapshot.is_empty() => {
            tracing::info!(
                path = %path.display(),
                items = snapshot.len(),
                "Catalog read from cache file"
            );
            return Ok(snapshot);
        }
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Cached catalog is empty, refetching");
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "No usable catalog cache, fetching");
        }
    }

    let entries = source.fetch_all()?;
    let fetched = entries.len();
    let snapshot = CatalogSnapshot::from_entries(entries);
    if snapshot.is_empty() {
        return Err(CardexError::CatalogUnavailable {
            reason: format!("source returned {fetched} entries, none usable"),
        });
    }
    tracing::info!(
        fetched,
        usable = snapshot.len(),
        "Catalog fetched and rated"
    );

    if let Err(err) = snapshot.save(path) {
        tracing::warn!(path = %path.display(), error = %err, "Could not write catalog cache");
    }
    Ok(snapshot)
}
