//! Shared access to the current catalog snapshot.
//!
//! The handle starts empty. Readers get `CatalogNotReady` until the first
//! [`publish`](CatalogHandle::publish); afterwards every reader holds an
//! `Arc` to an immutable snapshot, and a refresh swaps in a new one without
//! disturbing readers of the old.

use std::sync::Arc;

use cardex_types::{CardexError, Result};
use parking_lot::RwLock;

use crate::CatalogSnapshot;

/// Cloneable handle to the published catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogHandle {
    current: Arc<RwLock<Option<Arc<CatalogSnapshot>>>>,
}

impl CatalogHandle {
    /// An empty handle (not ready).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that is ready from the start.
    #[must_use]
    pub fn with_snapshot(snapshot: CatalogSnapshot) -> Self {
        let handle = Self::new();
        handle.publish(snapshot);
        handle
    }

    /// Replace the published snapshot wholesale.
    pub fn publish(&self, snapshot: CatalogSnapshot) {
        tracing::info!(
            items = snapshot.len(),
            digest = %snapshot.digest(),
            "Catalog snapshot published"
        );
        *self.current.write() = Some(Arc::new(snapshot));
    }

    /// The current snapshot.
    ///
    /// # Errors
    /// Returns `CatalogNotReady` before the first publish.
    pub fn current(&self) -> Result<Arc<CatalogSnapshot>> {
        self.current
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(CardexError::CatalogNotReady)
    }

    /// The current snapshot, if any.
    #[must_use]
    pub fn try_current(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current.read().as_ref().map(Arc::clone)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }
}
