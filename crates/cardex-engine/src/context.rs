//! Shared dependencies of the engine components.

use std::sync::Arc;

use cardex_catalog::CatalogHandle;
use cardex_store::{CollectionStore, RetryPolicy, Transaction, run_transaction};
use cardex_types::{MarketConfig, Result};

/// Store, catalog and configuration, shared by every component.
#[derive(Debug)]
pub struct EngineContext<S> {
    pub store: Arc<S>,
    pub catalog: CatalogHandle,
    pub config: MarketConfig,
    pub policy: RetryPolicy,
}

impl<S> Clone for EngineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: self.catalog.clone(),
            config: self.config.clone(),
            policy: self.policy,
        }
    }
}

impl<S: CollectionStore> EngineContext<S> {
    #[must_use]
    pub fn new(store: Arc<S>, catalog: CatalogHandle, config: MarketConfig) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            store,
            catalog,
            config,
            policy,
        }
    }

    /// Run `body` as one store transaction under the configured retry policy.
    pub(crate) fn transact<T>(&self, body: impl FnMut(&mut Transaction) -> Result<T>) -> Result<T> {
        run_transaction(self.store.as_ref(), self.policy, body)
    }

    /// Run a read-only body against a fresh snapshot.
    pub(crate) fn read<T>(&self, body: impl FnOnce(&mut Transaction) -> Result<T>) -> Result<T> {
        let mut tx = self.store.begin()?;
        body(&mut tx)
    }
}
