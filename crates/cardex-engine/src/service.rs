//! Async facade exposed to the request-routing layer.
//!
//! Store work is synchronous; every operation here runs it on tokio's
//! blocking pool so request tasks never stall the runtime. A client that
//! stops waiting does not cancel the operation: the transaction may still
//! commit, and the outcome must be re-queried (or replayed with the same
//! idempotency key).

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use cardex_catalog::{CatalogHandle, CatalogSnapshot, CatalogSource, load_or_fetch};
use cardex_store::CollectionStore;
use cardex_types::{
    CardexError, IdempotencyKey, ItemId, MarketConfig, Result, TradeId, TradeView, User, UserId,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    AuditReport, PacketGenerator, TradeEngine,
    accounts::{AccountRemoval, Accounts, Registration},
    context::EngineContext,
};

struct Inner<S> {
    packets: PacketGenerator<S>,
    trades: TradeEngine<S>,
    accounts: Accounts<S>,
    ctx: EngineContext<S>,
}

/// The marketplace: packets, trades and accounts over one store and one
/// catalog. Cheap to clone.
pub struct Marketplace<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Marketplace<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn join_error(err: tokio::task::JoinError) -> CardexError {
    CardexError::Internal(format!("blocking task failed: {err}"))
}

impl<S: CollectionStore> Marketplace<S> {
    /// A marketplace whose catalog is not loaded yet.
    ///
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(store: Arc<S>, config: MarketConfig) -> Result<Self> {
        Self::with_catalog(store, CatalogHandle::new(), config)
    }

    /// A marketplace sharing an existing catalog handle.
    ///
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn with_catalog(store: Arc<S>, catalog: CatalogHandle, config: MarketConfig) -> Result<Self> {
        config.validate()?;
        let ctx = EngineContext::new(store, catalog, config);
        Ok(Self {
            inner: Arc::new(Inner {
                packets: PacketGenerator::new(ctx.clone()),
                trades: TradeEngine::new(ctx.clone()),
                accounts: Accounts::new(ctx.clone()),
                ctx,
            }),
        })
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner<S>) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || work(&inner))
            .await
            .map_err(join_error)?
    }

    // -----------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------

    #[must_use]
    pub fn catalog(&self) -> &CatalogHandle {
        &self.inner.ctx.catalog
    }

    /// Whether the catalog has been published.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.ctx.catalog.is_ready()
    }

    /// Load the catalog in the background (cache file first, then
    /// `source`) and publish it. Requests that need the catalog fail with
    /// `CatalogNotReady` until this completes.
    pub fn spawn_catalog_load(&self, source: Arc<dyn CatalogSource>) -> JoinHandle<Result<()>> {
        let catalog = self.inner.ctx.catalog.clone();
        let path = self.inner.ctx.config.catalog_snapshot_path.clone();
        tokio::spawn(async move {
            let loaded = tokio::task::spawn_blocking(move || load_or_fetch(&path, source.as_ref()))
                .await
                .map_err(join_error)
                .and_then(|r| r);
            match loaded {
                Ok(snapshot) => {
                    catalog.publish(snapshot);
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(error = %err, "Catalog load failed, engine stays not ready");
                    Err(err)
                }
            }
        })
    }

    /// Swap in a refreshed catalog.
    pub fn publish_catalog(&self, snapshot: CatalogSnapshot) {
        self.inner.ctx.catalog.publish(snapshot);
    }

    // -----------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------

    /// `GeneratePacket`.
    pub async fn generate_packet(&self, buyer: UserId, key: Option<IdempotencyKey>) -> Result<Vec<ItemId>> {
        self.blocking(move |inner| inner.packets.generate(buyer, key.as_ref()))
            .await
    }

    /// `CreateTrade`, followed by a best-effort match attempt.
    pub async fn create_trade(
        &self,
        offerer: UserId,
        offers: BTreeSet<ItemId>,
        wants: BTreeSet<ItemId>,
        key: Option<IdempotencyKey>,
    ) -> Result<TradeId> {
        self.blocking(move |inner| inner.trades.create(offerer, offers, wants, key.as_ref()))
            .await
    }

    /// `DeleteTrade`.
    pub async fn delete_trade(&self, requester: UserId, trade: TradeId) -> Result<()> {
        self.blocking(move |inner| inner.trades.delete(requester, trade))
            .await
    }

    /// `ListTrades`.
    pub async fn list_trades(&self, user: UserId) -> Result<Vec<TradeView>> {
        self.blocking(move |inner| inner.trades.list(user)).await
    }

    /// Retry matching for one trade.
    pub async fn match_trade(&self, trade: TradeId) -> Result<Option<TradeId>> {
        self.blocking(move |inner| inner.trades.match_trade(trade))
            .await
    }

    /// Retry matching for every pending trade.
    pub async fn sweep_matches(&self) -> Result<usize> {
        self.blocking(|inner| inner.trades.sweep()).await
    }

    /// `SellItems`. Returns the new balance.
    pub async fn sell_items(&self, owner: UserId, items: Vec<ItemId>) -> Result<u32> {
        self.blocking(move |inner| inner.accounts.sell(owner, &items))
            .await
    }

    // -----------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------

    pub async fn register(&self, registration: Registration) -> Result<UserId> {
        self.blocking(move |inner| inner.accounts.register(&registration))
            .await
    }

    pub async fn ensure_album(&self, user: UserId) -> Result<bool> {
        self.blocking(move |inner| inner.accounts.ensure_album(user))
            .await
    }

    pub async fn album(&self, user: UserId) -> Result<Vec<ItemId>> {
        self.blocking(move |inner| inner.accounts.album(user)).await
    }

    pub async fn user(&self, user: UserId) -> Result<User> {
        self.blocking(move |inner| inner.accounts.user(user)).await
    }

    pub async fn redeem_coins(&self, user: UserId, amount: u32) -> Result<u32> {
        self.blocking(move |inner| inner.accounts.redeem_coins(user, amount))
            .await
    }

    pub async fn set_favorite_item(&self, user: UserId, item: ItemId) -> Result<()> {
        self.blocking(move |inner| inner.accounts.set_favorite_item(user, item))
            .await
    }

    pub async fn delete_account(&self, user: UserId) -> Result<AccountRemoval> {
        self.blocking(move |inner| inner.accounts.delete_account(user))
            .await
    }

    /// `AuditConservation`.
    pub async fn audit(&self) -> Result<AuditReport> {
        self.blocking(|inner| crate::audit(inner.ctx.store.as_ref()))
            .await
    }

    // -----------------------------------------------------------------
    // Background work
    // -----------------------------------------------------------------

    /// Periodically retry matching for every pending trade.
    ///
    /// The first sweep runs one `period` after spawning. Abort the handle
    /// to stop.
    pub fn spawn_match_sweep(&self, period: Duration) -> JoinHandle<()> {
        let market = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match market.sweep_matches().await {
                    Ok(0) => {}
                    Ok(pairs) => tracing::info!(pairs, "Match sweep exchanged cards"),
                    Err(err) => tracing::warn!(error = %err, "Match sweep failed"),
                }
            }
        })
    }
}
