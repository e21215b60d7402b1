//! Trade creation, deletion and listing.
//!
//! ## Escrow
//!
//! Creating a trade removes its `offers` from the offerer's album in the
//! same transaction that inserts the trade, so an offered card can be
//! neither sold nor offered twice. Deleting a pending trade puts them back
//! (set union) and removes the record. Matched trades are kept for history
//! and are read-only.
//!
//! Every mutation checks that the census of the touched albums and pending
//! offers is unchanged (see [`conservation`](crate::conservation)).

use std::collections::BTreeSet;

use cardex_catalog::CatalogSnapshot;
use cardex_store::CollectionStore;
use cardex_types::{
    Album, CardexError, IdempotencyKey, ItemId, ItemLabel, Operation, Outcome, Result, Trade,
    TradeId, TradeView, UserId,
};

use crate::{
    conservation::{Census, ensure_conserved},
    context::EngineContext,
    idempotency::KeyedRequest,
};

/// Lifecycle of bilateral exchange offers.
#[derive(Debug)]
pub struct TradeEngine<S> {
    pub(crate) ctx: EngineContext<S>,
}

impl<S: CollectionStore> TradeEngine<S> {
    #[must_use]
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// Create a pending trade, escrowing `offers`, then try to match it.
    ///
    /// The match attempt runs after the create has committed; its failure
    /// is logged and never undoes the trade.
    ///
    /// # Errors
    /// `InvalidRequest` for empty sets, `CatalogNotReady` / `UnknownItem`
    /// for wants outside the catalog, `UserNotFound`, `NotOwned`,
    /// `AlreadyOwned`, `DuplicateWant`, `IdempotencyKeyReused`, or a
    /// storage error.
    pub fn create(
        &self,
        offerer: UserId,
        offers: BTreeSet<ItemId>,
        wants: BTreeSet<ItemId>,
        key: Option<&IdempotencyKey>,
    ) -> Result<TradeId> {
        if offers.is_empty() || wants.is_empty() {
            return Err(CardexError::InvalidRequest {
                reason: "a trade needs at least one offered and one wanted card".into(),
            });
        }
        let catalog = self.ctx.catalog.current()?;
        if let Some(unknown) = catalog.first_unknown(&wants) {
            return Err(CardexError::UnknownItem(unknown));
        }
        let keyed = key.map(|k| KeyedRequest::new(k, offerer, Operation::CreateTrade, &[&offers, &wants]));

        let (id, replayed) = self.ctx.transact(|tx| {
            if let Some(keyed) = &keyed {
                if let Some(outcome) = keyed.replay(tx)? {
                    return Ok((outcome.into_trade()?, true));
                }
            }
            if tx.user(offerer).is_none() {
                return Err(CardexError::UserNotFound(offerer));
            }

            let mut album = tx.album(offerer).unwrap_or_else(|| Album::new(offerer));
            if let Some(missing) = album.first_missing(&offers) {
                return Err(CardexError::NotOwned(missing));
            }

            // Cards escrowed in the offerer's own pending trades still count as owned.
            let own_pending = tx.pending_trades_of(offerer);
            let held = |item: &ItemId| {
                album.contains(*item) || own_pending.iter().any(|t| t.offers.contains(item))
            };
            if let Some(owned) = wants.iter().copied().find(|w| held(w)) {
                return Err(CardexError::AlreadyOwned(owned));
            }
            if let Some(dup) = wants
                .iter()
                .copied()
                .find(|w| own_pending.iter().any(|t| t.wants.contains(w)))
            {
                return Err(CardexError::DuplicateWant(dup));
            }

            let before = Census::of(&[&album], &[]);
            album.remove_all(&offers);
            let trade = Trade::pending(offerer, offers.clone(), wants.clone());
            ensure_conserved("create_trade", &before, &Census::of(&[&album], &[&trade]))?;

            let id = trade.id;
            tx.put_album(album);
            tx.put_trade(trade);
            if let Some(keyed) = &keyed {
                keyed.record(tx, Outcome::TradeCreated(id));
            }
            Ok((id, false))
        })?;

        if replayed {
            tracing::debug!(user = %offerer, trade = %id, "Trade creation replayed");
            return Ok(id);
        }
        tracing::info!(
            user = %offerer,
            trade = %id,
            offers = offers.len(),
            wants = wants.len(),
            "Trade created, offers escrowed"
        );

        if let Err(err) = self.match_trade(id) {
            tracing::warn!(trade = %id, error = %err, "Automatic matching failed, trade stays pending");
        }
        Ok(id)
    }

    /// Cancel a pending trade and return its offers to the offerer.
    ///
    /// # Errors
    /// `TradeNotFound`, `Forbidden` if `requester` is not the offerer,
    /// `AlreadyMatched`, or a storage error.
    pub fn delete(&self, requester: UserId, id: TradeId) -> Result<()> {
        let returned = self.ctx.transact(|tx| {
            let trade = tx.trade(id).ok_or(CardexError::TradeNotFound(id))?;
            if trade.offerer != requester {
                return Err(CardexError::Forbidden {
                    reason: format!("only the offerer may delete {id}"),
                });
            }
            if trade.is_matched() {
                return Err(CardexError::AlreadyMatched(id));
            }

            let mut album = tx.album(requester).unwrap_or_else(|| Album::new(requester));
            let before = Census::of(&[&album], &[&trade]);
            album.add_all(&trade.offers);
            ensure_conserved("delete_trade", &before, &Census::of(&[&album], &[]))?;

            tx.put_album(album);
            tx.remove_trade(id);
            Ok(trade.offers.len())
        })?;

        tracing::info!(user = %requester, trade = %id, returned, "Trade deleted, offers returned");
        Ok(())
    }

    /// Every trade where `user` is offerer or wanter, with display names.
    ///
    /// Names are `None` while the catalog is not loaded.
    ///
    /// # Errors
    /// A storage error.
    pub fn list(&self, user: UserId) -> Result<Vec<TradeView>> {
        let trades = self.ctx.read(|tx| Ok(tx.trades_involving(user)))?;
        let catalog = self.ctx.catalog.try_current();
        tracing::debug!(user = %user, trades = trades.len(), "Trades listed");
        Ok(trades
            .into_iter()
            .map(|trade| enrich(trade, catalog.as_deref()))
            .collect())
    }
}

fn labels(items: &BTreeSet<ItemId>, catalog: Option<&CatalogSnapshot>) -> Vec<ItemLabel> {
    items
        .iter()
        .map(|&id| ItemLabel {
            id,
            name: catalog.and_then(|c| c.name_of(id)).map(str::to_string),
        })
        .collect()
}

fn enrich(trade: Trade, catalog: Option<&CatalogSnapshot>) -> TradeView {
    TradeView {
        offers: labels(&trade.offers, catalog),
        wants: labels(&trade.wants, catalog),
        trade,
    }
}
