//! Packet generation.
//!
//! ## Flow
//!
//! ```text
//! generate(buyer)
//!   catalog ready?                     else NotReady
//!   └─ transaction ─────────────────────────────────────────────
//!      replay idempotency key?         ─▶ stored packet
//!      buyer exists?                   else UserNotFound
//!      balance ≥ price?                else InsufficientBalance
//!      candidates = catalog − owned − escrowed(offers ∪ wants of own pending trades)
//!      candidates empty?               else CollectionExhausted
//!      draw min(size, |candidates|) distinct ids
//!      album ∪= drawn; balance -= price; ledger += 1 per id
//!   └─ commit (retried on conflict)
//! ```
//!
//! Every failure before commit leaves the store untouched.

use std::collections::BTreeSet;

use cardex_store::CollectionStore;
use cardex_types::{
    Album, CardexError, IdempotencyKey, ItemId, Operation, Outcome, Result, UserId,
};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{conservation, context::EngineContext, idempotency::KeyedRequest};

/// Draw `count` distinct ids uniformly from `pool`, without replacement.
///
/// Partial Fisher–Yates: each draw picks an index into the shrinking
/// working set and removes it. Draws `min(count, pool.len())` ids.
pub fn draw_distinct<R: Rng + ?Sized>(rng: &mut R, mut pool: Vec<ItemId>, count: usize) -> Vec<ItemId> {
    let take = count.min(pool.len());
    let mut drawn = Vec::with_capacity(take);
    for _ in 0..take {
        let index = rng.gen_range(0..pool.len());
        drawn.push(pool.swap_remove(index));
    }
    drawn
}

/// Sells random packets of un-owned cards.
#[derive(Debug)]
pub struct PacketGenerator<S> {
    ctx: EngineContext<S>,
    rng: Mutex<StdRng>,
}

impl<S: CollectionStore> PacketGenerator<S> {
    #[must_use]
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self {
            ctx,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// A generator with a reproducible draw sequence.
    #[must_use]
    pub fn with_seed(ctx: EngineContext<S>, seed: u64) -> Self {
        Self {
            ctx,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Buy one packet for `buyer`.
    ///
    /// # Errors
    /// `CatalogNotReady`, `UserNotFound`, `InsufficientBalance`,
    /// `CollectionExhausted`, `IdempotencyKeyReused`, or a storage error.
    pub fn generate(&self, buyer: UserId, key: Option<&IdempotencyKey>) -> Result<Vec<ItemId>> {
        let catalog = self.ctx.catalog.current()?;
        let keyed = key.map(|k| KeyedRequest::new(k, buyer, Operation::GeneratePacket, &[]));
        let price = self.ctx.config.packet_price;
        let size = self.ctx.config.packet_size;

        let (drawn, replayed) = self.ctx.transact(|tx| {
            if let Some(keyed) = &keyed {
                if let Some(outcome) = keyed.replay(tx)? {
                    return Ok((outcome.into_packet()?, true));
                }
            }

            let mut user = tx.user(buyer).ok_or(CardexError::UserNotFound(buyer))?;
            if !user.can_afford(price) {
                return Err(CardexError::InsufficientBalance {
                    needed: price,
                    available: user.balance,
                });
            }

            let mut album = tx.album(buyer).unwrap_or_else(|| Album::new(buyer));
            let escrowed: BTreeSet<ItemId> = tx
                .pending_trades_of(buyer)
                .iter()
                .flat_map(cardex_types::Trade::locked_items)
                .collect();
            let candidates: Vec<ItemId> = catalog
                .ids()
                .filter(|id| !album.contains(*id) && !escrowed.contains(id))
                .collect();
            if candidates.is_empty() {
                return Err(CardexError::CollectionExhausted);
            }

            let drawn = draw_distinct(&mut *self.rng.lock(), candidates, size);

            user.balance -= price;
            album.add_all(&drawn);
            conservation::grant(tx, &drawn);
            tx.put_user(user);
            tx.put_album(album);
            if let Some(keyed) = &keyed {
                keyed.record(tx, Outcome::Packet(drawn.clone()));
            }
            Ok((drawn, false))
        })?;

        if replayed {
            tracing::debug!(user = %buyer, cards = drawn.len(), "Packet replayed");
        } else {
            tracing::info!(
                user = %buyer,
                cards = drawn.len(),
                price,
                catalog = %catalog.digest(),
                "Packet generated"
            );
        }
        Ok(drawn)
    }
}
