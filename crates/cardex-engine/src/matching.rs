//! Automatic matching of complementary trades.
//!
//! Two pending trades match when they come from different offerers and
//! each offers exactly what the other wants. The exchange is one
//! transaction:
//!
//! ```text
//! t1.offerer album ∪= t2.offers
//! t2.offerer album ∪= t1.offers
//! t1, t2 ──▶ MATCHED (wanter = the other offerer)
//! ```
//!
//! When several trades complement `t1`, the oldest (lowest id) wins.

use cardex_store::CollectionStore;
use cardex_types::{Album, Result, TradeId};

use crate::{
    TradeEngine,
    conservation::{Census, ensure_conserved},
};

impl<S: CollectionStore> TradeEngine<S> {
    /// Match trade `id` against its oldest pending complement.
    ///
    /// Returns the counterpart's id, or `None` if `id` is gone, no longer
    /// pending, or has no complement.
    ///
    /// # Errors
    /// `InvariantViolation` or a storage error; the trades stay pending.
    pub fn match_trade(&self, id: TradeId) -> Result<Option<TradeId>> {
        let matched = self.ctx.transact(|tx| {
            let Some(mut t1) = tx.trade(id) else {
                return Ok(None);
            };
            if !t1.is_pending() {
                return Ok(None);
            }
            let Some(mut t2) = tx
                .pending_trades()
                .into_iter()
                .find(|candidate| candidate.is_complement_of(&t1))
            else {
                return Ok(None);
            };

            let mut a = tx.album(t1.offerer).unwrap_or_else(|| Album::new(t1.offerer));
            let mut b = tx.album(t2.offerer).unwrap_or_else(|| Album::new(t2.offerer));
            let before = Census::of(&[&a, &b], &[&t1, &t2]);

            a.add_all(&t2.offers);
            b.add_all(&t1.offers);
            t1.mark_matched(t2.offerer)?;
            t2.mark_matched(t1.offerer)?;
            ensure_conserved("match_trade", &before, &Census::of(&[&a, &b], &[&t1, &t2]))?;

            let pair = (t1.offerer, t2.offerer, t2.id);
            tx.put_album(a);
            tx.put_album(b);
            tx.put_trade(t1);
            tx.put_trade(t2);
            Ok(Some(pair))
        })?;

        Ok(matched.map(|(first, second, counterpart)| {
            tracing::info!(
                trade = %id,
                counterpart = %counterpart,
                %first,
                %second,
                "Trades matched, cards exchanged"
            );
            counterpart
        }))
    }

    /// Try to match every pending trade. Returns the number of pairs matched.
    ///
    /// A failed attempt is logged and the sweep moves on.
    ///
    /// # Errors
    /// A storage error while listing the pending trades.
    pub fn sweep(&self) -> Result<usize> {
        let pending: Vec<TradeId> = self
            .ctx
            .read(|tx| Ok(tx.pending_trades().into_iter().map(|t| t.id).collect()))?;

        let mut pairs = 0;
        for id in pending {
            match self.match_trade(id) {
                Ok(Some(_)) => pairs += 1,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(trade = %id, error = %err, "Sweep could not match trade");
                }
            }
        }
        tracing::debug!(pairs, "Match sweep finished");
        Ok(pairs)
    }
}
