//! # Trade: the bilateral exchange offer
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  complement found   ┌─────────┐
//!   │ PENDING ├────────────────────▶│ MATCHED │  (kept for history)
//!   └────┬────┘                     └─────────┘
//!        │ offerer deletes
//!        ▼
//!   (record removed, offers returned to the album)
//! ```
//!
//! While a trade is pending its `offers` are held in escrow: they are not in
//! the offerer's album and belong to nobody else either.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CardexError, ItemId, Result, TradeId, UserId};

/// Lifecycle state of a trade.
///
/// Transitions are **monotonic**: `Pending → Matched` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeState {
    /// Offers are escrowed, waiting for a complement.
    Pending,
    /// Exchanged with a counterparty. **Terminal** and read-only.
    Matched,
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Matched => write!(f, "MATCHED"),
        }
    }
}

/// A bilateral exchange offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub offerer: UserId,
    /// Counterparty, set when matched.
    pub wanter: Option<UserId>,
    pub offers: BTreeSet<ItemId>,
    pub wants: BTreeSet<ItemId>,
    pub state: TradeState,
    pub created_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// A new pending trade.
    #[must_use]
    pub fn pending(offerer: UserId, offers: BTreeSet<ItemId>, wants: BTreeSet<ItemId>) -> Self {
        Self {
            id: TradeId::new(),
            offerer,
            wanter: None,
            offers,
            wants,
            state: TradeState::Pending,
            created_at: Utc::now(),
            matched_at: None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state == TradeState::Pending
    }

    #[must_use]
    pub fn is_matched(&self) -> bool {
        self.state == TradeState::Matched
    }

    /// Whether `other` is the exact complement of this trade: a different
    /// offerer who offers exactly what this trade wants and wants exactly
    /// what this trade offers.
    #[must_use]
    pub fn is_complement_of(&self, other: &Self) -> bool {
        self.id != other.id
            && self.offerer != other.offerer
            && self.offers == other.wants
            && self.wants == other.offers
    }

    /// Whether the user is offerer or counterparty.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.offerer == user || self.wanter == Some(user)
    }

    /// Items escrowed or requested by this trade while it is pending.
    pub fn locked_items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.offers.iter().chain(self.wants.iter()).copied()
    }

    /// Transition to MATCHED with the given counterparty.
    ///
    /// # Errors
    /// Returns `AlreadyMatched` if the trade is not pending.
    pub fn mark_matched(&mut self, wanter: UserId) -> Result<()> {
        if !self.is_pending() {
            return Err(CardexError::AlreadyMatched(self.id));
        }
        self.state = TradeState::Matched;
        self.wanter = Some(wanter);
        self.matched_at = Some(Utc::now());
        Ok(())
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} offers {:?} wants {:?} ({})",
            self.id,
            self.offerer,
            self.offers.iter().map(|i| i.0).collect::<Vec<_>>(),
            self.wants.iter().map(|i| i.0).collect::<Vec<_>>(),
            self.state,
        )
    }
}

/// A catalog reference enriched for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLabel {
    pub id: ItemId,
    /// `None` when the catalog is not loaded or no longer lists the item.
    pub name: Option<String>,
}

/// A trade together with display names of the items it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeView {
    pub trade: Trade,
    pub offers: Vec<ItemLabel>,
    pub wants: Vec<ItemLabel>,
}
