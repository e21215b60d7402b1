//! The album: a user's collection of catalog items.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ItemId, UserId};

/// A user's owned items.
///
/// Every mutation the engine performs has set semantics (packets only draw
/// un-owned items, trades return escrow with set union), so a copy of an
/// item appears at most once per album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub owner: UserId,
    pub items: BTreeSet<ItemId>,
}

impl Album {
    /// An empty album.
    #[must_use]
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            items: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, item: ItemId) -> bool {
        self.items.contains(&item)
    }

    /// First item of `items` that is missing from the album.
    #[must_use]
    pub fn first_missing<'a>(&self, items: impl IntoIterator<Item = &'a ItemId>) -> Option<ItemId> {
        items.into_iter().copied().find(|id| !self.contains(*id))
    }

    /// First item of `items` that is already in the album.
    #[must_use]
    pub fn first_owned<'a>(&self, items: impl IntoIterator<Item = &'a ItemId>) -> Option<ItemId> {
        items.into_iter().copied().find(|id| self.contains(*id))
    }

    /// Set union. Returns how many items were actually new.
    pub fn add_all<'a>(&mut self, items: impl IntoIterator<Item = &'a ItemId>) -> usize {
        items
            .into_iter()
            .filter(|id| self.items.insert(**id))
            .count()
    }

    /// Remove every item of `items`. Returns how many were present.
    pub fn remove_all<'a>(&mut self, items: impl IntoIterator<Item = &'a ItemId>) -> usize {
        items
            .into_iter()
            .filter(|id| self.items.remove(*id))
            .count()
    }

    /// Owned ids in ascending order.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<ItemId> {
        self.items.iter().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
