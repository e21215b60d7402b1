//! Committed store state and its versioning.

use std::collections::{BTreeMap, HashMap, VecDeque};

use cardex_types::{
    Album, IdempotencyKey, IdempotencyRecord, ItemId, Result, Trade, TradeId, User, UserId,
    constants,
};
use serde::{Deserialize, Serialize};

/// Something a transaction can read or write, and therefore conflict on.
///
/// Documents are keyed by id. The collection-level keys (`Users`,
/// `Albums`, `Trades`, `Supplies`, `TradesOf`) stand for scans: any write
/// to a member of the collection bumps them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocKey {
    User(UserId),
    Album(UserId),
    Trade(TradeId),
    Supply(ItemId),
    Idempotency(UserId, IdempotencyKey),
    Users,
    Albums,
    Trades,
    Supplies,
    /// Trades where the user is offerer or wanter.
    TradesOf(UserId),
}

/// How much history a state keeps between commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Retention {
    /// Idempotency records; the oldest is evicted first.
    pub idempotency: usize,
    /// Versions of removed keys before the oldest half is pruned.
    pub tombstones: usize,
}

impl Retention {
    pub(crate) fn new(idempotency: usize) -> Self {
        Self {
            idempotency: idempotency.max(1),
            tombstones: constants::DEFAULT_TOMBSTONE_RETENTION,
        }
    }
}

/// An immutable committed state. Transactions hold an `Arc` to one.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub(crate) sequence: u64,
    pub(crate) users: BTreeMap<UserId, User>,
    pub(crate) albums: BTreeMap<UserId, Album>,
    pub(crate) trades: BTreeMap<TradeId, Trade>,
    /// Copies granted minus copies retired, per item.
    pub(crate) supply: BTreeMap<ItemId, u64>,
    pub(crate) idempotency: HashMap<(UserId, IdempotencyKey), IdempotencyRecord>,
    /// Insertion order of idempotency records (front = oldest).
    pub(crate) idempotency_order: VecDeque<(UserId, IdempotencyKey)>,
    /// Versions of live keys and of recently removed ones.
    pub(crate) versions: HashMap<DocKey, u64>,
    /// Removed keys with the sequence they were removed at (front = oldest).
    pub(crate) tombstones: VecDeque<(DocKey, u64)>,
    /// Highest removal sequence pruned from `versions`. Every key without
    /// an entry reports this version.
    pub(crate) removed_floor: u64,
}

impl StoreState {
    /// Sequence number of the last commit applied to this state.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Version of a key. Keys without an entry, never written or removed
    /// long ago, share the removal floor, which starts at 0.
    #[must_use]
    pub fn version(&self, key: &DocKey) -> u64 {
        self.versions
            .get(key)
            .copied()
            .unwrap_or(self.removed_floor)
    }

    /// Number of keys carrying their own version.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub(crate) fn bump(&mut self, key: DocKey) {
        self.versions.insert(key, self.sequence);
    }

    /// Bump a key whose document is gone and queue it for pruning.
    pub(crate) fn retire(&mut self, key: DocKey) {
        self.versions.insert(key.clone(), self.sequence);
        self.tombstones.push_back((key, self.sequence));
    }

    /// Once more than `limit` removals are queued, drop the oldest half
    /// from `versions` and raise the floor to cover them.
    ///
    /// A reader that saw a pruned key still conflicts: its version is at or
    /// below the removal sequence, and the floor is now at or above it.
    /// Readers of other absent keys may conflict spuriously and retry.
    pub(crate) fn prune_tombstones(&mut self, limit: usize) {
        if self.tombstones.len() <= limit {
            return;
        }
        let keep = limit / 2;
        while self.tombstones.len() > keep {
            let Some((key, removed_at)) = self.tombstones.pop_front() else {
                break;
            };
            // A key written again since its removal is live; leave it.
            if self.versions.get(&key) == Some(&removed_at) {
                self.versions.remove(&key);
                self.removed_floor = self.removed_floor.max(removed_at);
            }
        }
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    #[must_use]
    pub fn idempotency_count(&self) -> usize {
        self.idempotency.len()
    }

    /// Insert an idempotency record, evicting the oldest beyond `retention`.
    pub(crate) fn remember(&mut self, record: IdempotencyRecord, retention: usize) {
        let key = (record.user, record.key.clone());
        if self.idempotency.insert(key.clone(), record).is_none() {
            self.idempotency_order.push_back(key.clone());
        }
        self.bump(DocKey::Idempotency(key.0, key.1));

        while self.idempotency.len() > retention {
            let Some(oldest) = self.idempotency_order.pop_front() else {
                break;
            };
            self.idempotency.remove(&oldest);
            self.retire(DocKey::Idempotency(oldest.0, oldest.1));
        }
    }

    pub(crate) fn to_file(&self) -> StoreFile {
        StoreFile {
            sequence: self.sequence,
            users: self.users.values().cloned().collect(),
            albums: self.albums.values().cloned().collect(),
            trades: self.trades.values().cloned().collect(),
            supply: self.supply.iter().map(|(id, n)| (*id, *n)).collect(),
            idempotency: self
                .idempotency_order
                .iter()
                .filter_map(|key| self.idempotency.get(key).cloned())
                .collect(),
        }
    }

    pub(crate) fn from_file(file: StoreFile) -> Self {
        let mut state = Self {
            sequence: file.sequence,
            users: file.users.into_iter().map(|u| (u.id, u)).collect(),
            albums: file.albums.into_iter().map(|a| (a.owner, a)).collect(),
            trades: file.trades.into_iter().map(|t| (t.id, t)).collect(),
            supply: file.supply.into_iter().collect(),
            ..Self::default()
        };
        for record in file.idempotency {
            let key = (record.user, record.key.clone());
            state.idempotency_order.push_back(key.clone());
            state.idempotency.insert(key, record);
        }
        state
    }
}

/// On-disk layout of a durable store: one JSON document.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoreFile {
    pub sequence: u64,
    pub users: Vec<User>,
    pub albums: Vec<Album>,
    pub trades: Vec<Trade>,
    pub supply: Vec<(ItemId, u64)>,
    /// Oldest first.
    pub idempotency: Vec<IdempotencyRecord>,
}

impl StoreFile {
    pub(crate) fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
