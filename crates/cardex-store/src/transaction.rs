//! Optimistic transactions over a [`StoreState`] snapshot.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use cardex_types::{
    Album, IdempotencyKey, IdempotencyRecord, ItemId, Trade, TradeId, User, UserId,
};

use crate::state::{DocKey, Retention, StoreState};

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Sequence number the commit was applied at.
    pub sequence: u64,
    /// Documents inserted, replaced or removed.
    pub documents_written: usize,
}

/// A unit of work against the store.
///
/// Reads go to the snapshot the transaction was opened on, overlaid with
/// the transaction's own staged writes. Nothing is visible to anyone else
/// until the store commits it.
#[derive(Debug)]
pub struct Transaction {
    snapshot: Arc<StoreState>,
    /// Snapshot version of every key read or written.
    reads: HashMap<DocKey, u64>,
    users: BTreeMap<UserId, Option<User>>,
    albums: BTreeMap<UserId, Option<Album>>,
    trades: BTreeMap<TradeId, Option<Trade>>,
    supply: BTreeMap<ItemId, u64>,
    idempotency: Vec<IdempotencyRecord>,
}

/// Committed documents overlaid with staged replacements and removals.
fn overlay<'a, K: Ord, V>(
    base: &'a BTreeMap<K, V>,
    staged: &'a BTreeMap<K, Option<V>>,
) -> BTreeMap<&'a K, &'a V> {
    let mut view: BTreeMap<&K, &V> = base.iter().collect();
    for (key, value) in staged {
        match value {
            Some(value) => {
                view.insert(key, value);
            }
            None => {
                view.remove(key);
            }
        }
    }
    view
}

impl Transaction {
    #[must_use]
    pub fn new(snapshot: Arc<StoreState>) -> Self {
        Self {
            snapshot,
            reads: HashMap::new(),
            users: BTreeMap::new(),
            albums: BTreeMap::new(),
            trades: BTreeMap::new(),
            supply: BTreeMap::new(),
            idempotency: Vec::new(),
        }
    }

    fn observe(&mut self, key: DocKey) {
        let version = self.snapshot.version(&key);
        self.reads.entry(key).or_insert(version);
    }

    /// Sequence of the snapshot this transaction reads from.
    #[must_use]
    pub fn snapshot_sequence(&self) -> u64 {
        self.snapshot.sequence()
    }

    /// Whether nothing has been staged.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.users.is_empty()
            && self.albums.is_empty()
            && self.trades.is_empty()
            && self.supply.is_empty()
            && self.idempotency.is_empty()
    }

    // -----------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------

    pub fn user(&mut self, id: UserId) -> Option<User> {
        self.observe(DocKey::User(id));
        match self.users.get(&id) {
            Some(staged) => staged.clone(),
            None => self.snapshot.users.get(&id).cloned(),
        }
    }

    pub fn put_user(&mut self, user: User) {
        self.observe(DocKey::User(user.id));
        self.users.insert(user.id, Some(user));
    }

    pub fn remove_user(&mut self, id: UserId) {
        self.observe(DocKey::User(id));
        self.users.insert(id, None);
    }

    /// First user (in id order) matching `predicate`.
    pub fn find_user(&mut self, predicate: impl Fn(&User) -> bool) -> Option<User> {
        self.observe(DocKey::Users);
        overlay(&self.snapshot.users, &self.users)
            .into_values()
            .find(|u| predicate(u))
            .cloned()
    }

    // -----------------------------------------------------------------
    // Albums
    // -----------------------------------------------------------------

    pub fn album(&mut self, owner: UserId) -> Option<Album> {
        self.observe(DocKey::Album(owner));
        match self.albums.get(&owner) {
            Some(staged) => staged.clone(),
            None => self.snapshot.albums.get(&owner).cloned(),
        }
    }

    pub fn put_album(&mut self, album: Album) {
        self.observe(DocKey::Album(album.owner));
        self.albums.insert(album.owner, Some(album));
    }

    pub fn remove_album(&mut self, owner: UserId) {
        self.observe(DocKey::Album(owner));
        self.albums.insert(owner, None);
    }

    /// Every album, in owner order.
    pub fn all_albums(&mut self) -> Vec<Album> {
        self.observe(DocKey::Albums);
        overlay(&self.snapshot.albums, &self.albums)
            .into_values()
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------
    // Trades
    // -----------------------------------------------------------------

    pub fn trade(&mut self, id: TradeId) -> Option<Trade> {
        self.observe(DocKey::Trade(id));
        match self.trades.get(&id) {
            Some(staged) => staged.clone(),
            None => self.snapshot.trades.get(&id).cloned(),
        }
    }

    pub fn put_trade(&mut self, trade: Trade) {
        self.observe(DocKey::Trade(trade.id));
        self.trades.insert(trade.id, Some(trade));
    }

    pub fn remove_trade(&mut self, id: TradeId) {
        self.observe(DocKey::Trade(id));
        self.trades.insert(id, None);
    }

    /// Every pending trade, oldest id first.
    pub fn pending_trades(&mut self) -> Vec<Trade> {
        self.observe(DocKey::Trades);
        overlay(&self.snapshot.trades, &self.trades)
            .into_values()
            .filter(|t| t.is_pending())
            .cloned()
            .collect()
    }

    /// Trades where `user` is offerer or wanter, oldest id first.
    pub fn trades_involving(&mut self, user: UserId) -> Vec<Trade> {
        self.observe(DocKey::TradesOf(user));
        overlay(&self.snapshot.trades, &self.trades)
            .into_values()
            .filter(|t| t.involves(user))
            .cloned()
            .collect()
    }

    /// Pending trades created by `user`.
    pub fn pending_trades_of(&mut self, user: UserId) -> Vec<Trade> {
        self.trades_involving(user)
            .into_iter()
            .filter(|t| t.is_pending() && t.offerer == user)
            .collect()
    }

    // -----------------------------------------------------------------
    // Supply ledger
    // -----------------------------------------------------------------

    /// Copies of `item` the ledger says exist.
    pub fn supply(&mut self, item: ItemId) -> u64 {
        self.observe(DocKey::Supply(item));
        match self.supply.get(&item) {
            Some(staged) => *staged,
            None => self.snapshot.supply.get(&item).copied().unwrap_or(0),
        }
    }

    pub fn set_supply(&mut self, item: ItemId, copies: u64) {
        self.observe(DocKey::Supply(item));
        self.supply.insert(item, copies);
    }

    /// Every ledger entry with a non-zero count, in item order.
    pub fn supply_entries(&mut self) -> BTreeMap<ItemId, u64> {
        self.observe(DocKey::Supplies);
        let mut entries = self.snapshot.supply.clone();
        entries.extend(self.supply.iter().map(|(id, n)| (*id, *n)));
        entries.retain(|_, n| *n > 0);
        entries
    }

    // -----------------------------------------------------------------
    // Idempotency records
    // -----------------------------------------------------------------

    pub fn idempotency(&mut self, user: UserId, key: &IdempotencyKey) -> Option<IdempotencyRecord> {
        self.observe(DocKey::Idempotency(user, key.clone()));
        self.idempotency
            .iter()
            .rev()
            .find(|r| r.user == user && r.key == *key)
            .cloned()
            .or_else(|| self.snapshot.idempotency.get(&(user, key.clone())).cloned())
    }

    pub fn put_idempotency(&mut self, record: IdempotencyRecord) {
        self.observe(DocKey::Idempotency(record.user, record.key.clone()));
        self.idempotency.push(record);
    }

    // -----------------------------------------------------------------
    // Commit support
    // -----------------------------------------------------------------

    /// A key whose committed version moved since this transaction read it.
    #[must_use]
    pub fn stale_key(&self, latest: &StoreState) -> Option<&DocKey> {
        self.reads
            .iter()
            .find(|(key, seen)| latest.version(key) != **seen)
            .map(|(key, _)| key)
    }

    /// Apply the staged writes to `state` at the next sequence number.
    ///
    /// Returns the number of documents written.
    pub(crate) fn apply(self, state: &mut StoreState, retention: Retention) -> usize {
        state.sequence += 1;
        let mut written = 0;
        let mut departed: Vec<UserId> = Vec::new();

        if !self.users.is_empty() {
            state.bump(DocKey::Users);
        }
        for (id, user) in self.users {
            match user {
                Some(user) => {
                    state.users.insert(id, user);
                    state.bump(DocKey::User(id));
                }
                None => {
                    state.users.remove(&id);
                    state.retire(DocKey::User(id));
                    departed.push(id);
                }
            }
            written += 1;
        }

        if !self.albums.is_empty() {
            state.bump(DocKey::Albums);
        }
        for (owner, album) in self.albums {
            match album {
                Some(album) => {
                    state.albums.insert(owner, album);
                    state.bump(DocKey::Album(owner));
                }
                None => {
                    state.albums.remove(&owner);
                    state.retire(DocKey::Album(owner));
                }
            }
            written += 1;
        }

        if !self.trades.is_empty() {
            state.bump(DocKey::Trades);
        }
        for (id, trade) in self.trades {
            // Both the old and the new parties see their trade list change.
            let mut parties: Vec<UserId> = Vec::with_capacity(4);
            for t in state.trades.get(&id).into_iter().chain(trade.as_ref()) {
                parties.push(t.offerer);
                parties.extend(t.wanter);
            }
            for party in parties {
                state.bump(DocKey::TradesOf(party));
            }
            match trade {
                Some(trade) => {
                    state.trades.insert(id, trade);
                    state.bump(DocKey::Trade(id));
                }
                None => {
                    state.trades.remove(&id);
                    state.retire(DocKey::Trade(id));
                }
            }
            written += 1;
        }
        for id in departed {
            state.retire(DocKey::TradesOf(id));
        }

        if !self.supply.is_empty() {
            state.bump(DocKey::Supplies);
        }
        for (item, copies) in self.supply {
            if copies == 0 {
                state.supply.remove(&item);
                state.retire(DocKey::Supply(item));
            } else {
                state.supply.insert(item, copies);
                state.bump(DocKey::Supply(item));
            }
            written += 1;
        }

        for record in self.idempotency {
            state.remember(record, retention.idempotency);
            written += 1;
        }

        state.prune_tombstones(retention.tombstones);
        written
    }
}
