//! # Concurrency & Atomicity Tests
//!
//! Operations race on the same documents from many threads; the store's
//! optimistic validation must keep every one of them all-or-nothing.
//!
//! | Attack / failure                  | Defence                                       |
//! |-----------------------------------|-----------------------------------------------|
//! | Parallel packets on one coin      | Balance read is validated at commit           |
//! | Parallel complementary trades     | Both trades re-read inside the match tx       |
//! | Storage fails mid-operation       | Nothing is published until persist succeeds   |
//! | Client retries after a timeout    | Idempotency record committed with the effect  |

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use cardex_catalog::{CatalogHandle, CatalogSnapshot};
use cardex_engine::{EngineContext, Marketplace, PacketGenerator, TradeEngine, audit};
use cardex_store::{CollectionStore, CommitReceipt, MemoryStore, Transaction};
use cardex_types::*;

fn catalog(n: u64) -> CatalogHandle {
    CatalogHandle::with_snapshot(CatalogSnapshot::from_entries(
        (1..=n).map(|id| CatalogEntry::dummy(id, id)).collect(),
    ))
}

fn seed_user<S: CollectionStore>(store: &S, balance: u32, owned: &[u64]) -> UserId {
    let user = User::dummy(balance);
    let id = user.id;
    let mut album = Album::new(id);
    album.add_all(&owned.iter().copied().map(ItemId).collect::<Vec<_>>());
    let mut tx = store.begin().unwrap();
    for item in &album.items {
        let copies = tx.supply(*item);
        tx.set_supply(*item, copies + 1);
    }
    tx.put_user(user);
    tx.put_album(album);
    store.commit(tx).unwrap();
    id
}

fn patient_config() -> MarketConfig {
    MarketConfig {
        commit_attempts: 64,
        ..MarketConfig::default()
    }
}

/// Store whose commits fail while `down` is set.
struct Flaky {
    inner: MemoryStore,
    down: AtomicBool,
}

impl CollectionStore for Flaky {
    fn begin(&self) -> Result<Transaction> {
        self.inner.begin()
    }

    fn commit(&self, tx: Transaction) -> Result<CommitReceipt> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CardexError::StorageUnavailable {
                reason: "connection reset".into(),
            });
        }
        self.inner.commit(tx)
    }
}

// =========================================================================
// Double spend
// =========================================================================

#[test]
fn parallel_packets_spend_the_last_coin_once() {
    let store = Arc::new(MemoryStore::default());
    let ctx = EngineContext::new(Arc::clone(&store), catalog(50), MarketConfig::default());
    let packets = PacketGenerator::with_seed(ctx, 3);
    let buyer = seed_user(store.as_ref(), 1, &[]);

    let results: Vec<Result<Vec<ItemId>>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| packets.generate(buyer, None)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one packet may be paid with one coin");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                err.kind(),
                ErrorKind::InsufficientBalance | ErrorKind::StorageUnavailable
            ),
            "unexpected failure: {err}"
        );
    }

    let mut tx = store.begin().unwrap();
    assert_eq!(tx.user(buyer).unwrap().balance, 0);
    assert_eq!(tx.album(buyer).unwrap().len(), 5);
    drop(tx);
    assert!(audit(store.as_ref()).unwrap().is_clean());
}

#[test]
fn parallel_buyers_all_get_disjoint_packets_and_ledger_holds() {
    let store = Arc::new(MemoryStore::default());
    let ctx = EngineContext::new(Arc::clone(&store), catalog(30), patient_config());
    let packets = PacketGenerator::with_seed(ctx, 5);
    let buyers: Vec<UserId> = (0..6).map(|_| seed_user(store.as_ref(), 4, &[])).collect();

    thread::scope(|s| {
        for buyer in &buyers {
            let packets = &packets;
            s.spawn(move || {
                for _ in 0..4 {
                    packets.generate(*buyer, None).unwrap();
                }
            });
        }
    });

    let mut tx = store.begin().unwrap();
    for buyer in &buyers {
        assert_eq!(tx.user(*buyer).unwrap().balance, 0);
        assert_eq!(tx.album(*buyer).unwrap().len(), 20);
    }
    drop(tx);
    let report = audit(store.as_ref()).unwrap();
    assert!(report.is_clean(), "{:?}", report.discrepancies);
    assert_eq!(report.copies, 6 * 20);
}

// =========================================================================
// Matching races
// =========================================================================

#[test]
fn complementary_trades_created_in_parallel_match_once() {
    for _ in 0..20 {
        let store = Arc::new(MemoryStore::default());
        let ctx = EngineContext::new(Arc::clone(&store), catalog(10), patient_config());
        let trades = TradeEngine::new(ctx);
        let a = seed_user(store.as_ref(), 0, &[1, 2]);
        let b = seed_user(store.as_ref(), 0, &[3]);

        let (ta, tb) = thread::scope(|s| {
            let ha = s.spawn(|| trades.create(a, set(&[1, 2]), set(&[3]), None));
            let hb = s.spawn(|| trades.create(b, set(&[3]), set(&[1, 2]), None));
            (ha.join().unwrap().unwrap(), hb.join().unwrap().unwrap())
        });
        // A match lost to contention is picked up by the sweep.
        trades.sweep().unwrap();

        let mut tx = store.begin().unwrap();
        let (ta, tb) = (tx.trade(ta).unwrap(), tx.trade(tb).unwrap());
        assert!(ta.is_matched() && tb.is_matched());
        assert_eq!(ta.wanter, Some(b));
        assert_eq!(tb.wanter, Some(a));
        assert_eq!(tx.album(a).unwrap().items, set(&[3]));
        assert_eq!(tx.album(b).unwrap().items, set(&[1, 2]));
        drop(tx);
        assert!(audit(store.as_ref()).unwrap().is_clean());
    }
}

#[test]
fn two_complements_racing_for_one_trade_only_one_wins() {
    let store = Arc::new(MemoryStore::default());
    let ctx = EngineContext::new(Arc::clone(&store), catalog(10), patient_config());
    let trades = TradeEngine::new(ctx);
    let a = seed_user(store.as_ref(), 0, &[1]);
    let b = seed_user(store.as_ref(), 0, &[2]);
    let c = seed_user(store.as_ref(), 0, &[2]);
    let ta = trades.create(a, set(&[1]), set(&[2]), None).unwrap();

    thread::scope(|s| {
        s.spawn(|| trades.create(b, set(&[2]), set(&[1]), None).unwrap());
        s.spawn(|| trades.create(c, set(&[2]), set(&[1]), None).unwrap());
    });
    trades.sweep().unwrap();

    let mut tx = store.begin().unwrap();
    assert!(tx.trade(ta).unwrap().is_matched());
    assert_eq!(tx.pending_trades().len(), 1, "the loser stays pending");
    let winners = [b, c]
        .into_iter()
        .filter(|u| tx.album(*u).unwrap().contains(ItemId(1)))
        .count();
    assert_eq!(winners, 1);
    drop(tx);
    assert!(audit(store.as_ref()).unwrap().is_clean());
}

// =========================================================================
// Storage failure
// =========================================================================

#[test]
fn storage_failure_leaves_no_partial_effect() {
    let store = Arc::new(Flaky {
        inner: MemoryStore::default(),
        down: AtomicBool::new(false),
    });
    let ctx = EngineContext::new(Arc::clone(&store), catalog(10), MarketConfig::default());
    let packets = PacketGenerator::with_seed(ctx.clone(), 9);
    let trades = TradeEngine::new(ctx);
    let buyer = seed_user(store.as_ref(), 3, &[1]);

    store.down.store(true, Ordering::SeqCst);
    let err = packets.generate(buyer, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert!(err.kind().is_retryable());
    let err = trades.create(buyer, set(&[1]), set(&[2]), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

    let mut tx = store.begin().unwrap();
    assert_eq!(tx.user(buyer).unwrap().balance, 3);
    assert_eq!(tx.album(buyer).unwrap().items, set(&[1]));
    assert!(tx.pending_trades().is_empty());
    drop(tx);

    store.down.store(false, Ordering::SeqCst);
    assert_eq!(packets.generate(buyer, None).unwrap().len(), 5);
    assert!(audit(store.as_ref()).unwrap().is_clean());
}

#[test]
fn persisted_store_rejects_commit_when_disk_write_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let store = Arc::new(MemoryStore::open(path.clone(), 16).unwrap());
    let ctx = EngineContext::new(Arc::clone(&store), catalog(10), MarketConfig::default());
    let packets = PacketGenerator::with_seed(ctx, 1);
    let buyer = seed_user(store.as_ref(), 1, &[]);

    // A directory where the store file should be makes the rename fail.
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let err = packets.generate(buyer, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    let mut tx = store.begin().unwrap();
    assert_eq!(tx.user(buyer).unwrap().balance, 1);
    assert!(tx.album(buyer).unwrap().is_empty());
}

// =========================================================================
// Client retries
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retries_with_one_key_buy_one_packet() {
    let store = Arc::new(MemoryStore::default());
    let market =
        Marketplace::with_catalog(Arc::clone(&store), catalog(40), patient_config()).unwrap();
    let buyer = seed_user(store.as_ref(), 5, &[]);
    let key = IdempotencyKey::parse("checkout-42").unwrap();

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let market = market.clone();
            let key = key.clone();
            tokio::spawn(async move { market.generate_packet(buyer, Some(key)).await })
        })
        .collect();

    let mut packets = Vec::new();
    for task in tasks {
        packets.push(task.await.unwrap().unwrap());
    }
    assert!(packets.windows(2).all(|w| w[0] == w[1]), "every retry sees one packet");
    assert_eq!(market.user(buyer).await.unwrap().balance, 4);
    assert_eq!(market.album(buyer).await.unwrap().len(), 5);
    assert!(market.audit().await.unwrap().is_clean());
}

fn set(raw: &[u64]) -> BTreeSet<ItemId> {
    raw.iter().copied().map(ItemId).collect()
}
