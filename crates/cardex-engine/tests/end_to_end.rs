//! End-to-end scenarios across catalog, store and engine.
//!
//! These tests drive the public operations the routing layer uses and
//! check the marketplace-wide guarantees: exact-complement matching,
//! escrow, packet exclusivity and atomicity, and conservation of items.

use std::{collections::BTreeSet, sync::Arc};

use cardex_catalog::{CatalogHandle, CatalogSnapshot, StaticSource};
use cardex_engine::{
    Accounts, EngineContext, Marketplace, PacketGenerator, Registration, TradeEngine, audit,
};
use cardex_store::{CollectionStore, MemoryStore};
use cardex_types::*;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

fn set(raw: &[u64]) -> BTreeSet<ItemId> {
    raw.iter().copied().map(ItemId).collect()
}

fn catalog(n: u64) -> CatalogHandle {
    CatalogHandle::with_snapshot(CatalogSnapshot::from_entries(
        (1..=n).map(|id| CatalogEntry::dummy(id, id % 7)).collect(),
    ))
}

/// Grant cards to a user the way a packet would, bypassing randomness.
fn give(store: &MemoryStore, user: UserId, raw: &[u64]) {
    let mut tx = store.begin().unwrap();
    let mut album = tx.album(user).unwrap();
    for id in set(raw) {
        album.items.insert(id);
        let copies = tx.supply(id);
        tx.set_supply(id, copies + 1);
    }
    tx.put_album(album);
    store.commit(tx).unwrap();
}

fn album_of(store: &MemoryStore, user: UserId) -> BTreeSet<ItemId> {
    store.begin().unwrap().album(user).unwrap().items
}

async fn market_with_users(
    n_items: u64,
    nicknames: &[&str],
) -> (Marketplace<MemoryStore>, Arc<MemoryStore>, Vec<UserId>) {
    let store = Arc::new(MemoryStore::default());
    let market =
        Marketplace::with_catalog(Arc::clone(&store), catalog(n_items), MarketConfig::default())
            .unwrap();
    let mut users = Vec::new();
    for nick in nicknames {
        let id = market
            .register(Registration {
                nickname: (*nick).to_string(),
                email: format!("{nick}@example.com"),
                password_hash: "argon2$x".into(),
            })
            .await
            .unwrap();
        users.push(id);
    }
    (market, store, users)
}

// =========================================================================
// Matching
// =========================================================================

#[tokio::test]
async fn complementary_trades_match_on_creation() {
    let (market, store, users) = market_with_users(10, &["alice", "bobby", "carol"]).await;
    let (a, b, c) = (users[0], users[1], users[2]);
    give(&store, a, &[1, 2]);
    give(&store, b, &[3]);
    give(&store, c, &[4]);

    let ta = market.create_trade(a, set(&[1, 2]), set(&[3]), None).await.unwrap();
    let tb = market.create_trade(b, set(&[3]), set(&[1, 2]), None).await.unwrap();

    assert_eq!(album_of(&store, a), set(&[3]));
    assert_eq!(album_of(&store, b), set(&[1, 2]));
    assert_eq!(album_of(&store, c), set(&[4]), "bystander untouched");

    let views = market.list_trades(a).await.unwrap();
    assert_eq!(views.len(), 2, "offerer of one, wanter of the other");
    for view in &views {
        assert_eq!(view.trade.state, TradeState::Matched);
    }
    let mut tx = store.begin().unwrap();
    assert_eq!(tx.trade(ta).unwrap().wanter, Some(b));
    assert_eq!(tx.trade(tb).unwrap().wanter, Some(a));

    assert!(market.audit().await.unwrap().is_clean());
}

#[tokio::test]
async fn matched_trades_are_read_only() {
    let (market, store, users) = market_with_users(10, &["alice", "bobby"]).await;
    let (a, b) = (users[0], users[1]);
    give(&store, a, &[1]);
    give(&store, b, &[2]);
    let ta = market.create_trade(a, set(&[1]), set(&[2]), None).await.unwrap();
    market.create_trade(b, set(&[2]), set(&[1]), None).await.unwrap();

    let err = market.delete_trade(a, ta).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyMatched);
    let err = market.delete_trade(b, ta).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = market.delete_trade(a, TradeId::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn non_complements_stay_pending_until_one_arrives() {
    let (market, store, users) = market_with_users(10, &["alice", "bobby", "carol"]).await;
    let (a, b, c) = (users[0], users[1], users[2]);
    give(&store, a, &[1, 2]);
    give(&store, b, &[3]);
    give(&store, c, &[3]);

    market.create_trade(a, set(&[1, 2]), set(&[3]), None).await.unwrap();
    // Offers the right card but wants only part of A's offer.
    market.create_trade(b, set(&[3]), set(&[1]), None).await.unwrap();
    assert_eq!(store.begin().unwrap().pending_trades().len(), 2);

    market.create_trade(c, set(&[3]), set(&[1, 2]), None).await.unwrap();
    let mut tx = store.begin().unwrap();
    let pending = tx.pending_trades();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].offerer, b);
    assert_eq!(album_of(&store, c), set(&[1, 2]));
}

// =========================================================================
// Escrow
// =========================================================================

#[tokio::test]
async fn escrow_hides_offers_until_delete() {
    let (market, store, users) = market_with_users(10, &["alice"]).await;
    let a = users[0];
    give(&store, a, &[1, 2, 3]);

    let id = market.create_trade(a, set(&[1, 3]), set(&[5]), None).await.unwrap();
    assert_eq!(market.album(a).await.unwrap(), vec![ItemId(2)]);

    // Escrowed cards cannot be sold.
    let err = market.sell_items(a, vec![ItemId(1)]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOwned);

    market.delete_trade(a, id).await.unwrap();
    assert_eq!(
        market.album(a).await.unwrap(),
        vec![ItemId(1), ItemId(2), ItemId(3)]
    );
    assert!(market.list_trades(a).await.unwrap().is_empty());
    assert!(market.audit().await.unwrap().is_clean());
}

// =========================================================================
// Packets
// =========================================================================

#[tokio::test]
async fn packets_exhaust_the_catalog_then_fail_cleanly() {
    let (market, _store, users) = market_with_users(12, &["alice"]).await;
    let a = users[0];
    market.redeem_coins(a, 10).await.unwrap();

    let mut seen = BTreeSet::new();
    for expected in [5, 5, 2] {
        let drawn = market.generate_packet(a, None).await.unwrap();
        assert_eq!(drawn.len(), expected);
        for id in drawn {
            assert!(seen.insert(id), "{id} drawn twice");
        }
    }
    let before = market.user(a).await.unwrap();
    let err = market.generate_packet(a, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CollectionExhausted);
    assert_eq!(market.user(a).await.unwrap(), before);
    assert_eq!(market.album(a).await.unwrap().len(), 12);
}

#[test]
fn packet_exclusivity_over_random_histories() {
    let store = Arc::new(MemoryStore::default());
    let ctx = EngineContext::new(Arc::clone(&store), catalog(40), MarketConfig::default());
    let packets = PacketGenerator::with_seed(ctx.clone(), 11);
    let trades = TradeEngine::new(ctx.clone());
    let accounts = Accounts::new(ctx);
    let mut rng = StdRng::seed_from_u64(0xE5C);

    let users: Vec<UserId> = ["alice", "bobby", "carol"]
        .iter()
        .map(|nick| {
            let id = accounts
                .register(&Registration {
                    nickname: (*nick).into(),
                    email: format!("{nick}@example.com"),
                    password_hash: "h".into(),
                })
                .unwrap();
            accounts.redeem_coins(id, 50).unwrap();
            id
        })
        .collect();

    for _ in 0..60 {
        let user = users[rng.gen_range(0..users.len())];
        let mut tx = store.begin().unwrap();
        let owned = tx.album(user).unwrap().items;
        let escrowed: BTreeSet<ItemId> = tx
            .pending_trades_of(user)
            .iter()
            .flat_map(Trade::locked_items)
            .collect();
        drop(tx);

        if rng.gen_bool(0.3) && !owned.is_empty() {
            let offer = *owned.iter().next().unwrap();
            let want = ItemId(rng.gen_range(1..=40));
            // Precondition failures are fine here; only successful packets matter.
            let _ = trades.create(user, [offer].into(), [want].into(), None);
            continue;
        }

        match packets.generate(user, None) {
            Ok(drawn) => {
                for id in &drawn {
                    assert!(!owned.contains(id), "{id} was already owned");
                    assert!(!escrowed.contains(id), "{id} was escrowed");
                }
            }
            Err(err) => assert_eq!(err.kind(), ErrorKind::CollectionExhausted),
        }
    }
    assert!(audit(store.as_ref()).unwrap().is_clean());
}

// =========================================================================
// Conservation
// =========================================================================

#[test]
fn conservation_over_random_operation_sequences() {
    for seed in 0..8 {
        let store = Arc::new(MemoryStore::default());
        let ctx = EngineContext::new(Arc::clone(&store), catalog(15), MarketConfig::default());
        let packets = PacketGenerator::with_seed(ctx.clone(), seed);
        let trades = TradeEngine::new(ctx.clone());
        let accounts = Accounts::new(ctx);
        let mut rng = StdRng::seed_from_u64(seed);

        let users: Vec<UserId> = (0..4)
            .map(|i| {
                let id = accounts
                    .register(&Registration {
                        nickname: format!("user{i}"),
                        email: format!("user{i}@example.com"),
                        password_hash: "h".into(),
                    })
                    .unwrap();
                accounts.redeem_coins(id, 20).unwrap();
                id
            })
            .collect();

        let mut copies = 0_u64;
        for _ in 0..120 {
            let user = users[rng.gen_range(0..users.len())];
            let owned: Vec<ItemId> = accounts.album(user).unwrap();
            let granted = match rng.gen_range(0..10) {
                0..=3 => packets.generate(user, None).map(|d| d.len() as u64).unwrap_or(0),
                4..=6 if !owned.is_empty() => {
                    let offer = *owned.choose(&mut rng).unwrap();
                    let want = ItemId(rng.gen_range(1..=15));
                    let _ = trades.create(user, [offer].into(), [want].into(), None);
                    0
                }
                7 => {
                    let mine: Vec<TradeId> = trades
                        .list(user)
                        .unwrap()
                        .into_iter()
                        .filter(|v| v.trade.is_pending() && v.trade.offerer == user)
                        .map(|v| v.trade.id)
                        .collect();
                    if let Some(id) = mine.choose(&mut rng) {
                        trades.delete(user, *id).unwrap();
                    }
                    0
                }
                _ => {
                    trades.sweep().unwrap();
                    0
                }
            };

            copies += granted;
            let report = audit(store.as_ref()).unwrap();
            assert!(report.is_clean(), "seed {seed}: {:?}", report.discrepancies);
            assert_eq!(report.copies, copies, "seed {seed}: copies appeared or vanished");
        }
    }
}

#[tokio::test]
async fn sales_and_account_deletion_retire_copies() {
    let (market, store, users) = market_with_users(10, &["alice", "bobby"]).await;
    let (a, b) = (users[0], users[1]);
    give(&store, a, &[1, 2, 3]);
    give(&store, b, &[4]);
    market.create_trade(a, set(&[3]), set(&[9]), None).await.unwrap();

    assert_eq!(market.sell_items(a, vec![ItemId(1)]).await.unwrap(), 1);
    let removal = market.delete_account(a).await.unwrap();
    assert_eq!(removal.cards_retired, 2);

    let report = market.audit().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.copies, 1);
}

// =========================================================================
// Idempotency
// =========================================================================

#[tokio::test]
async fn retried_requests_do_not_duplicate_effects() {
    let (market, store, users) = market_with_users(20, &["alice"]).await;
    let a = users[0];
    market.redeem_coins(a, 3).await.unwrap();
    let key = IdempotencyKey::parse("packet-7f3a").unwrap();

    let first = market.generate_packet(a, Some(key.clone())).await.unwrap();
    let retry = market.generate_packet(a, Some(key)).await.unwrap();
    assert_eq!(first, retry);
    assert_eq!(market.user(a).await.unwrap().balance, 2);

    let offer = first[0];
    let want = (1..=20).map(ItemId).find(|id| !first.contains(id)).unwrap();
    let trade_key = IdempotencyKey::parse("trade-01").unwrap();
    let t1 = market
        .create_trade(a, [offer].into(), [want].into(), Some(trade_key.clone()))
        .await
        .unwrap();
    let t2 = market
        .create_trade(a, [offer].into(), [want].into(), Some(trade_key))
        .await
        .unwrap();
    assert_eq!(t1, t2);
    assert_eq!(store.begin().unwrap().pending_trades().len(), 1);
}

// =========================================================================
// Catalog
// =========================================================================

#[tokio::test]
async fn two_card_rarity_arithmetic_through_the_loader() {
    let dir = tempfile::tempdir().unwrap();
    let config = MarketConfig {
        catalog_snapshot_path: dir.path().join("catalog.json"),
        ..MarketConfig::default()
    };
    let market = Marketplace::new(Arc::new(MemoryStore::default()), config).unwrap();
    let source = Arc::new(StaticSource::new(vec![
        CatalogEntry::dummy(1, 10),
        CatalogEntry::dummy(2, 0),
    ]));
    market.spawn_catalog_load(source).await.unwrap().unwrap();

    let snapshot = market.catalog().current().unwrap();
    let popular = snapshot.get(ItemId(1)).unwrap();
    let obscure = snapshot.get(ItemId(2)).unwrap();
    assert!((popular.probability - 1.0 / 12.0).abs() < 1e-9);
    assert!((obscure.probability - 11.0 / 12.0).abs() < 1e-9);
    assert_eq!(obscure.rarity_tier, RarityTier::Common);
    assert_eq!(popular.rarity_tier, RarityTier::Epic);
}

#[tokio::test]
async fn durable_store_keeps_trades_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = MarketConfig {
        store_path: Some(dir.path().join("store.json")),
        catalog_snapshot_path: dir.path().join("catalog.json"),
        ..MarketConfig::default()
    };

    let (a, trade) = {
        let store = Arc::new(MemoryStore::from_config(&config).unwrap());
        let market =
            Marketplace::with_catalog(Arc::clone(&store), catalog(10), config.clone()).unwrap();
        let a = market
            .register(Registration {
                nickname: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: "h".into(),
            })
            .await
            .unwrap();
        give(&store, a, &[1]);
        let trade = market.create_trade(a, set(&[1]), set(&[2]), None).await.unwrap();
        (a, trade)
    };

    let store = Arc::new(MemoryStore::from_config(&config).unwrap());
    let market = Marketplace::with_catalog(store, catalog(10), config).unwrap();
    let views = market.list_trades(a).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].trade.id, trade);
    assert!(market.album(a).await.unwrap().is_empty());
    assert!(market.audit().await.unwrap().is_clean());
}
