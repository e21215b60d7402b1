//! System-wide constants for the Cardex marketplace engine.

/// Number of cards drawn per packet.
pub const PACKET_SIZE: usize = 5;

/// Price of one packet in coins.
pub const PACKET_PRICE: u32 = 1;

/// Coins credited for each card sold back.
pub const SELL_PRICE: u32 = 1;

/// Upper bound of any user balance.
pub const MAX_BALANCE: u32 = 99_999;

/// Number of rarity tiers.
pub const TIER_COUNT: usize = 5;

/// Default number of attempts for a conflicting store transaction.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 3;

/// Idempotency records retained by the store before evicting the oldest.
pub const DEFAULT_IDEMPOTENCY_RETENTION: usize = 10_000;

/// Versions of removed documents kept for conflict detection before the
/// oldest half is folded into the store-wide removal floor.
pub const DEFAULT_TOMBSTONE_RETENTION: usize = 1_024;

/// Maximum length of a client idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Default interval of the background match sweep (milliseconds).
pub const DEFAULT_MATCH_SWEEP_INTERVAL_MS: u64 = 30_000;

/// Minimum nickname length at registration.
pub const MIN_NICKNAME_LEN: usize = 3;

/// Default location of the on-disk catalog snapshot.
pub const DEFAULT_CATALOG_SNAPSHOT_PATH: &str = "/tmp/cardex-catalog.json";

/// Thumbnail paths the upstream catalog uses for "no image".
pub const PLACEHOLDER_THUMBNAILS: &[&str] = &[
    "image_not_available",
    "http://i.annihil.us/u/prod/marvel/i/mg/f/60/4c002e0305708",
];

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Cardex";
