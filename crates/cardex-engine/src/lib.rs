//! # cardex-engine
//!
//! **The rarity & exchange engine.**
//!
//! ```text
//!                ┌──────────────┐
//!                │ CatalogHandle│ (immutable snapshot, NotReady until loaded)
//!                └──────┬───────┘
//!          ┌────────────┼─────────────┐
//!          ▼            ▼             ▼
//!  PacketGenerator  TradeEngine    Accounts
//!          │            │             │
//!          └────────────┼─────────────┘
//!                       ▼
//!               CollectionStore (one transaction per operation)
//! ```
//!
//! - [`PacketGenerator`]: draws distinct un-owned, non-escrowed cards and
//!   debits the buyer in one transaction.
//! - [`TradeEngine`]: create (escrow), match (exact complement), delete
//!   (return escrow), list.
//! - [`Accounts`]: registration, album reads, sales, coin redemption,
//!   favourite card, account deletion.
//! - [`conservation`]: per-operation census checks and the full audit
//!   against the supply ledger.
//! - [`Marketplace`]: the async facade the routing layer talks to.

pub mod accounts;
pub mod conservation;
pub mod context;
pub mod idempotency;
pub mod matching;
pub mod packets;
pub mod service;
pub mod trades;

pub use accounts::{AccountRemoval, Accounts, Registration};
pub use conservation::{AuditReport, Census, Discrepancy, audit};
pub use context::EngineContext;
pub use packets::{PacketGenerator, draw_distinct};
pub use service::Marketplace;
pub use trades::TradeEngine;
