//! # cardex-store
//!
//! **The Collection Store: users, albums, trades, the supply ledger and
//! idempotency records behind one transactional interface.**
//!
//! ## Concurrency model
//!
//! ```text
//!  begin() ──▶ Transaction (Arc snapshot + read set + staged writes)
//!                 │ reads: snapshot, overlaid with own writes
//!                 │ writes: staged only
//!                 ▼
//!  commit(tx) ──▶ validate read set against latest versions
//!                 ├─ stale ──▶ TransactionConflict, nothing applied
//!                 └─ fresh ──▶ apply, persist, publish
//! ```
//!
//! Every document and every scanned collection carries a version. A
//! transaction records the version of everything it reads (and everything
//! it writes); commit rejects it if any of those versions moved. This gives
//! snapshot isolation without write skew on the documents a transaction
//! actually looked at, which is what stops two concurrent packet purchases
//! from both passing the balance check.
//!
//! Removed documents keep their version for a while so readers of them
//! still conflict. The oldest removals are then folded into one
//! store-wide floor that every unversioned key reports, which keeps the
//! version map proportional to the live data.
//!
//! [`run_transaction`] re-runs a closure on a fresh snapshot after a
//! conflict, up to the configured number of attempts.

pub mod memory;
pub mod retry;
pub mod state;
pub mod transaction;

pub use memory::MemoryStore;
pub use retry::{RetryPolicy, run_transaction};
pub use state::{DocKey, StoreState};
pub use transaction::{CommitReceipt, Transaction};

use cardex_types::Result;

/// A transactional document store.
///
/// Implementations must make `commit` all-or-nothing: either every staged
/// write of the transaction becomes visible, or none does.
pub trait CollectionStore: Send + Sync + 'static {
    /// Open a transaction on a consistent snapshot.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the store cannot be reached.
    fn begin(&self) -> Result<Transaction>;

    /// Validate and apply a transaction.
    ///
    /// # Errors
    /// Returns `TransactionConflict` if a document read by the transaction
    /// changed since its snapshot, `StorageUnavailable` if the commit could
    /// not be made durable.
    fn commit(&self, tx: Transaction) -> Result<CommitReceipt>;
}
