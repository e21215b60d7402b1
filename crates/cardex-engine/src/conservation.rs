//! Conservation of items.
//!
//! Invariant enforced on every trade operation and checked by the audit:
//! ```text
//! ∀ item: Σ(album copies) + Σ(pending offers) == granted - retired
//! ```
//! Packets grant copies; sales and account deletion retire them. Trades
//! only move copies between albums and escrow, so a trade operation must
//! leave the census of the documents it touched unchanged. If it does not,
//! the operation aborts with `InvariantViolation`; nothing is repaired.

use std::collections::{BTreeMap, BTreeSet};

use cardex_store::{CollectionStore, Transaction};
use cardex_types::{Album, CardexError, ItemId, Result, Trade};
use serde::Serialize;

/// Occurrence count per item id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Census {
    counts: BTreeMap<ItemId, u64>,
}

impl Census {
    /// Census of the given albums plus the offers of those trades that are
    /// still pending. Matched trades hold nothing.
    #[must_use]
    pub fn of(albums: &[&Album], trades: &[&Trade]) -> Self {
        let mut census = Self::default();
        for album in albums {
            census.add(&album.items);
        }
        for trade in trades.iter().filter(|t| t.is_pending()) {
            census.add(&trade.offers);
        }
        census
    }

    pub fn add<'a>(&mut self, items: impl IntoIterator<Item = &'a ItemId>) {
        for item in items {
            *self.counts.entry(*item).or_insert(0) += 1;
        }
    }

    #[must_use]
    pub fn count(&self, item: ItemId) -> u64 {
        self.counts.get(&item).copied().unwrap_or(0)
    }

    /// Total occurrences across all items.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Items whose counts differ, as `(item, self, other)`.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<(ItemId, u64, u64)> {
        let mut items: Vec<ItemId> = self.counts.keys().chain(other.counts.keys()).copied().collect();
        items.sort_unstable();
        items.dedup();
        items
            .into_iter()
            .filter_map(|item| {
                let (a, b) = (self.count(item), other.count(item));
                (a != b).then_some((item, a, b))
            })
            .collect()
    }
}

/// Fail `operation` if the census moved.
///
/// # Errors
/// Returns `InvariantViolation` naming the first diverging item.
pub fn ensure_conserved(operation: &str, before: &Census, after: &Census) -> Result<()> {
    let diff = before.diff(after);
    let Some(&(item, was, now)) = diff.first() else {
        return Ok(());
    };
    tracing::error!(
        operation,
        %item,
        before = was,
        after = now,
        diverging = diff.len(),
        "Conservation violated, aborting operation"
    );
    Err(CardexError::InvariantViolation {
        reason: format!("{operation}: item {item} count {was} -> {now}"),
    })
}

/// Record newly granted copies in the supply ledger.
pub(crate) fn grant<'a>(tx: &mut Transaction, items: impl IntoIterator<Item = &'a ItemId>) {
    for item in items {
        let copies = tx.supply(*item);
        tx.set_supply(*item, copies + 1);
    }
}

/// Remove retired copies from the supply ledger.
///
/// # Errors
/// Returns `InvariantViolation` if the ledger holds fewer copies than are
/// being retired.
pub(crate) fn retire<'a>(
    tx: &mut Transaction,
    operation: &str,
    items: impl IntoIterator<Item = &'a ItemId>,
) -> Result<()> {
    for item in items {
        let copies = tx.supply(*item);
        let Some(left) = copies.checked_sub(1) else {
            tracing::error!(operation, %item, "Retiring a copy the ledger never granted");
            return Err(CardexError::InvariantViolation {
                reason: format!("{operation}: ledger has no copy of {item} to retire"),
            });
        };
        tx.set_supply(*item, left);
    }
    Ok(())
}

/// One item whose census disagrees with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub item: ItemId,
    pub ledger: u64,
    pub census: u64,
}

/// Result of a full conservation audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub items_checked: usize,
    pub copies: u64,
    pub discrepancies: Vec<Discrepancy>,
}

impl AuditReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Compare a full census of the store against the supply ledger.
///
/// Runs on one consistent snapshot.
///
/// # Errors
/// Returns `StorageUnavailable` if the snapshot cannot be opened.
pub fn audit<S: CollectionStore + ?Sized>(store: &S) -> Result<AuditReport> {
    let mut tx = store.begin()?;
    let albums = tx.all_albums();
    let pending = tx.pending_trades();
    let ledger = tx.supply_entries();

    let album_refs: Vec<&Album> = albums.iter().collect();
    let trade_refs: Vec<&Trade> = pending.iter().collect();
    let census = Census::of(&album_refs, &trade_refs);
    let expected = Census {
        counts: ledger,
    };

    let discrepancies: Vec<Discrepancy> = expected
        .diff(&census)
        .into_iter()
        .map(|(item, ledger, census)| Discrepancy {
            item,
            ledger,
            census,
        })
        .collect();

    let report = AuditReport {
        items_checked: census
            .counts
            .keys()
            .chain(expected.counts.keys())
            .collect::<BTreeSet<_>>()
            .len(),
        copies: census.total(),
        discrepancies,
    };
    if report.is_clean() {
        tracing::info!(
            items = report.items_checked,
            copies = report.copies,
            "Conservation audit clean"
        );
    } else {
        tracing::error!(
            discrepancies = report.discrepancies.len(),
            "Conservation audit found discrepancies"
        );
    }
    Ok(report)
}
