//! Conflict retry around a transaction body.

use cardex_types::{CardexError, MarketConfig, Result, constants};

use crate::{CollectionStore, Transaction};

/// How often a conflicting transaction is re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(config.commit_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(constants::DEFAULT_COMMIT_ATTEMPTS)
    }
}

/// Run `body` in a transaction and commit it, retrying on conflict.
///
/// `body` is re-run from scratch on a fresh snapshot after every conflict,
/// so it must not have side effects outside the transaction. An error
/// returned by `body` aborts immediately: nothing is committed and there
/// is no retry.
///
/// # Errors
/// Whatever `body` returns; `TransactionConflict` once the attempts are
/// exhausted; `StorageUnavailable` from the store.
pub fn run_transaction<S, T, F>(store: &S, policy: RetryPolicy, mut body: F) -> Result<T>
where
    S: CollectionStore + ?Sized,
    F: FnMut(&mut Transaction) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        let mut tx = store.begin()?;
        let value = body(&mut tx)?;
        match store.commit(tx) {
            Ok(_) => return Ok(value),
            Err(CardexError::TransactionConflict { .. }) if attempt < policy.max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    "Transaction conflict, retrying"
                );
                attempt += 1;
            }
            Err(CardexError::TransactionConflict { .. }) => {
                tracing::warn!(attempts = attempt, "Transaction conflict, giving up");
                return Err(CardexError::TransactionConflict { attempts: attempt });
            }
            Err(err) => return Err(err),
        }
    }
}
