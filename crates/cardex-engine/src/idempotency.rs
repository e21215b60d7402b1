//! Client idempotency keys for `GeneratePacket` and `CreateTrade`.
//!
//! The record is read and written inside the operation's own transaction:
//!
//! ```text
//! record absent              ──▶ run operation, store outcome with the key
//! record present, same print ──▶ return stored outcome, no side effects
//! record present, other print──▶ IdempotencyKeyReused
//! ```
//!
//! The fingerprint binds the key to the operation, the user and the
//! payload, so a key cannot be replayed against a different request.

use std::collections::BTreeSet;

use cardex_store::Transaction;
use cardex_types::{
    CardexError, IdempotencyKey, IdempotencyRecord, ItemId, Operation, Outcome, Result, UserId,
};
use chrono::Utc;
use sha2::{Digest, Sha256};

/// Hex sha-256 over operation, user and the ordered payload sets.
#[must_use]
pub fn fingerprint(operation: Operation, user: UserId, payload: &[&BTreeSet<ItemId>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"cardex:idem:v1:");
    hasher.update(operation.tag().as_bytes());
    hasher.update(user.0.as_bytes());
    for set in payload {
        hasher.update((set.len() as u64).to_le_bytes());
        for item in *set {
            hasher.update(item.0.to_le_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// A key bound to one request.
#[derive(Debug, Clone)]
pub(crate) struct KeyedRequest<'a> {
    pub key: &'a IdempotencyKey,
    pub user: UserId,
    pub operation: Operation,
    pub fingerprint: String,
}

impl<'a> KeyedRequest<'a> {
    pub fn new(
        key: &'a IdempotencyKey,
        user: UserId,
        operation: Operation,
        payload: &[&BTreeSet<ItemId>],
    ) -> Self {
        Self {
            key,
            user,
            operation,
            fingerprint: fingerprint(operation, user, payload),
        }
    }

    /// The stored outcome if this exact request already committed.
    pub fn replay(&self, tx: &mut Transaction) -> Result<Option<Outcome>> {
        let Some(record) = tx.idempotency(self.user, self.key) else {
            return Ok(None);
        };
        if record.operation != self.operation || record.fingerprint != self.fingerprint {
            return Err(CardexError::IdempotencyKeyReused {
                key: self.key.as_str().to_string(),
            });
        }
        tracing::debug!(
            user = %self.user,
            key = self.key.as_str(),
            operation = self.operation.tag(),
            "Idempotent replay"
        );
        Ok(Some(record.outcome))
    }

    /// Stage the record alongside the operation's effects.
    pub fn record(&self, tx: &mut Transaction, outcome: Outcome) {
        tx.put_idempotency(IdempotencyRecord {
            key: self.key.clone(),
            user: self.user,
            operation: self.operation,
            fingerprint: self.fingerprint.clone(),
            outcome,
            recorded_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cardex_store::StoreState;

    use super::*;

    fn set(raw: &[u64]) -> BTreeSet<ItemId> {
        raw.iter().copied().map(ItemId).collect()
    }

    #[test]
    fn fingerprint_is_stable_and_payload_sensitive() {
        let user = UserId::from_bytes([1; 16]);
        let a = fingerprint(Operation::CreateTrade, user, &[&set(&[1, 2]), &set(&[3])]);
        let b = fingerprint(Operation::CreateTrade, user, &[&set(&[2, 1]), &set(&[3])]);
        let c = fingerprint(Operation::CreateTrade, user, &[&set(&[1]), &set(&[2, 3])]);
        assert_eq!(a, b);
        assert_ne!(a, c, "set boundaries are part of the fingerprint");
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_binds_user_and_operation() {
        let a = fingerprint(Operation::GeneratePacket, UserId::from_bytes([1; 16]), &[]);
        let b = fingerprint(Operation::GeneratePacket, UserId::from_bytes([2; 16]), &[]);
        let c = fingerprint(Operation::CreateTrade, UserId::from_bytes([1; 16]), &[]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn replay_after_record() {
        let key = IdempotencyKey::parse("req-1").unwrap();
        let user = UserId::new();
        let request = KeyedRequest::new(&key, user, Operation::GeneratePacket, &[]);
        let mut tx = Transaction::new(Arc::new(StoreState::default()));

        assert!(request.replay(&mut tx).unwrap().is_none());
        request.record(&mut tx, Outcome::Packet(vec![ItemId(4)]));
        assert_eq!(
            request.replay(&mut tx).unwrap(),
            Some(Outcome::Packet(vec![ItemId(4)]))
        );
    }

    #[test]
    fn different_payload_under_same_key_is_rejected() {
        let key = IdempotencyKey::parse("req-2").unwrap();
        let user = UserId::new();
        let offers = set(&[1]);
        let first = KeyedRequest::new(&key, user, Operation::CreateTrade, &[&offers, &set(&[2])]);
        let second = KeyedRequest::new(&key, user, Operation::CreateTrade, &[&offers, &set(&[3])]);
        let mut tx = Transaction::new(Arc::new(StoreState::default()));

        first.record(&mut tx, Outcome::Packet(vec![]));
        let err = second.replay(&mut tx).unwrap_err();
        assert!(matches!(err, CardexError::IdempotencyKeyReused { .. }));
    }
}
