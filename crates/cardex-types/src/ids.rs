//! Identifiers used throughout Cardex.
//!
//! Users and trades use UUIDv7 for time-ordered sorting. Catalog items keep
//! the integer id assigned by the upstream content provider.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CardexError, Result, constants};

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Unique identifier for a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Fixed id for fixtures that need stable fingerprints.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TradeId
// ---------------------------------------------------------------------------

/// Globally unique trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TradeId(pub Uuid);

impl TradeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// Catalog item identifier, as assigned by the upstream catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// IdempotencyKey
// ---------------------------------------------------------------------------

/// Client-chosen key that makes a retried request safe to replay.
///
/// 1 to [`constants::MAX_IDEMPOTENCY_KEY_LEN`] printable ASCII characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate and wrap a raw key.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the key is empty, too long, or contains
    /// non-printable characters.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > constants::MAX_IDEMPOTENCY_KEY_LEN {
            return Err(CardexError::InvalidRequest {
                reason: format!(
                    "idempotency key must be 1..={} characters",
                    constants::MAX_IDEMPOTENCY_KEY_LEN
                ),
            });
        }
        if !raw.chars().all(|c| c.is_ascii_graphic()) {
            return Err(CardexError::InvalidRequest {
                reason: "idempotency key must be printable ASCII".to_string(),
            });
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = CardexError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(raw)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_uniqueness() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn trade_id_ordering() {
        let a = TradeId::new();
        let b = TradeId::new();
        assert!(a < b);
    }

    #[test]
    fn item_id_is_transparent_in_json() {
        let json = serde_json::to_string(&ItemId(1011334)).unwrap();
        assert_eq!(json, "1011334");
        let back: ItemId = serde_json::from_str("42").unwrap();
        assert_eq!(back, ItemId(42));
    }

    #[test]
    fn idempotency_key_validation() {
        assert!(IdempotencyKey::parse("req-123").is_ok());
        assert!(IdempotencyKey::parse("").is_err());
        assert!(IdempotencyKey::parse("has space").is_err());
        assert!(IdempotencyKey::parse("x".repeat(constants::MAX_IDEMPOTENCY_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn idempotency_key_rejects_bad_json() {
        let err = serde_json::from_str::<IdempotencyKey>("\"\"");
        assert!(err.is_err());
        let ok: IdempotencyKey = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(ok.as_str(), "abc");
    }
}
