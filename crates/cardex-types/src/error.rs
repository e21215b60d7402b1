//! Error types for the Cardex marketplace engine.
//!
//! All errors use the `CX_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (rejected before any store access)
//! - 2xx: Account / balance errors
//! - 3xx: Collection (album) errors
//! - 4xx: Trade errors
//! - 5xx: Catalog errors
//! - 6xx: Storage errors
//! - 8xx: Invariant violations
//! - 9xx: General / internal errors
//!
//! Every variant maps onto a stable [`ErrorKind`] that callers match on;
//! the `Display` text is the human-readable message.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ItemId, TradeId, UserId};

/// Central error enum for all Cardex operations.
#[derive(Debug, Error)]
pub enum CardexError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The request is malformed (missing fields, bad values, etc.).
    #[error("CX_ERR_100: Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// An idempotency key was replayed with a different payload.
    #[error("CX_ERR_101: Idempotency key {key} was already used for a different request")]
    IdempotencyKeyReused { key: String },

    /// The item id does not exist in the catalog.
    #[error("CX_ERR_102: Unknown catalog item: {0}")]
    UnknownItem(ItemId),

    /// Registration collided with an existing account.
    #[error("CX_ERR_103: {field} already in use")]
    AlreadyRegistered { field: String },

    /// The operation would push a balance past the configured cap.
    #[error("CX_ERR_104: Balance limit exceeded: {requested} > {limit}")]
    BalanceLimitExceeded { requested: u64, limit: u32 },

    // =================================================================
    // Account / Balance Errors (2xx)
    // =================================================================
    /// No user with this id.
    #[error("CX_ERR_200: User not found: {0}")]
    UserNotFound(UserId),

    /// Not enough coins to perform the operation.
    #[error("CX_ERR_201: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u32, available: u32 },

    // =================================================================
    // Collection Errors (3xx)
    // =================================================================
    /// Every catalog item is already owned or locked in a pending trade.
    #[error("CX_ERR_300: Collection exhausted: every card is owned or in a pending trade")]
    CollectionExhausted,

    /// The user does not own the item.
    #[error("CX_ERR_301: Item not owned: {0}")]
    NotOwned(ItemId),

    /// The user already owns the item.
    #[error("CX_ERR_302: Item already owned: {0}")]
    AlreadyOwned(ItemId),

    /// The user has no album.
    #[error("CX_ERR_303: Album not found for user {0}")]
    AlbumNotFound(UserId),

    // =================================================================
    // Trade Errors (4xx)
    // =================================================================
    /// The requested trade does not exist.
    #[error("CX_ERR_400: Trade not found: {0}")]
    TradeNotFound(TradeId),

    /// Another pending trade of the same user already wants this item.
    #[error("CX_ERR_401: Item {0} is already wanted by another pending trade")]
    DuplicateWant(ItemId),

    /// The requester is not allowed to act on the trade.
    #[error("CX_ERR_402: Forbidden: {reason}")]
    Forbidden { reason: String },

    /// The trade is already matched and therefore read-only.
    #[error("CX_ERR_403: Trade already matched: {0}")]
    AlreadyMatched(TradeId),

    // =================================================================
    // Catalog Errors (5xx)
    // =================================================================
    /// The catalog snapshot has not been published yet.
    #[error("CX_ERR_500: Catalog not ready, the server is still loading resources")]
    CatalogNotReady,

    /// The catalog could not be loaded from disk or from the upstream source.
    #[error("CX_ERR_501: Catalog unavailable: {reason}")]
    CatalogUnavailable { reason: String },

    // =================================================================
    // Storage Errors (6xx)
    // =================================================================
    /// The store could not be reached or could not persist a commit.
    #[error("CX_ERR_600: Storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// A concurrent commit touched the same documents; retries exhausted.
    #[error("CX_ERR_601: Transaction conflict after {attempts} attempt(s), retry later")]
    TransactionConflict { attempts: u32 },

    // =================================================================
    // Invariant Violations (8xx)
    // =================================================================
    /// A consistency invariant (e.g. item conservation) failed.
    #[error("CX_ERR_800: Invariant violation: {reason}")]
    InvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CX_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CX_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("CX_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk).
    #[error("CX_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Stable, machine-readable failure kind exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    UserNotFound,
    InsufficientBalance,
    CollectionExhausted,
    NotReady,
    NotOwned,
    AlreadyOwned,
    DuplicateWant,
    Forbidden,
    AlreadyMatched,
    NotFound,
    StorageUnavailable,
    Internal,
}

impl ErrorKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::CollectionExhausted => "COLLECTION_EXHAUSTED",
            Self::NotReady => "NOT_READY",
            Self::NotOwned => "NOT_OWNED",
            Self::AlreadyOwned => "ALREADY_OWNED",
            Self::DuplicateWant => "DUPLICATE_WANT",
            Self::Forbidden => "FORBIDDEN",
            Self::AlreadyMatched => "ALREADY_MATCHED",
            Self::NotFound => "NOT_FOUND",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether the caller may retry the whole operation unchanged.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::StorageUnavailable | Self::NotReady)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CardexError {
    /// The stable failure kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. }
            | Self::IdempotencyKeyReused { .. }
            | Self::UnknownItem(_)
            | Self::AlreadyRegistered { .. }
            | Self::BalanceLimitExceeded { .. } => ErrorKind::Validation,
            Self::UserNotFound(_) => ErrorKind::UserNotFound,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::CollectionExhausted => ErrorKind::CollectionExhausted,
            Self::NotOwned(_) => ErrorKind::NotOwned,
            Self::AlreadyOwned(_) => ErrorKind::AlreadyOwned,
            Self::AlbumNotFound(_) | Self::TradeNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateWant(_) => ErrorKind::DuplicateWant,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::AlreadyMatched(_) => ErrorKind::AlreadyMatched,
            Self::CatalogNotReady | Self::CatalogUnavailable { .. } => ErrorKind::NotReady,
            Self::StorageUnavailable { .. } | Self::TransactionConflict { .. } | Self::Io(_) => {
                ErrorKind::StorageUnavailable
            }
            Self::InvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// The `CX_ERR_nnn` code at the start of the message.
    #[must_use]
    pub fn code(&self) -> String {
        let msg = self.to_string();
        msg.split(':').next().unwrap_or_default().to_string()
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CardexError>;

// Conversion from std::io::Error
impl From<std::io::Error> for CardexError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CardexError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
