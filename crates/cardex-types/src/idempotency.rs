//! Idempotency records.
//!
//! A record is written in the same store transaction as the effect it
//! guards, so a committed operation and its key are durable together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CardexError, IdempotencyKey, ItemId, Result, TradeId, UserId};

/// Operations that accept an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GeneratePacket,
    CreateTrade,
}

impl Operation {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::GeneratePacket => "generate_packet",
            Self::CreateTrade => "create_trade",
        }
    }
}

/// The stored result of a completed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Packet(Vec<ItemId>),
    TradeCreated(TradeId),
}

impl Outcome {
    /// # Errors
    /// Returns `Internal` if the outcome belongs to another operation.
    pub fn into_packet(self) -> Result<Vec<ItemId>> {
        match self {
            Self::Packet(items) => Ok(items),
            Self::TradeCreated(_) => Err(CardexError::Internal(
                "idempotency outcome is not a packet".into(),
            )),
        }
    }

    /// # Errors
    /// Returns `Internal` if the outcome belongs to another operation.
    pub fn into_trade(self) -> Result<TradeId> {
        match self {
            Self::TradeCreated(id) => Ok(id),
            Self::Packet(_) => Err(CardexError::Internal(
                "idempotency outcome is not a trade".into(),
            )),
        }
    }
}

/// A completed, keyed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub user: UserId,
    pub operation: Operation,
    /// Hex sha-256 of operation, user and payload.
    pub fingerprint: String,
    pub outcome: Outcome,
    pub recorded_at: DateTime<Utc>,
}
