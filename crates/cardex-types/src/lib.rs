//! # cardex-types
//!
//! Shared types, errors, and configuration for the **Cardex** card
//! marketplace engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`UserId`], [`TradeId`], [`ItemId`], [`IdempotencyKey`]
//! - **Catalog model**: [`CatalogEntry`], [`CatalogItem`], [`RarityTier`]
//! - **Collection model**: [`User`], [`Album`]
//! - **Trade model**: [`Trade`], [`TradeState`]
//! - **Idempotency model**: [`IdempotencyRecord`], [`Operation`], [`Outcome`]
//! - **Configuration**: [`MarketConfig`]
//! - **Errors**: [`CardexError`] with `CX_ERR_` prefix codes, [`ErrorKind`]
//! - **Constants**: system-wide limits and defaults

pub mod album;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod idempotency;
pub mod ids;
pub mod trade;
pub mod user;

// Re-export all primary types at crate root for ergonomic imports:
//   use cardex_types::{Album, Trade, User, ...};

pub use album::*;
pub use catalog::*;
pub use config::*;
pub use error::*;
pub use idempotency::*;
pub use ids::*;
pub use trade::*;
pub use user::*;

// Constants are accessed via `cardex_types::constants::FOO`
// (not re-exported to avoid name collisions).
