//! # cardex-catalog
//!
//! **Pure rarity computation and the immutable catalog snapshot.**
//!
//! - [`rarity`]: popularity scores → extraction probabilities → tiers.
//!   Deterministic, no side effects.
//! - [`CatalogSnapshot`]: the rated, indexed, read-only catalog.
//! - [`CatalogHandle`]: publish-once / swap-wholesale access to the current
//!   snapshot. Readers get `NotReady` until the first publish.
//! - [`loader`]: on-disk JSON cache with fallback to the upstream
//!   [`CatalogSource`].

pub mod handle;
pub mod loader;
pub mod rarity;
pub mod snapshot;

pub use handle::CatalogHandle;
pub use loader::{CatalogSource, JsonFileSource, StaticSource, load_or_fetch};
pub use rarity::{RarityAssignment, assign_rarity, extraction_probabilities, tier_thresholds};
pub use snapshot::CatalogSnapshot;
