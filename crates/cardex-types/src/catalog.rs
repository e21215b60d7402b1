//! Catalog types: raw upstream entries and the rated items built from them.
//!
//! A [`CatalogEntry`] is what the external catalog provider hands over.
//! A [`CatalogItem`] is the immutable, rated record the engine trades in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ItemId, constants};

/// Cross-reference counters reported by the upstream catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearances {
    pub comics: u64,
    pub series: u64,
    pub events: u64,
}

impl Appearances {
    /// Sum of all counters.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.comics
            .saturating_add(self.series)
            .saturating_add(self.events)
    }
}

/// Raw catalog record as delivered by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: ItemId,
    pub name: String,
    pub thumbnail: String,
    pub appearances: Appearances,
}

impl CatalogEntry {
    /// Popularity score used by the rarity calculator.
    #[must_use]
    pub fn popularity_score(&self) -> u64 {
        self.appearances.total()
    }

    /// Entries without a real picture are not tradeable.
    #[must_use]
    pub fn has_usable_thumbnail(&self) -> bool {
        !self.thumbnail.is_empty()
            && !constants::PLACEHOLDER_THUMBNAILS
                .iter()
                .any(|placeholder| self.thumbnail.contains(placeholder))
    }

    /// Deterministic fixture entry.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn dummy(id: u64, popularity: u64) -> Self {
        Self {
            id: ItemId(id),
            name: format!("Card {id}"),
            thumbnail: format!("https://img.example/{id}.jpg"),
            appearances: Appearances {
                comics: popularity,
                series: 0,
                events: 0,
            },
        }
    }
}

/// Rarity tier of a catalog item.
///
/// Ordered from least to most rare: `Common < Uncommon < Rare < Epic < Legendary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RarityTier {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl RarityTier {
    /// Tiers indexed by probability bucket, most likely pulls in bucket
    /// `TIER_COUNT - 1`. Bucket assignment starts at 1, so `Legendary` keeps
    /// its slot and colour without being handed out by the catalog.
    pub const BY_BUCKET: [Self; constants::TIER_COUNT] = [
        Self::Legendary,
        Self::Epic,
        Self::Rare,
        Self::Uncommon,
        Self::Common,
    ];

    /// Tier of a probability bucket. Out-of-range buckets clamp to `Common`.
    #[must_use]
    pub fn from_bucket(bucket: usize) -> Self {
        Self::BY_BUCKET
            .get(bucket)
            .copied()
            .unwrap_or(Self::Common)
    }

    /// Display colour (RGB hex) of the tier.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Legendary => "ff0000",
            Self::Epic => "ffcc00",
            Self::Rare => "9c00ff",
            Self::Uncommon => "0090ff",
            Self::Common => "009623",
        }
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        };
        f.write_str(label)
    }
}

/// A tradeable catalog item with its precomputed rarity. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub name: String,
    pub popularity_score: u64,
    /// Normalized extraction probability across the whole catalog.
    pub probability: f64,
    pub rarity_tier: RarityTier,
    pub thumbnail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popularity_sums_counters() {
        let entry = CatalogEntry {
            id: ItemId(7),
            name: "Seven".into(),
            thumbnail: "https://img.example/7.jpg".into(),
            appearances: Appearances {
                comics: 10,
                series: 4,
                events: 1,
            },
        };
        assert_eq!(entry.popularity_score(), 15);
    }

    #[test]
    fn placeholder_thumbnails_are_unusable() {
        let mut entry = CatalogEntry::dummy(1, 0);
        assert!(entry.has_usable_thumbnail());
        entry.thumbnail = "http://x/image_not_available.jpg".into();
        assert!(!entry.has_usable_thumbnail());
        entry.thumbnail = String::new();
        assert!(!entry.has_usable_thumbnail());
    }

    #[test]
    fn tier_ordering_goes_common_to_legendary() {
        assert!(RarityTier::Common < RarityTier::Uncommon);
        assert!(RarityTier::Epic < RarityTier::Legendary);
        assert_eq!(RarityTier::from_bucket(0), RarityTier::Legendary);
        assert_eq!(RarityTier::from_bucket(4), RarityTier::Common);
        assert_eq!(RarityTier::from_bucket(99), RarityTier::Common);
    }

    #[test]
    fn tier_serializes_lowercase() {
        let json = serde_json::to_string(&RarityTier::Legendary).unwrap();
        assert_eq!(json, "\"legendary\"");
        assert_eq!(RarityTier::Common.color(), "009623");
    }
}
