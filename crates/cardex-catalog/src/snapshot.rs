//! The immutable, indexed catalog snapshot.
//!
//! Built once from the upstream entries (or read back from the JSON cache)
//! and never mutated. A refresh builds a new snapshot and publishes it
//! through the [`CatalogHandle`](crate::CatalogHandle).

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::Path,
};

use cardex_types::{CardexError, CatalogEntry, CatalogItem, ItemId, Result};
use sha2::{Digest, Sha256};

use crate::rarity::assign_rarity;

/// Read-only catalog with an id index.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    /// Items in ascending id order.
    items: Vec<CatalogItem>,
    index: HashMap<ItemId, usize>,
    digest: String,
}

impl CatalogSnapshot {
    /// Rate raw upstream entries and build the snapshot.
    ///
    /// Entries without a usable thumbnail are dropped, as are repeated ids
    /// (the first occurrence wins).
    #[must_use]
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut seen = HashSet::new();
        let usable: Vec<CatalogEntry> = entries
            .into_iter()
            .filter(CatalogEntry::has_usable_thumbnail)
            .filter(|e| seen.insert(e.id))
            .collect();

        let scores: Vec<u64> = usable.iter().map(CatalogEntry::popularity_score).collect();
        let rarity = assign_rarity(&scores);

        let items = usable
            .into_iter()
            .zip(rarity)
            .map(|(entry, assigned)| CatalogItem {
                id: entry.id,
                popularity_score: entry.popularity_score(),
                name: entry.name,
                probability: assigned.probability,
                rarity_tier: assigned.tier,
                thumbnail: entry.thumbnail,
            })
            .collect();

        Self::index(items)
    }

    /// Wrap already-rated items (e.g. read back from disk).
    ///
    /// # Errors
    /// Returns `CatalogUnavailable` if an id appears twice.
    pub fn from_items(items: Vec<CatalogItem>) -> Result<Self> {
        let mut ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(CardexError::CatalogUnavailable {
                reason: format!("duplicate catalog id {}", pair[0]),
            });
        }
        Ok(Self::index(items))
    }

    fn index(mut items: Vec<CatalogItem>) -> Self {
        items.sort_by_key(|i| i.id);
        let index = items.iter().enumerate().map(|(pos, i)| (i.id, pos)).collect();
        let digest = Self::compute_digest(&items);
        Self {
            items,
            index,
            digest,
        }
    }

    fn compute_digest(items: &[CatalogItem]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"cardex:catalog:v1:");
        hasher.update((items.len() as u64).to_le_bytes());
        for item in items {
            hasher.update(item.id.0.to_le_bytes());
            hasher.update(item.name.as_bytes());
            hasher.update(item.rarity_tier.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&CatalogItem> {
        self.index.get(&id).and_then(|&pos| self.items.get(pos))
    }

    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    #[must_use]
    pub fn name_of(&self, id: ItemId) -> Option<&str> {
        self.get(id).map(|i| i.name.as_str())
    }

    /// First id of `ids` that is not in the catalog.
    #[must_use]
    pub fn first_unknown<'a>(&self, ids: impl IntoIterator<Item = &'a ItemId>) -> Option<ItemId> {
        ids.into_iter().copied().find(|id| !self.contains(*id))
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().map(|i| i.id)
    }

    #[must_use]
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Content hash identifying this snapshot in logs.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Serialize as a JSON object keyed by item id.
    ///
    /// # Errors
    /// Returns `Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        let keyed: BTreeMap<ItemId, &CatalogItem> = self.items.iter().map(|i| (i.id, i)).collect();
        Ok(serde_json::to_string(&keyed)?)
    }

    /// Parse the JSON produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    /// Returns `Serialization` on malformed JSON and `CatalogUnavailable`
    /// if a key disagrees with its item's id.
    pub fn from_json(json: &str) -> Result<Self> {
        let keyed: BTreeMap<ItemId, CatalogItem> = serde_json::from_str(json)?;
        if let Some((key, item)) = keyed.iter().find(|(key, item)| **key != item.id) {
            return Err(CardexError::CatalogUnavailable {
                reason: format!("snapshot key {key} holds item {}", item.id),
            });
        }
        Self::from_items(keyed.into_values().collect())
    }

    /// Write the snapshot atomically (temp file + rename).
    ///
    /// # Errors
    /// Returns `Io` or `Serialization` on failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read a snapshot written by [`save`](Self::save).
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read, `Serialization` if it
    /// cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
