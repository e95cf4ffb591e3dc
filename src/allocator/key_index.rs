//! Key index
//!
//! Maps blob keys to the offset of their record.

use std::collections::BTreeMap;

/// Key → blob record offset
///
/// BTreeMap keeps `keys()` ascending.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    offsets: BTreeMap<u32, u64>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the previous offset if any
    pub fn insert(&mut self, key: u32, offset: u64) -> Option<u64> {
        self.offsets.insert(key, offset)
    }

    pub fn get(&self, key: u32) -> Option<u64> {
        self.offsets.get(&key).copied()
    }

    pub fn contains(&self, key: u32) -> bool {
        self.offsets.contains_key(&key)
    }

    pub fn remove(&mut self, key: u32) -> Option<u64> {
        self.offsets.remove(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.offsets.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.offsets.iter().map(|(&key, &offset)| (key, offset))
    }

    pub fn max_key(&self) -> Option<u32> {
        self.offsets.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
