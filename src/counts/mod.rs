//! Keyed counters
//!
//! [`CountMap`] is the per-class counter each rank accumulates (one for
//! mentions, one for topics). Merging adds counts key by key, which makes the
//! merge commutative and associative: the coordinator may fold contributions
//! in any order and reach the same totals.
//!
//! # Modules
//!
//! - `codec`: versioned binary encoding used on the wire
//! - `rank`: top-N selection with a fixed tie-break

pub mod codec;
pub mod rank;

pub use codec::{decode, decode_scalar, encode, encode_scalar, CodecError, CODEC_VERSION};
pub use rank::{top, RankedEntry};

use std::collections::hash_map;
use std::collections::HashMap;

/// Token key to occurrence count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountMap {
    counts: HashMap<String, u64>,
}

impl CountMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `key`
    pub fn increment(&mut self, key: &str) {
        self.add(key, 1);
    }

    /// Add `count` occurrences of `key`
    pub fn add(&mut self, key: &str, count: u64) {
        match self.counts.get_mut(key) {
            Some(existing) => *existing += count,
            None => {
                self.counts.insert(key.to_owned(), count);
            }
        }
    }

    /// Count for `key` (0 when absent)
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.counts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, u64> {
        self.counts.iter()
    }

    /// Add every count of `other` into `self`
    pub fn merge(&mut self, other: &CountMap) {
        for (key, &count) in &other.counts {
            self.add(key, count);
        }
    }

    /// Merge, consuming `other` (reuses its keys)
    pub fn merge_owned(&mut self, other: CountMap) {
        if self.counts.is_empty() {
            self.counts = other.counts;
            return;
        }

        for (key, count) in other.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
    }
}

impl FromIterator<(String, u64)> for CountMap {
    /// Duplicate keys are summed
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut map = CountMap::new();
        for (key, count) in iter {
            *map.counts.entry(key).or_insert(0) += count;
        }
        map
    }
}

impl<'a> FromIterator<(&'a str, u64)> for CountMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, u64)>>(iter: I) -> Self {
        let mut map = CountMap::new();
        for (key, count) in iter {
            map.add(key, count);
        }
        map
    }
}

impl IntoIterator for CountMap {
    type Item = (String, u64);
    type IntoIter = hash_map::IntoIter<String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

impl<'a> IntoIterator for &'a CountMap {
    type Item = (&'a String, &'a u64);
    type IntoIter = hash_map::Iter<'a, String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.iter()
    }
}
