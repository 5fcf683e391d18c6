//! Top-N selection

use super::CountMap;
use serde::Serialize;
use std::cmp::Ordering;

/// One row of a ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
}

impl RankedEntry {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// Ranking order: count descending, then key ascending (byte-wise)
fn rank_order(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key))
}

/// The `n` highest-count entries of `map`
///
/// Returns fewer than `n` entries when the map is smaller; never pads.
pub fn top(map: &CountMap, n: usize) -> Vec<RankedEntry> {
    if n == 0 {
        return Vec::new();
    }

    let mut entries: Vec<RankedEntry> = map
        .iter()
        .map(|(key, &count)| RankedEntry::new(key.as_str(), count))
        .collect();

    // Partial selection first; only the head needs a full sort
    if entries.len() > n {
        entries.select_nth_unstable_by(n - 1, rank_order);
        entries.truncate(n);
    }
    entries.sort_unstable_by(rank_order);

    entries
}
