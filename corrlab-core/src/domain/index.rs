//! Region → signal-id index over the corpus.

use super::ids::{Region, SignalId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Signal ids grouped by market region.
///
/// Self-correlation comparisons are scoped to one region, so the corpus keeps
/// a per-region id list next to the wide table. Invariant (enforced by the
/// corpus store): the union of all region lists equals exactly the set of
/// columns in the wide table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionIndex(BTreeMap<Region, Vec<SignalId>>);

impl RegionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|ids| ids.is_empty())
    }

    /// Append an id under a region, ignoring exact duplicates.
    pub fn insert(&mut self, region: Region, id: SignalId) {
        let ids = self.0.entry(region).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.0.keys()
    }

    /// Ids recorded for one region (empty slice if the region is unknown).
    pub fn ids_in(&self, region: &Region) -> &[SignalId] {
        self.0.get(region).map(|ids| ids.as_slice()).unwrap_or(&[])
    }

    /// Union of ids across every region.
    pub fn all_ids(&self) -> BTreeSet<SignalId> {
        self.0.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(|ids| ids.len()).sum()
    }

    /// Keep only ids satisfying the predicate; empty regions are dropped.
    pub fn filtered(&self, mut keep: impl FnMut(&SignalId) -> bool) -> RegionIndex {
        let mut out = BTreeMap::new();
        for (region, ids) in &self.0 {
            let kept: Vec<SignalId> = ids.iter().filter(|id| keep(id)).cloned().collect();
            if !kept.is_empty() {
                out.insert(region.clone(), kept);
            }
        }
        RegionIndex(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_ignores_duplicates() {
        let mut index = RegionIndex::new();
        index.insert(Region::from("USA"), SignalId::from("A"));
        index.insert(Region::from("USA"), SignalId::from("A"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn all_ids_unions_regions() {
        let mut index = RegionIndex::new();
        index.insert(Region::from("USA"), SignalId::from("A"));
        index.insert(Region::from("EUR"), SignalId::from("B"));
        let all = index.all_ids();
        assert!(all.contains(&SignalId::from("A")));
        assert!(all.contains(&SignalId::from("B")));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn filtered_drops_empty_regions() {
        let mut index = RegionIndex::new();
        index.insert(Region::from("USA"), SignalId::from("A"));
        index.insert(Region::from("EUR"), SignalId::from("B"));
        let filtered = index.filtered(|id| id.as_str() == "A");
        assert_eq!(filtered.len(), 1);
        assert!(filtered.ids_in(&Region::from("EUR")).is_empty());
    }

    #[test]
    fn json_shape_is_a_plain_map() {
        let mut index = RegionIndex::new();
        index.insert(Region::from("USA"), SignalId::from("A"));
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#"{"USA":["A"]}"#);
    }
}
