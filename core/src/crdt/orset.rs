//! Observed-remove set (add-wins)
//!
//! Every add gets a fresh unique tag and remembers the HLC of the write. A
//! remove tombstones only the tags it has observed, so an add that was
//! concurrent with the remove survives the merge.

use super::{HlcTimestamp, Mergeable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
struct Tagged<T> {
    value: T,
    tag: Uuid,
    added_at: HlcTimestamp,
}

/// Add-wins observed-remove set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrSet<T: Ord> {
    entries: BTreeSet<Tagged<T>>,
    removed: BTreeSet<Uuid>,
}

impl<T: Ord> Default for OrSet<T> {
    fn default() -> Self {
        Self {
            entries: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> OrSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: T, timestamp: HlcTimestamp) {
        self.entries.insert(Tagged {
            value,
            tag: Uuid::new_v4(),
            added_at: timestamp,
        });
    }

    /// Remove every observed instance of `value`
    pub fn remove(&mut self, value: &T) {
        let observed: Vec<Tagged<T>> = self
            .entries
            .iter()
            .filter(|e| &e.value == value)
            .cloned()
            .collect();

        for entry in observed {
            self.entries.remove(&entry);
            self.removed.insert(entry.tag);
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.entries.iter().any(|e| &e.value == value)
    }

    /// Distinct live elements in order
    pub fn elements(&self) -> Vec<T> {
        let mut out: Vec<T> = Vec::new();
        for entry in &self.entries {
            if out.last() != Some(&entry.value) {
                out.push(entry.value.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.elements().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Ord + Clone> Mergeable for OrSet<T> {
    fn merge(&self, other: &Self) -> Self {
        let removed: BTreeSet<Uuid> = self.removed.union(&other.removed).cloned().collect();
        let entries = self
            .entries
            .union(&other.entries)
            .filter(|e| !removed.contains(&e.tag))
            .cloned()
            .collect();

        Self { entries, removed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(physical: u64, node: &str) -> HlcTimestamp {
        HlcTimestamp::new(physical, 0, node)
    }

    #[test]
    fn test_add_remove() {
        let mut set = OrSet::new();
        set.add("vip".to_string(), ts(1, "a"));
        set.add("wholesale".to_string(), ts(2, "a"));
        assert_eq!(set.len(), 2);

        set.remove(&"vip".to_string());
        assert!(!set.contains(&"vip".to_string()));
        assert_eq!(set.elements(), vec!["wholesale".to_string()]);
    }

    #[test]
    fn test_concurrent_add_wins_over_remove() {
        let mut base = OrSet::new();
        base.add("vip".to_string(), ts(1, "a"));

        // Node A removes what it has seen, node B re-adds concurrently
        let mut a = base.clone();
        a.remove(&"vip".to_string());
        let mut b = base.clone();
        b.add("vip".to_string(), ts(2, "b"));

        let merged = a.merge(&b);
        assert!(merged.contains(&"vip".to_string()));
        assert_eq!(merged, b.merge(&a));
    }

    #[test]
    fn test_removed_tag_stays_removed_after_merge() {
        let mut a = OrSet::new();
        a.add(1u32, ts(1, "a"));
        let b = a.clone();
        a.remove(&1);

        let merged = a.merge(&b);
        assert!(!merged.contains(&1));
        assert_eq!(merged.merge(&b), merged);
    }

    #[test]
    fn test_values_added_under_one_timestamp_are_independent() {
        let t = ts(7, "a");
        let mut set = OrSet::new();
        set.add("vip".to_string(), t.clone());
        set.add("trade".to_string(), t.clone());
        set.remove(&"vip".to_string());

        assert_eq!(set.elements(), vec!["trade".to_string()]);
        let merged = set.merge(&set);
        assert_eq!(merged, set);
        assert_eq!(merged.elements(), vec!["trade".to_string()]);
    }

    #[test]
    fn test_re_add_after_remove_is_live() {
        let t = ts(3, "a");
        let mut set = OrSet::new();
        set.add(5u32, t.clone());
        set.remove(&5);
        set.add(5u32, t);
        assert!(set.contains(&5));
        assert!(set.merge(&set).contains(&5));
    }
}
