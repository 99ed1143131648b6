//! Positive/negative counter
//!
//! Increments and decrements are tracked as per-node partial sums. Merging
//! takes the per-node maximum of each partial sum, so replaying the same
//! remote state any number of times has no further effect.

use super::{HlcTimestamp, Mergeable};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// PN-counter with per-node contributions
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PnCounter {
    /// node_id -> total increments issued by that node
    positive: BTreeMap<NodeId, u64>,
    /// node_id -> total decrements issued by that node
    negative: BTreeMap<NodeId, u64>,
    /// HLC of the latest write observed
    last_write: Option<HlcTimestamp>,
}

impl PnCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    pub fn value(&self) -> i64 {
        let up: u64 = self.positive.values().sum();
        let down: u64 = self.negative.values().sum();
        up as i64 - down as i64
    }

    /// Add `delta` on behalf of the node that issued `timestamp`
    ///
    /// A negative delta is recorded as a decrement.
    pub fn increment(&mut self, delta: i64, timestamp: HlcTimestamp) {
        if delta < 0 {
            self.record_negative(delta.unsigned_abs(), &timestamp.node_id);
        } else {
            let slot = self.positive.entry(timestamp.node_id.clone()).or_insert(0);
            *slot += delta as u64;
        }
        self.observe(timestamp);
    }

    /// Subtract `delta` on behalf of the node that issued `timestamp`
    pub fn decrement(&mut self, delta: i64, timestamp: HlcTimestamp) {
        self.increment(-delta, timestamp);
    }

    pub fn last_write(&self) -> Option<&HlcTimestamp> {
        self.last_write.as_ref()
    }

    /// Net contribution of a single node
    pub fn contribution(&self, node_id: &NodeId) -> i64 {
        let up = self.positive.get(node_id).copied().unwrap_or(0);
        let down = self.negative.get(node_id).copied().unwrap_or(0);
        up as i64 - down as i64
    }

    fn record_negative(&mut self, amount: u64, node_id: &NodeId) {
        let slot = self.negative.entry(node_id.clone()).or_insert(0);
        *slot += amount;
    }

    fn observe(&mut self, timestamp: HlcTimestamp) {
        if self.last_write.as_ref().map_or(true, |last| timestamp > *last) {
            self.last_write = Some(timestamp);
        }
    }
}

fn merge_partials(a: &BTreeMap<NodeId, u64>, b: &BTreeMap<NodeId, u64>) -> BTreeMap<NodeId, u64> {
    let mut merged = a.clone();
    for (node, &count) in b {
        let entry = merged.entry(node.clone()).or_insert(0);
        *entry = (*entry).max(count);
    }
    merged
}

impl Mergeable for PnCounter {
    fn merge(&self, other: &Self) -> Self {
        Self {
            positive: merge_partials(&self.positive, &other.positive),
            negative: merge_partials(&self.negative, &other.negative),
            last_write: self.last_write.clone().max(other.last_write.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(physical: u64, node: &str) -> HlcTimestamp {
        HlcTimestamp::new(physical, 0, node)
    }

    #[test]
    fn test_increment_decrement() {
        let mut counter = PnCounter::new();
        counter.increment(10, ts(1, "a"));
        counter.decrement(3, ts(2, "a"));
        counter.increment(-2, ts(3, "b"));

        assert_eq!(counter.value(), 5);
        assert_eq!(counter.contribution(&NodeId::from("a")), 7);
        assert_eq!(counter.contribution(&NodeId::from("b")), -2);
        assert_eq!(counter.last_write(), Some(&ts(3, "b")));
    }

    #[test]
    fn test_concurrent_increments_both_survive() {
        let mut a = PnCounter::new();
        let mut b = PnCounter::new();
        a.increment(100, ts(1, "a"));
        b.increment(250, ts(1, "b"));

        assert_eq!(a.merge(&b).value(), 350);
        assert_eq!(b.merge(&a).value(), 350);
    }

    #[test]
    fn test_repeated_merge_is_idempotent() {
        let mut a = PnCounter::new();
        let mut b = PnCounter::new();
        a.increment(5, ts(1, "a"));
        b.increment(7, ts(2, "b"));

        let once = a.merge(&b);
        let twice = once.merge(&b).merge(&b);
        assert_eq!(once, twice);
        assert_eq!(twice.value(), 12);
    }
}
