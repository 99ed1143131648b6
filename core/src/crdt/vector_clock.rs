//! Vector clocks for per-entity causal ordering
//!
//! Each entity carries one clock with a counter per node that has ever
//! written it. Comparing two versions' clocks tells whether one causally
//! precedes the other or whether they were produced concurrently.

use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Causal relationship between two vector clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CausalOrder {
    /// Self happens-before other
    Before,
    /// Other happens-before self
    After,
    /// Identical histories
    Equal,
    /// Neither dominates
    Concurrent,
}

/// Vector clock for causal ordering
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VectorClock {
    /// Map of node_id -> write counter (ordered for stable encoding)
    pub clocks: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    /// Create new empty vector clock
    pub fn new() -> Self {
        Self {
            clocks: BTreeMap::new(),
        }
    }

    /// Clock of a freshly created entity: `{origin: 1}`
    pub fn initial(origin: &NodeId) -> Self {
        let mut clock = Self::new();
        clock.increment(origin);
        clock
    }

    /// Get counter for a node (missing entries read as 0)
    pub fn get(&self, node_id: &NodeId) -> u64 {
        self.clocks.get(node_id).copied().unwrap_or(0)
    }

    /// Increment counter for a node
    pub fn increment(&mut self, node_id: &NodeId) {
        let counter = self.clocks.entry(node_id.clone()).or_insert(0);
        *counter += 1;
    }

    /// Component-wise comparison over the union of both key sets
    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        let mut less = false;
        let mut greater = false;

        for node in self.clocks.keys().chain(other.clocks.keys()) {
            match self.get(node).cmp(&other.get(node)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return CausalOrder::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// Check if this clock happens-before another
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    /// Check if two clocks are concurrent (neither happens-before the other)
    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// True if every component of self is >= the other's
    pub fn dominates(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), CausalOrder::After | CausalOrder::Equal)
    }

    /// Merge two vector clocks (take max of each counter)
    pub fn merge(&self, other: &VectorClock) -> VectorClock {
        let mut merged = self.clone();
        for (node, &count) in &other.clocks {
            let entry = merged.clocks.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        merged
    }
}
