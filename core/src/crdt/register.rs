//! Last-writer-wins register
//!
//! Wraps a single entity attribute. The stored timestamp is always the HLC
//! of the write that produced the value, so merging two registers keeps the
//! later write at field granularity.

use super::{HlcTimestamp, Mergeable};
use serde::{Deserialize, Serialize};

/// LWW register holding one field value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LwwRegister<T> {
    value: T,
    timestamp: HlcTimestamp,
}

impl<T> LwwRegister<T> {
    pub fn new(value: T, timestamp: HlcTimestamp) -> Self {
        Self { value, timestamp }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn timestamp(&self) -> &HlcTimestamp {
        &self.timestamp
    }

    /// Unconditional local write; the writer trusts its own clock ordering
    pub fn set(&mut self, value: T, timestamp: HlcTimestamp) {
        self.value = value;
        self.timestamp = timestamp;
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Clone + Ord> Mergeable for LwwRegister<T> {
    /// Keep the write with the greater timestamp. Equal timestamps only arise
    /// from corrupted input; the greater value wins so merge still commutes.
    fn merge(&self, other: &Self) -> Self {
        if self.timestamp > other.timestamp {
            self.clone()
        } else if other.timestamp > self.timestamp {
            other.clone()
        } else if self.value >= other.value {
            self.clone()
        } else {
            other.clone()
        }
    }
}
