//! CRDT (Conflict-free Replicated Data Types) module
//!
//! This module implements the merge machinery for BizSync, including:
//! - Hybrid Logical Clocks (HLC) for causal ordering
//! - Vector clocks for per-entity precedence/concurrency detection
//! - Field types: LWW registers, PN-counters, observed-remove sets
//! - Deterministic conflict resolution of whole entities

pub mod counter;
pub mod hlc;
pub mod orset;
pub mod register;
pub mod resolver;
pub mod vector_clock;

#[cfg(test)]
mod convergence_tests;

pub use counter::PnCounter;
pub use hlc::{HlcTimestamp, HybridLogicalClock, ManualClock, SystemClock, WallClock};
pub use orset::OrSet;
pub use register::LwwRegister;
pub use resolver::{ConflictResolver, MergeOutcome, Resolution};
pub use vector_clock::{CausalOrder, VectorClock};

/// State-based CRDT merge
///
/// Implementations must be commutative, associative and idempotent, and must
/// not read clocks or any other node-local state.
pub trait Mergeable {
    fn merge(&self, other: &Self) -> Self;
}
