//! Hybrid Logical Clock (HLC) implementation
//!
//! HLC provides a logical timestamp that combines wall-clock time with a logical counter,
//! ensuring causal ordering without relying solely on potentially-skewed system clocks.
//! Timestamps carry the issuing node id, which breaks ties between equal
//! `(physical, logical)` pairs so the order is total across all replicas.

use crate::types::NodeId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hybrid Logical Clock timestamp
///
/// Field order matters: the derived `Ord` compares `physical`, then
/// `logical`, then `node_id`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
pub struct HlcTimestamp {
    /// Wall-clock time in milliseconds since UNIX epoch
    pub physical: u64,

    /// Logical counter for ordering events at the same wall time
    pub logical: u32,

    /// Node that issued the timestamp
    pub node_id: NodeId,
}

impl HlcTimestamp {
    pub fn new(physical: u64, logical: u32, node_id: impl Into<NodeId>) -> Self {
        Self {
            physical,
            logical,
            node_id: node_id.into(),
        }
    }
}

impl fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.physical, self.logical, self.node_id)
    }
}

/// Source of wall-clock time for the HLC
pub trait WallClock: Send + Sync {
    /// Milliseconds since UNIX epoch
    fn now_millis(&self) -> u64;
}

/// Operating system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_millis(&self) -> u64 {
        // A clock before 1970 reads as 0; the HLC stays monotonic regardless.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<u64>>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_millis)),
        }
    }

    pub fn set(&self, millis: u64) {
        *self.now.lock() = millis;
    }

    pub fn advance(&self, millis: u64) {
        *self.now.lock() += millis;
    }
}

impl WallClock for ManualClock {
    fn now_millis(&self) -> u64 {
        *self.now.lock()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClockState {
    physical: u64,
    logical: u32,
}

impl ClockState {
    /// Advance the logical counter, carrying into physical time on overflow
    ///
    /// At `(u64::MAX, u32::MAX)` the clock is exhausted and stays put.
    fn bump(&mut self) {
        match self.logical.checked_add(1) {
            Some(logical) => self.logical = logical,
            None if self.physical == u64::MAX => {}
            None => {
                self.physical += 1;
                self.logical = 0;
            }
        }
    }
}

/// Per-node hybrid logical clock
///
/// One instance per node, created at startup and shared by reference.
pub struct HybridLogicalClock {
    node_id: NodeId,
    wall: Box<dyn WallClock>,
    state: Mutex<ClockState>,
}

impl HybridLogicalClock {
    /// Create a clock backed by the system wall clock
    pub fn new(node_id: NodeId) -> Self {
        Self::with_wall_clock(node_id, SystemClock)
    }

    pub fn with_wall_clock(node_id: NodeId, wall: impl WallClock + 'static) -> Self {
        Self {
            node_id,
            wall: Box::new(wall),
            state: Mutex::new(ClockState::default()),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Issue a timestamp for a local event
    pub fn tick(&self) -> HlcTimestamp {
        let now = self.wall.now_millis();
        let mut state = self.state.lock();

        if now > state.physical {
            state.physical = now;
            state.logical = 0;
        } else {
            state.bump();
        }

        self.stamp(&state)
    }

    /// Update the clock from a remote timestamp and issue a timestamp that
    /// strictly succeeds both the remote and everything issued locally
    ///
    /// - remote ahead of local and wall: adopt remote physical, logical = remote.logical + 1
    /// - remote tied with local: logical = max(local, remote) + 1
    /// - local ahead: logical = local + 1
    /// - wall clock ahead of both: physical = wall, logical = 0
    pub fn receive(&self, remote: &HlcTimestamp) -> HlcTimestamp {
        let now = self.wall.now_millis();
        let mut state = self.state.lock();

        let local_physical = state.physical;
        let physical = local_physical.max(remote.physical).max(now);

        if physical == local_physical && physical == remote.physical {
            state.logical = state.logical.max(remote.logical);
            state.bump();
        } else if physical == remote.physical {
            state.physical = remote.physical;
            state.logical = remote.logical;
            state.bump();
        } else if physical == local_physical {
            state.bump();
        } else {
            state.physical = now;
            state.logical = 0;
        }

        self.stamp(&state)
    }

    /// Current reading of the underlying wall clock
    pub fn wall_millis(&self) -> u64 {
        self.wall.now_millis()
    }

    /// Most recently issued timestamp (zero before the first tick)
    pub fn last(&self) -> HlcTimestamp {
        let state = self.state.lock();
        self.stamp(&state)
    }

    fn stamp(&self, state: &ClockState) -> HlcTimestamp {
        HlcTimestamp {
            physical: state.physical,
            logical: state.logical,
            node_id: self.node_id.clone(),
        }
    }
}

impl fmt::Debug for HybridLogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridLogicalClock")
            .field("node_id", &self.node_id)
            .field("last", &self.last())
            .finish()
    }
}
