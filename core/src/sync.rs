//! Merging entity snapshots received from other nodes
//!
//! Transport is out of scope here: a caller hands in the records another
//! node exported for one table, and gets back the merged results that
//! changed locally (ready to re-broadcast). Each remote entity is applied in
//! its own transaction, so one bad record never blocks the rest.

use crate::crdt::{ConflictResolver, HlcTimestamp, HybridLogicalClock, MergeOutcome};
use crate::entity::Record;
use crate::storage::EntityStore;
use crate::transaction::TransactionManager;
use crate::types::Table;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How far ahead of the local wall clock a remote edit may be stamped
///
/// Records beyond this are rejected before their timestamp reaches the HLC,
/// so a corrupt peer cannot push the clock to its limit.
pub const MAX_CLOCK_DRIFT_MS: u64 = 24 * 60 * 60 * 1000;

/// What happened to each record of a remote batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub received: usize,
    /// Unknown locally; stored as received
    pub inserted: usize,
    /// Remote causally newer; replaced the local version
    pub took_remote: usize,
    /// Concurrent; merged field by field
    pub merged: usize,
    /// Local already dominated the remote version
    pub unchanged: usize,
    /// Wrong table, stamped too far in the future, or failed to commit
    pub rejected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// Locally changed entities, in input order
    pub changed: Vec<Record>,
    pub report: SyncReport,
}

enum Applied {
    Inserted(Record),
    Resolved(MergeOutcome, Option<Record>),
}

pub struct SyncEngine {
    store: Arc<dyn EntityStore>,
    clock: Arc<HybridLogicalClock>,
    transactions: Arc<TransactionManager>,
    resolver: ConflictResolver,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<HybridLogicalClock>,
        transactions: Arc<TransactionManager>,
    ) -> Self {
        Self {
            store,
            clock,
            transactions,
            resolver: ConflictResolver::new(),
        }
    }

    /// Merge remote versions of `table` rows into the local store
    pub fn apply_remote_batch(&self, table: Table, remote: Vec<Record>) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        result.report.received = remote.len();

        for record in remote {
            if record.table() != table {
                tracing::warn!(
                    expected = %table,
                    actual = %record.table(),
                    id = %record.id(),
                    "Rejected remote record for wrong table"
                );
                result.report.rejected += 1;
                continue;
            }

            let stamped = &record.meta().updated_at;
            let horizon = self.clock.wall_millis().saturating_add(MAX_CLOCK_DRIFT_MS);
            if stamped.physical > horizon {
                tracing::warn!(
                    id = %record.id(),
                    physical = stamped.physical,
                    horizon,
                    "Rejected remote record stamped beyond clock drift"
                );
                result.report.rejected += 1;
                continue;
            }

            self.clock.receive(stamped);

            match self.apply_one(record) {
                Ok(Applied::Inserted(stored)) => {
                    result.report.inserted += 1;
                    result.changed.push(stored);
                }
                Ok(Applied::Resolved(outcome, changed)) => {
                    match outcome {
                        MergeOutcome::KeptLocal => result.report.unchanged += 1,
                        MergeOutcome::TookRemote => result.report.took_remote += 1,
                        MergeOutcome::Merged => result.report.merged += 1,
                    }
                    result.changed.extend(changed);
                }
                Err(e) => {
                    tracing::warn!(%table, error = %e, "Rejected remote record");
                    result.report.rejected += 1;
                }
            }
        }

        tracing::info!(
            %table,
            received = result.report.received,
            inserted = result.report.inserted,
            merged = result.report.merged,
            took_remote = result.report.took_remote,
            rejected = result.report.rejected,
            "Applied remote batch"
        );

        Ok(result)
    }

    fn apply_one(&self, remote: Record) -> Result<Applied> {
        self.transactions.run_in_transaction(|tx| {
            let Some(local) = tx.get_record(remote.table(), &remote.id())? else {
                tx.put_merged(remote.clone(), None)?;
                return Ok(Applied::Inserted(remote));
            };

            let resolution = self.resolver.resolve_record(&local, &remote)?;
            if resolution.value == local {
                return Ok(Applied::Resolved(resolution.outcome, None));
            }

            tracing::debug!(
                table = %local.table(),
                id = %local.id(),
                outcome = ?resolution.outcome,
                "Merged remote version"
            );
            tx.put_merged(resolution.value.clone(), Some(&local))?;
            Ok(Applied::Resolved(resolution.outcome, Some(resolution.value)))
        })
    }

    /// Every local row of `table`, tombstones included
    pub fn snapshot(&self, table: Table) -> Result<Vec<Record>> {
        self.store.scan(table)
    }

    /// Rows of `table` updated after `since`
    pub fn changed_since(&self, table: Table, since: &HlcTimestamp) -> Result<Vec<Record>> {
        self.store.query(table, &|r| r.meta().updated_at > *since)
    }
}
