//! Storage layer
//!
//! The engine only needs a small key/value contract: fetch an entity by
//! table and id, scan a table, and commit a batch of entity writes together
//! with their audit records as one atomic unit. [`RocksStore`] is the
//! on-disk implementation; [`MemoryStore`] backs tests and embedded use.

mod memory;
mod store;

pub use memory::MemoryStore;
pub use store::RocksStore;

use crate::audit::AuditRecord;
use crate::entity::{Entity, Record};
use crate::types::{EntityId, Table};
use crate::Result;

/// Writes applied atomically by [`EntityStore::commit`]
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub records: Vec<Record>,
    pub audit: Vec<AuditRecord>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.audit.is_empty()
    }
}

/// Persistent entity store
///
/// Tombstoned entities are ordinary rows; filtering them out is the caller's
/// decision. Scans return rows ordered by id.
pub trait EntityStore: Send + Sync {
    fn get(&self, table: Table, id: &EntityId) -> Result<Option<Record>>;

    fn query(&self, table: Table, predicate: &dyn Fn(&Record) -> bool) -> Result<Vec<Record>>;

    /// Commit entity writes and audit records together, or nothing
    fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Audit records ordered by sequence
    fn audit_records(&self) -> Result<Vec<AuditRecord>>;

    fn upsert(&self, record: &Record) -> Result<()> {
        self.commit(WriteBatch {
            records: vec![record.clone()],
            audit: Vec::new(),
        })
    }

    fn scan(&self, table: Table) -> Result<Vec<Record>> {
        self.query(table, &|_| true)
    }
}

/// Typed point lookup
pub fn load<E: Entity>(store: &dyn EntityStore, id: &EntityId) -> Result<Option<E>> {
    Ok(store.get(E::TABLE, id)?.and_then(E::from_record))
}

/// All live (non-tombstoned) entities of one table
pub fn load_live<E: Entity>(store: &dyn EntityStore) -> Result<Vec<E>> {
    Ok(store
        .query(E::TABLE, &|r| !r.is_deleted())?
        .into_iter()
        .filter_map(E::from_record)
        .collect())
}
