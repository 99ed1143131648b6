//! In-memory store

use super::{EntityStore, WriteBatch};
use crate::audit::AuditRecord;
use crate::entity::Record;
use crate::types::{EntityId, Table};
use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
struct Tables {
    rows: BTreeMap<(Table, EntityId), Record>,
    audit: Vec<AuditRecord>,
}

/// Store backed by ordered maps behind a single lock
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite a stored audit record in place, bypassing the chain
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn tamper_audit_record(&self, sequence: u64, f: impl FnOnce(&mut AuditRecord)) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.audit.iter_mut().find(|r| r.sequence == sequence) {
            f(record);
        }
    }

    /// Drop every audit record past the first `len`
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn truncate_audit(&self, len: usize) {
        self.inner.write().audit.truncate(len);
    }

    /// Overwrite a row without auditing or versioning
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn put_raw(&self, record: Record) {
        self.inner.write().rows.insert((record.table(), record.id()), record);
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, table: Table, id: &EntityId) -> Result<Option<Record>> {
        Ok(self.inner.read().rows.get(&(table, *id)).cloned())
    }

    fn query(&self, table: Table, predicate: &dyn Fn(&Record) -> bool) -> Result<Vec<Record>> {
        let inner = self.inner.read();
        Ok(inner
            .rows
            .iter()
            .filter(|((t, _), record)| *t == table && predicate(record))
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.write();
        for record in batch.records {
            inner.rows.insert((record.table(), record.id()), record);
        }
        inner.audit.extend(batch.audit);
        inner.audit.sort_by_key(|r| r.sequence);
        Ok(())
    }

    fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.inner.read().audit.clone())
    }
}
