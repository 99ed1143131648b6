//! RocksDB-based persistent storage

use super::{EntityStore, WriteBatch};
use crate::audit::AuditRecord;
use crate::entity::Record;
use crate::types::{EntityId, Table};
use crate::{Error, Result};
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;

/// Entities and the audit trail in one RocksDB instance
///
/// Keys:
/// - `entity:<table>:<uuid bytes>` -> bincode [`Record`]
/// - `audit:<sequence u64 BE>` -> JSON [`AuditRecord`]
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        Ok(Self { db })
    }

    // Key construction helpers
    fn table_prefix(table: Table) -> Vec<u8> {
        let mut prefix = b"entity:".to_vec();
        prefix.extend_from_slice(table.name().as_bytes());
        prefix.push(b':');
        prefix
    }

    fn entity_key(table: Table, id: &EntityId) -> Vec<u8> {
        let mut key = Self::table_prefix(table);
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn audit_key(sequence: u64) -> Vec<u8> {
        let mut key = b"audit:".to_vec();
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }
}

impl EntityStore for RocksStore {
    fn get(&self, table: Table, id: &EntityId) -> Result<Option<Record>> {
        match self.db.get(Self::entity_key(table, id)) {
            Ok(Some(value)) => Ok(Some(Record::from_bytes(&value)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to get record: {}", e))),
        }
    }

    fn query(&self, table: Table, predicate: &dyn Fn(&Record) -> bool) -> Result<Vec<Record>> {
        let prefix = Self::table_prefix(table);
        let mut records = Vec::new();

        let iter = self.db.iterator(IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| Error::Storage(format!("Iterator error: {}", e)))?;

            // Stop once past this table's prefix
            if !key.starts_with(&prefix) {
                break;
            }

            let record = Record::from_bytes(&value)?;
            if predicate(&record) {
                records.push(record);
            }
        }

        Ok(records)
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut write = rocksdb::WriteBatch::default();

        for record in &batch.records {
            write.put(Self::entity_key(record.table(), &record.id()), record.to_bytes()?);
        }
        for audit in &batch.audit {
            write.put(Self::audit_key(audit.sequence), serde_json::to_vec(audit)?);
        }

        self.db
            .write(write)
            .map_err(|e| Error::Storage(format!("Failed to commit batch: {}", e)))
    }

    fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        let prefix = b"audit:".to_vec();
        let mut records = Vec::new();

        let iter = self.db.iterator(IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| Error::Storage(format!("Iterator error: {}", e)))?;
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(serde_json::from_slice(&value)?);
        }

        Ok(records)
    }
}
