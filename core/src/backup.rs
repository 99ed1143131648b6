//! JSON export and import of the whole dataset
//!
//! Exports carry full CRDT state (timestamps, version vectors, tombstones),
//! so importing goes through the sync path: rows are merged by id, and
//! importing the same document twice changes nothing.

use crate::entity::Record;
use crate::integrity::{DataIntegrityService, HealthReport};
use crate::storage::EntityStore;
use crate::sync::{SyncEngine, SyncReport};
use crate::types::{NodeId, Table};
use crate::version::{is_backup_compatible, BACKUP_FORMAT_VERSION, VERSION};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Backup format version
    pub version: u32,
    pub app_version: String,
    pub node_id: NodeId,
    pub export_timestamp: DateTime<Utc>,
    pub health_report: Option<HealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDocument {
    pub metadata: BackupMetadata,
    /// Table name to entity JSON
    pub tables: BTreeMap<String, Vec<Value>>,
}

impl BackupDocument {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| Error::Storage(format!("Failed to write backup {}: {}", path.display(), e)))
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Storage(format!("Failed to read backup {}: {}", path.display(), e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn record_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub source_node: Option<NodeId>,
    pub tables: BTreeMap<String, SyncReport>,
}

pub struct BackupService {
    node_id: NodeId,
    store: Arc<dyn EntityStore>,
    sync: Arc<SyncEngine>,
    integrity: Arc<DataIntegrityService>,
}

impl BackupService {
    pub fn new(
        node_id: NodeId,
        store: Arc<dyn EntityStore>,
        sync: Arc<SyncEngine>,
        integrity: Arc<DataIntegrityService>,
    ) -> Self {
        Self {
            node_id,
            store,
            sync,
            integrity,
        }
    }

    /// Snapshot every table, tombstones included, with a health report
    pub fn export(&self) -> Result<BackupDocument> {
        let mut tables = BTreeMap::new();
        for table in Table::ALL {
            let rows = self
                .store
                .scan(table)?
                .iter()
                .map(Record::to_json)
                .collect::<Result<Vec<_>>>()?;
            tables.insert(table.name().to_string(), rows);
        }

        let document = BackupDocument {
            metadata: BackupMetadata {
                version: BACKUP_FORMAT_VERSION,
                app_version: VERSION.to_string(),
                node_id: self.node_id.clone(),
                export_timestamp: Utc::now(),
                health_report: Some(self.integrity.health_report()?),
            },
            tables,
        };

        tracing::info!(records = document.record_count(), "Exported backup");
        Ok(document)
    }

    /// Merge a backup into the local store
    pub fn import(&self, document: &BackupDocument) -> Result<ImportReport> {
        if !is_backup_compatible(document.metadata.version) {
            return Err(Error::Serialization(format!(
                "Unsupported backup format version {} (expected {})",
                document.metadata.version, BACKUP_FORMAT_VERSION
            )));
        }

        // Decode everything before applying anything
        let mut decoded = Vec::new();
        for (name, rows) in &document.tables {
            let table: Table = name.parse()?;
            let records = rows
                .iter()
                .map(|row| Record::from_json(table, row.clone()))
                .collect::<Result<Vec<_>>>()?;
            decoded.push((table, records));
        }
        decoded.sort_by_key(|(table, _)| Table::ALL.iter().position(|t| t == table));

        let mut report = ImportReport {
            source_node: Some(document.metadata.node_id.clone()),
            ..Default::default()
        };
        for (table, records) in decoded {
            let result = self.sync.apply_remote_batch(table, records)?;
            report.tables.insert(table.name().to_string(), result.report);
        }

        tracing::info!(
            source = %document.metadata.node_id,
            records = document.record_count(),
            "Imported backup"
        );
        Ok(report)
    }
}
