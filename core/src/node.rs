//! A BizSync node: one device's store plus every service over it
//!
//! Services are built once here and shared through `Arc`s.

use crate::accounting::DoubleEntryService;
use crate::audit::AuditService;
use crate::backup::BackupService;
use crate::config::NodeConfig;
use crate::crdt::HybridLogicalClock;
use crate::integrity::DataIntegrityService;
use crate::storage::{EntityStore, RocksStore};
use crate::sync::SyncEngine;
use crate::transaction::TransactionManager;
use crate::types::NodeId;
use crate::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Node {
    config: NodeConfig,
    node_id: NodeId,
    clock: Arc<HybridLogicalClock>,
    store: Arc<dyn EntityStore>,
    audit: Arc<AuditService>,
    transactions: Arc<TransactionManager>,
    ledger: Arc<DoubleEntryService>,
    integrity: Arc<DataIntegrityService>,
    sync: Arc<SyncEngine>,
    backup: BackupService,
}

impl Node {
    /// Open a node backed by RocksDB under `config.data_dir`
    pub fn open(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let node_id = config.resolve_node_id()?;
        let store = Arc::new(RocksStore::open(config.data_dir.join("db"))?);
        let clock = HybridLogicalClock::new(node_id);
        Self::with_parts(config, store, clock)
    }

    /// Assemble a node over any store and clock
    pub fn with_parts(config: NodeConfig, store: Arc<dyn EntityStore>, clock: HybridLogicalClock) -> Result<Self> {
        let node_id = clock.node_id().clone();
        let clock = Arc::new(clock);

        let audit = Arc::new(AuditService::open(store.clone(), clock.clone())?);
        let transactions = Arc::new(TransactionManager::new(store.clone(), clock.clone(), audit.clone()));
        let ledger = Arc::new(DoubleEntryService::new(store.clone(), transactions.clone()));
        let integrity = Arc::new(DataIntegrityService::new(
            store.clone(),
            audit.clone(),
            ledger.clone(),
            config.low_severity_fair_threshold,
        ));
        let sync = Arc::new(SyncEngine::new(store.clone(), clock.clone(), transactions.clone()));
        let backup = BackupService::new(node_id.clone(), store.clone(), sync.clone(), integrity.clone());

        tracing::info!(%node_id, audit_records = audit.len(), "Node started");

        Ok(Self {
            config,
            node_id,
            clock,
            store,
            audit,
            transactions,
            ledger,
            integrity,
            sync,
            backup,
        })
    }

    /// Start background integrity checks at the configured interval
    pub fn start_integrity_checks(&self) -> JoinHandle<()> {
        self.integrity.spawn_periodic_checks(self.config.integrity_interval())
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<HybridLogicalClock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn audit(&self) -> &Arc<AuditService> {
        &self.audit
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn ledger(&self) -> &Arc<DoubleEntryService> {
        &self.ledger
    }

    pub fn integrity(&self) -> &Arc<DataIntegrityService> {
        &self.integrity
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    pub fn backup(&self) -> &BackupService {
        &self.backup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Customer;
    use crate::storage::MemoryStore;
    use crate::types::Table;
    use tempfile::TempDir;

    #[test]
    fn test_open_persists_identity_and_audit_head() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let (node_id, head) = {
            let node = Node::open(config.clone()).unwrap();
            node.ledger().seed_default_chart().unwrap();
            (node.node_id().clone(), node.audit().head_hash())
        };

        let node = Node::open(config).unwrap();
        assert_eq!(node.node_id(), &node_id);
        assert_eq!(node.audit().head_hash(), head);
        assert!(node.audit().verify_integrity().unwrap().is_valid);
    }

    #[test]
    fn test_backup_roundtrip_between_nodes() {
        let source = Node::with_parts(
            NodeConfig::default(),
            Arc::new(MemoryStore::new()),
            HybridLogicalClock::new(NodeId::from("source")),
        )
        .unwrap();
        source.ledger().seed_default_chart().unwrap();
        source
            .transactions()
            .run_in_transaction(|tx| tx.insert(Customer::new("Acme", tx.tick())))
            .unwrap();

        let document = source.backup().export().unwrap();
        assert_eq!(document.record_count(), 9);
        assert!(document.metadata.health_report.is_some());

        let target = Node::with_parts(
            NodeConfig::default(),
            Arc::new(MemoryStore::new()),
            HybridLogicalClock::new(NodeId::from("target")),
        )
        .unwrap();
        let report = target.backup().import(&document).unwrap();
        assert_eq!(report.tables["accounts"].inserted, 8);
        assert_eq!(target.store().scan(Table::Customers).unwrap().len(), 1);

        // Second import is a no-op
        let again = target.backup().import(&document).unwrap();
        assert_eq!(again.tables["accounts"].unchanged, 8);
        assert_eq!(target.store().scan(Table::Accounts).unwrap(), source.store().scan(Table::Accounts).unwrap());
    }

    #[test]
    fn test_incompatible_backup_rejected() {
        let node = Node::with_parts(
            NodeConfig::default(),
            Arc::new(MemoryStore::new()),
            HybridLogicalClock::new(NodeId::from("n")),
        )
        .unwrap();
        let mut document = node.backup().export().unwrap();
        document.metadata.version += 1;

        assert!(node.backup().import(&document).is_err());
    }
}
