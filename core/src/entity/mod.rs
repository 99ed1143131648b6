//! Replicated business entities
//!
//! Every table row is an entity: common replication metadata plus
//! CRDT-wrapped fields. Rows are never physically deleted; deletion is the
//! `is_deleted` tombstone register, which merges like any other field.

pub mod customer;
pub mod invoice;
pub mod ledger;

use crate::crdt::{HlcTimestamp, LwwRegister, VectorClock};
use crate::types::{EntityId, NodeId, Table};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use customer::Customer;
pub use invoice::{Invoice, InvoiceItem, InvoiceStatus};
pub use ledger::{Account, AccountType, AccountingTransaction, EntrySide, JournalEntry, TransactionStatus};

/// Replication metadata shared by all entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: EntityId,
    /// Node that created the entity
    pub node_id: NodeId,
    pub created_at: HlcTimestamp,
    pub updated_at: HlcTimestamp,
    pub version: VectorClock,
    pub is_deleted: LwwRegister<bool>,
}

impl EntityMeta {
    /// Metadata for a freshly created entity: `version = {origin: 1}`
    pub fn new(id: EntityId, timestamp: HlcTimestamp) -> Self {
        Self {
            id,
            node_id: timestamp.node_id.clone(),
            created_at: timestamp.clone(),
            updated_at: timestamp.clone(),
            version: VectorClock::initial(&timestamp.node_id),
            is_deleted: LwwRegister::new(false, timestamp),
        }
    }

    /// Record a local mutation issued at `timestamp`
    pub fn touch(&mut self, timestamp: &HlcTimestamp) {
        self.version.increment(&timestamp.node_id);
        if *timestamp > self.updated_at {
            self.updated_at = timestamp.clone();
        }
    }

    pub fn is_deleted(&self) -> bool {
        *self.is_deleted.get()
    }
}

/// A foreign-key style reference from one entity to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub table: Table,
    pub id: EntityId,
}

/// Typed entity stored in one table
pub trait Entity: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: Table;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Merge every CRDT field with the other version's; metadata is left as
    /// self's and reconciled by the resolver.
    fn merge_fields(&self, other: &Self) -> Self;

    fn into_record(self) -> Record;

    fn from_record(record: Record) -> Option<Self>;

    /// Outgoing references checked by the integrity service
    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn id(&self) -> EntityId {
        self.meta().id
    }

    fn is_deleted(&self) -> bool {
        self.meta().is_deleted()
    }
}

/// Any entity, tagged by table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Customer(Customer),
    Invoice(Invoice),
    InvoiceItem(InvoiceItem),
    Account(Account),
    Transaction(AccountingTransaction),
    JournalEntry(JournalEntry),
}

macro_rules! with_entity {
    ($record:expr, $e:ident => $body:expr) => {
        match $record {
            Record::Customer($e) => $body,
            Record::Invoice($e) => $body,
            Record::InvoiceItem($e) => $body,
            Record::Account($e) => $body,
            Record::Transaction($e) => $body,
            Record::JournalEntry($e) => $body,
        }
    };
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Customer(_) => Customer::TABLE,
            Record::Invoice(_) => Invoice::TABLE,
            Record::InvoiceItem(_) => InvoiceItem::TABLE,
            Record::Account(_) => Account::TABLE,
            Record::Transaction(_) => AccountingTransaction::TABLE,
            Record::JournalEntry(_) => JournalEntry::TABLE,
        }
    }

    pub fn meta(&self) -> &EntityMeta {
        with_entity!(self, e => e.meta())
    }

    pub fn id(&self) -> EntityId {
        self.meta().id
    }

    pub fn is_deleted(&self) -> bool {
        self.meta().is_deleted()
    }

    pub fn references(&self) -> Vec<Reference> {
        with_entity!(self, e => e.references())
    }

    /// JSON form of the entity itself (without the table tag)
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(with_entity!(self, e => serde_json::to_value(e)?))
    }

    /// Decode an entity exported from `table`
    pub fn from_json(table: Table, value: serde_json::Value) -> Result<Self> {
        let record = match table {
            Table::Customers => Record::Customer(serde_json::from_value(value)?),
            Table::Invoices => Record::Invoice(serde_json::from_value(value)?),
            Table::InvoiceItems => Record::InvoiceItem(serde_json::from_value(value)?),
            Table::Accounts => Record::Account(serde_json::from_value(value)?),
            Table::Transactions => Record::Transaction(serde_json::from_value(value)?),
            Table::JournalEntries => Record::JournalEntry(serde_json::from_value(value)?),
        };
        Ok(record)
    }

    /// Binary encoding used by the persistent store
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(format!("Failed to encode record: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(format!("Failed to decode record: {}", e)))
    }

    /// BLAKE3 digest of the binary encoding
    ///
    /// All CRDT state uses ordered maps, so equal states give equal digests
    /// on every node.
    pub fn content_digest(&self) -> Result<String> {
        let bytes = self.to_bytes()?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Money;

    fn ts(physical: u64, node: &str) -> HlcTimestamp {
        HlcTimestamp::new(physical, 0, node)
    }

    #[test]
    fn test_meta_new_and_touch() {
        let mut meta = EntityMeta::new(EntityId::new(), ts(100, "a"));
        assert_eq!(meta.version.get(&NodeId::from("a")), 1);
        assert!(!meta.is_deleted());

        meta.touch(&ts(200, "b"));
        assert_eq!(meta.version.get(&NodeId::from("b")), 1);
        assert_eq!(meta.updated_at, ts(200, "b"));
        assert_eq!(meta.created_at, ts(100, "a"));
    }

    #[test]
    fn test_record_json_roundtrip_keeps_table() {
        let customer = Customer::new("Acme", ts(100, "a"));
        let record = customer.clone().into_record();
        assert_eq!(record.table(), Table::Customers);

        let json = record.to_json().unwrap();
        assert!(json.get("name").is_some());
        let back = Record::from_json(Table::Customers, json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_from_json_wrong_table_fails() {
        let item = InvoiceItem::new(EntityId::new(), "Widget", 2, Money(500), ts(1, "a"));
        let json = item.into_record().to_json().unwrap();
        assert!(Record::from_json(Table::Customers, json).is_err());
    }

    #[test]
    fn test_content_digest_is_stable() {
        let record = Customer::new("Acme", ts(100, "a")).into_record();
        let again = record.clone();
        assert_eq!(record.content_digest().unwrap(), again.content_digest().unwrap());
    }
}
