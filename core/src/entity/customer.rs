//! Customer records

use super::{Entity, EntityMeta, Record};
use crate::crdt::{HlcTimestamp, LwwRegister, Mergeable, OrSet, PnCounter};
use crate::types::{EntityId, Table};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub meta: EntityMeta,
    pub name: LwwRegister<String>,
    pub email: LwwRegister<Option<String>>,
    pub phone: LwwRegister<Option<String>>,
    pub address: LwwRegister<Option<String>>,
    /// Free-form labels ("vip", "wholesale", ...)
    pub tags: OrSet<String>,
    pub loyalty_points: PnCounter,
}

impl Customer {
    pub fn new(name: impl Into<String>, timestamp: HlcTimestamp) -> Self {
        Self::with_id(EntityId::new(), name, timestamp)
    }

    pub fn with_id(id: EntityId, name: impl Into<String>, timestamp: HlcTimestamp) -> Self {
        Self {
            meta: EntityMeta::new(id, timestamp.clone()),
            name: LwwRegister::new(name.into(), timestamp.clone()),
            email: LwwRegister::new(None, timestamp.clone()),
            phone: LwwRegister::new(None, timestamp.clone()),
            address: LwwRegister::new(None, timestamp),
            tags: OrSet::new(),
            loyalty_points: PnCounter::new(),
        }
    }
}

impl Entity for Customer {
    const TABLE: Table = Table::Customers;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn merge_fields(&self, other: &Self) -> Self {
        Self {
            meta: self.meta.clone(),
            name: self.name.merge(&other.name),
            email: self.email.merge(&other.email),
            phone: self.phone.merge(&other.phone),
            address: self.address.merge(&other.address),
            tags: self.tags.merge(&other.tags),
            loyalty_points: self.loyalty_points.merge(&other.loyalty_points),
        }
    }

    fn into_record(self) -> Record {
        Record::Customer(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Customer(c) => Some(c),
            _ => None,
        }
    }
}
