//! Atomic units of work
//!
//! A transaction buffers every entity write and its audit event in a
//! [`TxContext`]. On success the buffered writes and the sealed audit records
//! go to the store as one batch; on failure nothing is written and the audit
//! chain does not move. Writes are serialized through a single writer lock,
//! and readers only ever see committed state.
//!
//! Nesting is flattened: [`TxContext::nested`] runs a body inside the
//! enclosing transaction. If a nested body fails, its own writes are dropped
//! and the whole transaction is marked rollback-only, even when the caller
//! swallows the error.

use crate::audit::{AuditEvent, AuditEventType, AuditService};
use crate::crdt::{HlcTimestamp, HybridLogicalClock};
use crate::entity::{Entity, Record};
use crate::storage::{EntityStore, WriteBatch};
use crate::types::{EntityId, Table, TransactionId};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Runs closures as atomic transactions
pub struct TransactionManager {
    store: Arc<dyn EntityStore>,
    clock: Arc<HybridLogicalClock>,
    audit: Arc<AuditService>,
    writer: Mutex<()>,
}

impl TransactionManager {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<HybridLogicalClock>, audit: Arc<AuditService>) -> Self {
        Self {
            store,
            clock,
            audit,
            writer: Mutex::new(()),
        }
    }

    /// Run `body` atomically
    ///
    /// Must not be called from inside another transaction body on the same
    /// manager; use [`TxContext::nested`] instead.
    pub fn run_in_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&mut TxContext<'_>) -> Result<T>,
    {
        let _writer = self.writer.lock();
        let mut tx = TxContext::new(self.store.as_ref(), &self.clock);
        let transaction_id = tx.id;

        tracing::trace!(%transaction_id, "Transaction started");

        match body(&mut tx) {
            Ok(value) => {
                self.commit(tx)?;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(
                    %transaction_id,
                    error = %e,
                    discarded_writes = tx.writes.len(),
                    "Transaction rolled back"
                );
                Err(e)
            }
        }
    }

    fn commit(&self, tx: TxContext<'_>) -> Result<()> {
        let transaction_id = tx.id;

        if let Some(reason) = tx.rollback_only {
            tracing::warn!(%transaction_id, %reason, "Transaction rolled back after nested failure");
            return Err(Error::TransactionFailure { transaction_id, reason });
        }

        if tx.writes.is_empty() {
            return Ok(());
        }

        let records: Vec<Record> = tx.writes.into_values().collect();
        let record_count = records.len();

        self.audit
            .append_with(tx.events, Some(transaction_id), |audit| {
                self.store.commit(WriteBatch { records, audit })
            })
            .map_err(|e| {
                tracing::error!(%transaction_id, error = %e, "Transaction commit failed");
                Error::TransactionFailure {
                    transaction_id,
                    reason: e.to_string(),
                }
            })?;

        tracing::debug!(%transaction_id, records = record_count, "Transaction committed");
        Ok(())
    }
}

/// Buffered view of the store inside one transaction
pub struct TxContext<'a> {
    id: TransactionId,
    store: &'a dyn EntityStore,
    clock: &'a HybridLogicalClock,
    writes: BTreeMap<(Table, EntityId), Record>,
    events: Vec<AuditEvent>,
    depth: usize,
    rollback_only: Option<String>,
}

impl<'a> TxContext<'a> {
    fn new(store: &'a dyn EntityStore, clock: &'a HybridLogicalClock) -> Self {
        Self {
            id: TransactionId::new(),
            store,
            clock,
            writes: BTreeMap::new(),
            events: Vec::new(),
            depth: 0,
            rollback_only: None,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Fresh timestamp for a mutation in this transaction
    pub fn tick(&self) -> HlcTimestamp {
        self.clock.tick()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.is_some()
    }

    /// Read a record, seeing this transaction's own writes
    pub fn get_record(&self, table: Table, id: &EntityId) -> Result<Option<Record>> {
        match self.writes.get(&(table, *id)) {
            Some(record) => Ok(Some(record.clone())),
            None => self.store.get(table, id),
        }
    }

    pub fn get<E: Entity>(&self, id: &EntityId) -> Result<Option<E>> {
        Ok(self.get_record(E::TABLE, id)?.and_then(E::from_record))
    }

    /// Like [`get`](Self::get) but tombstones and missing rows are `NotFound`
    pub fn require<E: Entity>(&self, id: &EntityId) -> Result<E> {
        match self.get::<E>(id)? {
            Some(entity) if !entity.is_deleted() => Ok(entity),
            _ => Err(Error::NotFound { table: E::TABLE, id: *id }),
        }
    }

    /// Live entities matching `predicate`, including uncommitted writes
    pub fn query<E: Entity>(&self, predicate: impl Fn(&E) -> bool) -> Result<Vec<E>> {
        let mut rows: BTreeMap<EntityId, Record> = self
            .store
            .scan(E::TABLE)?
            .into_iter()
            .map(|r| (r.id(), r))
            .collect();

        for ((table, id), record) in &self.writes {
            if *table == E::TABLE {
                rows.insert(*id, record.clone());
            }
        }

        Ok(rows
            .into_values()
            .filter_map(E::from_record)
            .filter(|e| !e.is_deleted() && predicate(e))
            .collect())
    }

    /// Insert a new entity built with a timestamp from [`tick`](Self::tick)
    pub fn insert<E: Entity>(&mut self, entity: E) -> Result<E> {
        let id = entity.id();
        if self.get_record(E::TABLE, &id)?.is_some() {
            return Err(Error::InvalidEntry(format!("{} {} already exists", E::TABLE, id)));
        }

        let record = entity.clone().into_record();
        self.events.push(AuditEvent {
            table: E::TABLE,
            record_id: id,
            event_type: AuditEventType::Create,
            old_values: None,
            new_values: Some(record.to_json()?),
            timestamp: entity.meta().updated_at.clone(),
        });
        self.writes.insert((E::TABLE, id), record);

        Ok(entity)
    }

    /// Mutate a live entity; `f` receives the mutation timestamp
    pub fn update<E, F>(&mut self, id: &EntityId, f: F) -> Result<E>
    where
        E: Entity,
        F: FnOnce(&mut E, &HlcTimestamp),
    {
        let mut entity = self.require::<E>(id)?;
        let old_values = entity.clone().into_record().to_json()?;

        let ts = self.tick();
        f(&mut entity, &ts);
        entity.meta_mut().touch(&ts);

        self.stage(entity.clone().into_record(), Some(old_values), AuditEventType::Update, ts)?;
        Ok(entity)
    }

    /// Tombstone a live entity
    pub fn delete<E: Entity>(&mut self, id: &EntityId) -> Result<E> {
        let mut entity = self.require::<E>(id)?;
        let old_values = entity.clone().into_record().to_json()?;

        let ts = self.tick();
        entity.meta_mut().is_deleted.set(true, ts.clone());
        entity.meta_mut().touch(&ts);

        self.stage(entity.clone().into_record(), Some(old_values), AuditEventType::Delete, ts)?;
        Ok(entity)
    }

    /// Write a merge result as-is (metadata already reconciled)
    pub fn put_merged(&mut self, merged: Record, previous: Option<&Record>) -> Result<()> {
        let event_type = match previous {
            None => AuditEventType::Create,
            Some(prev) if !prev.is_deleted() && merged.is_deleted() => AuditEventType::Delete,
            Some(_) => AuditEventType::Update,
        };
        let old_values = previous.map(Record::to_json).transpose()?;
        let ts = merged.meta().updated_at.clone();

        self.stage(merged, old_values, event_type, ts)
    }

    /// Run `body` as part of this transaction
    ///
    /// If `body` fails its buffered writes are discarded and the outer
    /// transaction becomes rollback-only.
    pub fn nested<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut TxContext<'a>) -> Result<T>,
    {
        let savepoint = (self.writes.clone(), self.events.len());

        self.depth += 1;
        let result = body(self);
        self.depth -= 1;

        if let Err(e) = &result {
            tracing::debug!(transaction_id = %self.id, depth = self.depth + 1, error = %e, "Nested body failed");
            let (writes, event_count) = savepoint;
            self.writes = writes;
            self.events.truncate(event_count);
            if self.rollback_only.is_none() {
                self.rollback_only = Some(e.to_string());
            }
        }
        result
    }

    fn stage(
        &mut self,
        record: Record,
        old_values: Option<serde_json::Value>,
        event_type: AuditEventType,
        timestamp: HlcTimestamp,
    ) -> Result<()> {
        let table = record.table();
        let id = record.id();

        self.events.push(AuditEvent {
            table,
            record_id: id,
            event_type,
            old_values,
            new_values: Some(record.to_json()?),
            timestamp,
        });
        self.writes.insert((table, id), record);
        Ok(())
    }
}
