//! Append-only, hash-chained audit trail
//!
//! Every mutation appends one [`AuditRecord`]. Each record's hash covers the
//! previous record's hash plus a canonical JSON encoding of its own fields,
//! so altering any stored record breaks the chain from that point on.
//! Verification walks from genesis and reports the first break; it never
//! repairs anything.

use crate::crdt::{HlcTimestamp, HybridLogicalClock};
use crate::storage::{EntityStore, WriteBatch};
use crate::types::{EntityId, Table, TransactionId};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// `prev_hash` of the first record (32 zero bytes, hex)
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Create,
    Update,
    Delete,
}

/// A sealed, chained audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    /// Position in the chain, starting at 0
    pub sequence: u64,
    pub table_name: Table,
    pub record_id: EntityId,
    pub event_type: AuditEventType,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub timestamp: HlcTimestamp,
    pub transaction_id: Option<TransactionId>,
    pub prev_hash: String,
    pub hash: String,
}

/// Fields covered by the hash, in canonical order
#[derive(Serialize)]
struct CanonicalFields<'a> {
    id: &'a Uuid,
    sequence: u64,
    table_name: &'a Table,
    record_id: &'a EntityId,
    event_type: &'a AuditEventType,
    old_values: &'a Option<Value>,
    new_values: &'a Option<Value>,
    timestamp: &'a HlcTimestamp,
    transaction_id: &'a Option<TransactionId>,
}

impl AuditRecord {
    /// Canonical serialization of everything except the chain links
    ///
    /// JSON objects inside `old_values`/`new_values` keep sorted keys, so the
    /// encoding is stable across nodes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let fields = CanonicalFields {
            id: &self.id,
            sequence: self.sequence,
            table_name: &self.table_name,
            record_id: &self.record_id,
            event_type: &self.event_type,
            old_values: &self.old_values,
            new_values: &self.new_values,
            timestamp: &self.timestamp,
            transaction_id: &self.transaction_id,
        };
        Ok(serde_json::to_vec(&fields)?)
    }

    /// SHA-256(prev_hash ‖ canonical fields), hex encoded
    pub fn compute_hash(&self) -> Result<String> {
        let prev = hex::decode(&self.prev_hash)
            .map_err(|e| Error::Serialization(format!("Invalid prev_hash: {}", e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&prev);
        hasher.update(self.canonical_bytes()?);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// An event waiting to be sealed into the chain
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub table: Table,
    pub record_id: EntityId,
    pub event_type: AuditEventType,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub timestamp: HlcTimestamp,
}

/// Why verification stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBreakReason {
    /// Stored hash does not match the recomputed one (record altered)
    HashMismatch,
    /// prev_hash does not point at the preceding record's hash
    BrokenLink,
    /// A sequence number is missing or out of order
    SequenceGap,
    /// Records this service appended are missing from the end of the log
    Truncated,
}

/// Where verification stopped
///
/// For [`ChainBreakReason::Truncated`], `sequence` is the first missing
/// sequence and `record_id` the last record still stored (nil if none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub sequence: u64,
    pub record_id: Uuid,
    pub reason: ChainBreakReason,
}

/// Outcome of [`AuditService::verify_integrity`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerification {
    pub is_valid: bool,
    pub records_checked: u64,
    pub broken_at: Option<ChainBreak>,
}

#[derive(Debug, Clone)]
struct ChainHead {
    next_sequence: u64,
    hash: String,
}

impl ChainHead {
    fn genesis() -> Self {
        Self {
            next_sequence: 0,
            hash: GENESIS_HASH.to_string(),
        }
    }
}

/// Audit trail writer and verifier
pub struct AuditService {
    store: Arc<dyn EntityStore>,
    clock: Arc<HybridLogicalClock>,
    head: Mutex<ChainHead>,
}

impl AuditService {
    /// Open the trail, resuming from the last stored record
    pub fn open(store: Arc<dyn EntityStore>, clock: Arc<HybridLogicalClock>) -> Result<Self> {
        let head = match store.audit_records()?.last() {
            Some(last) => ChainHead {
                next_sequence: last.sequence + 1,
                hash: last.hash.clone(),
            },
            None => ChainHead::genesis(),
        };

        tracing::debug!(next_sequence = head.next_sequence, "Audit trail opened");

        Ok(Self {
            store,
            clock,
            head: Mutex::new(head),
        })
    }

    /// Append a single event outside of any transaction
    pub fn log_event(
        &self,
        table: Table,
        record_id: EntityId,
        event_type: AuditEventType,
        old_values: Option<Value>,
        new_values: Option<Value>,
        transaction_id: Option<TransactionId>,
    ) -> Result<AuditRecord> {
        let event = AuditEvent {
            table,
            record_id,
            event_type,
            old_values,
            new_values,
            timestamp: self.clock.tick(),
        };

        let mut sealed = self.append_with(vec![event], transaction_id, |records| {
            self.store.commit(WriteBatch {
                records: Vec::new(),
                audit: records,
            })
        })?;

        sealed
            .pop()
            .ok_or_else(|| Error::Storage("Audit append produced no record".to_string()))
    }

    /// Seal `events` onto the chain and hand them to `persist`
    ///
    /// The head only advances if `persist` succeeds, so a failed commit
    /// leaves the chain untouched.
    pub(crate) fn append_with<F>(
        &self,
        events: Vec<AuditEvent>,
        transaction_id: Option<TransactionId>,
        persist: F,
    ) -> Result<Vec<AuditRecord>>
    where
        F: FnOnce(Vec<AuditRecord>) -> Result<()>,
    {
        let mut head = self.head.lock();
        let mut next = head.clone();
        let mut sealed = Vec::with_capacity(events.len());

        for event in events {
            let mut record = AuditRecord {
                id: Uuid::new_v4(),
                sequence: next.next_sequence,
                table_name: event.table,
                record_id: event.record_id,
                event_type: event.event_type,
                old_values: event.old_values,
                new_values: event.new_values,
                timestamp: event.timestamp,
                transaction_id,
                prev_hash: next.hash.clone(),
                hash: String::new(),
            };
            record.hash = record.compute_hash()?;

            next = ChainHead {
                next_sequence: record.sequence + 1,
                hash: record.hash.clone(),
            };
            sealed.push(record);
        }

        persist(sealed.clone())?;
        *head = next;

        Ok(sealed)
    }

    /// Walk the chain from genesis, recomputing every hash, and check it
    /// still ends at the head this service last appended
    pub fn verify_integrity(&self) -> Result<AuditVerification> {
        let (records, head) = {
            let head = self.head.lock();
            (self.store.audit_records()?, head.clone())
        };
        let mut expected_prev = GENESIS_HASH.to_string();
        let mut checked = 0u64;

        for (expected_sequence, record) in (0u64..).zip(records.iter()) {
            let reason = if record.sequence != expected_sequence {
                Some(ChainBreakReason::SequenceGap)
            } else if record.prev_hash != expected_prev {
                Some(ChainBreakReason::BrokenLink)
            } else if record.compute_hash()? != record.hash {
                Some(ChainBreakReason::HashMismatch)
            } else {
                None
            };

            if let Some(reason) = reason {
                tracing::error!(
                    sequence = record.sequence,
                    record_id = %record.id,
                    ?reason,
                    "Audit chain broken"
                );
                return Ok(AuditVerification {
                    is_valid: false,
                    records_checked: checked,
                    broken_at: Some(ChainBreak {
                        sequence: record.sequence,
                        record_id: record.id,
                        reason,
                    }),
                });
            }

            expected_prev = record.hash.clone();
            checked += 1;
        }

        if checked != head.next_sequence || expected_prev != head.hash {
            tracing::error!(
                stored = checked,
                expected = head.next_sequence,
                "Audit chain truncated"
            );
            return Ok(AuditVerification {
                is_valid: false,
                records_checked: checked,
                broken_at: Some(ChainBreak {
                    sequence: checked,
                    record_id: records.last().map_or(Uuid::nil(), |r| r.id),
                    reason: ChainBreakReason::Truncated,
                }),
            });
        }

        Ok(AuditVerification {
            is_valid: true,
            records_checked: checked,
            broken_at: None,
        })
    }

    /// Verify and surface a break as an error
    pub fn ensure_intact(&self) -> Result<()> {
        let verification = self.verify_integrity()?;
        match verification.broken_at {
            None => Ok(()),
            Some(b) => Err(Error::AuditChainBroken {
                sequence: b.sequence,
                reason: format!("{:?} at record {}", b.reason, b.record_id),
            }),
        }
    }

    /// All records in chain order
    pub fn records(&self) -> Result<Vec<AuditRecord>> {
        self.store.audit_records()
    }

    /// Events for one entity, oldest first
    pub fn history(&self, table: Table, record_id: &EntityId) -> Result<Vec<AuditRecord>> {
        Ok(self
            .store
            .audit_records()?
            .into_iter()
            .filter(|r| r.table_name == table && r.record_id == *record_id)
            .collect())
    }

    /// Hash of the latest record (genesis when empty)
    pub fn head_hash(&self) -> String {
        self.head.lock().hash.clone()
    }

    pub fn len(&self) -> u64 {
        self.head.lock().next_sequence
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
