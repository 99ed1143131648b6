//! Deterministic conflict resolution
//!
//! Given the local and a remote version of the same entity, pick or build the
//! merged version. The result depends only on the two inputs: no clock reads,
//! no randomness, no node-local state. Every replica that resolves the same
//! pair produces a bit-identical entity, which is what lets replicas converge
//! without a coordinator.

use super::{CausalOrder, Mergeable};
use crate::entity::{Entity, EntityMeta, Record};
use crate::{Error, Result};

/// Which side the resolver kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Local version dominates (or histories are identical)
    KeptLocal,
    /// Remote version strictly newer
    TookRemote,
    /// Concurrent versions merged field by field
    Merged,
}

/// Resolved entity plus how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    pub value: T,
    pub outcome: MergeOutcome,
}

/// Stateless resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve two versions of the same entity
    pub fn resolve<E: Entity>(&self, local: &E, remote: &E) -> Result<E> {
        Ok(self.resolve_with_outcome(local, remote)?.value)
    }

    pub fn resolve_with_outcome<E: Entity>(&self, local: &E, remote: &E) -> Result<Resolution<E>> {
        if local.id() != remote.id() {
            return Err(Error::MergeConflict(format!(
                "{} ids differ: {} vs {}",
                E::TABLE,
                local.id(),
                remote.id()
            )));
        }

        let resolution = match local.meta().version.compare(&remote.meta().version) {
            CausalOrder::Before => Resolution {
                value: remote.clone(),
                outcome: MergeOutcome::TookRemote,
            },
            CausalOrder::After | CausalOrder::Equal => Resolution {
                value: local.clone(),
                outcome: MergeOutcome::KeptLocal,
            },
            CausalOrder::Concurrent => {
                let mut merged = local.merge_fields(remote);
                *merged.meta_mut() = merge_meta(local.meta(), remote.meta());
                Resolution {
                    value: merged,
                    outcome: MergeOutcome::Merged,
                }
            }
        };

        Ok(resolution)
    }

    /// Resolve two records of any table
    pub fn resolve_record(&self, local: &Record, remote: &Record) -> Result<Resolution<Record>> {
        fn lift<E: Entity>(r: Resolution<E>) -> Resolution<Record> {
            Resolution {
                value: r.value.into_record(),
                outcome: r.outcome,
            }
        }

        match (local, remote) {
            (Record::Customer(l), Record::Customer(r)) => self.resolve_with_outcome(l, r).map(lift),
            (Record::Invoice(l), Record::Invoice(r)) => self.resolve_with_outcome(l, r).map(lift),
            (Record::InvoiceItem(l), Record::InvoiceItem(r)) => self.resolve_with_outcome(l, r).map(lift),
            (Record::Account(l), Record::Account(r)) => self.resolve_with_outcome(l, r).map(lift),
            (Record::Transaction(l), Record::Transaction(r)) => self.resolve_with_outcome(l, r).map(lift),
            (Record::JournalEntry(l), Record::JournalEntry(r)) => self.resolve_with_outcome(l, r).map(lift),
            _ => Err(Error::MergeConflict(format!(
                "table mismatch for {}: {} vs {}",
                local.id(),
                local.table(),
                remote.table()
            ))),
        }
    }
}

/// Metadata of a concurrent merge
///
/// Origin and creation time come from the earlier creation (both sides agree
/// unless the input is corrupt); everything else merges.
fn merge_meta(local: &EntityMeta, remote: &EntityMeta) -> EntityMeta {
    let origin = if local.created_at <= remote.created_at { local } else { remote };

    EntityMeta {
        id: local.id,
        node_id: origin.node_id.clone(),
        created_at: origin.created_at.clone(),
        updated_at: local.updated_at.clone().max(remote.updated_at.clone()),
        version: local.version.merge(&remote.version),
        is_deleted: local.is_deleted.merge(&remote.is_deleted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::HlcTimestamp;
    use crate::entity::{Customer, InvoiceItem};
    use crate::types::{EntityId, Money, NodeId};

    fn ts(physical: u64, node: &str) -> HlcTimestamp {
        HlcTimestamp::new(physical, 0, node)
    }

    /// Apply a local edit the way the transaction layer does
    fn edit(customer: &mut Customer, at: HlcTimestamp, f: impl FnOnce(&mut Customer, &HlcTimestamp)) {
        f(customer, &at);
        customer.meta.touch(&at);
    }

    #[test]
    fn test_acme_scenario_later_hlc_wins() {
        let base = Customer::new("Acme", ts(1_000, "node-a"));

        let mut on_a = base.clone();
        edit(&mut on_a, ts(2_000, "node-a"), |c, t| c.name.set("Acme".into(), t.clone()));

        let mut on_b = base.clone();
        edit(&mut on_b, ts(2_500, "node-b"), |c, t| c.name.set("Acme Pte Ltd".into(), t.clone()));

        let resolver = ConflictResolver::new();
        let merged_on_a = resolver.resolve_with_outcome(&on_a, &on_b).unwrap();
        let merged_on_b = resolver.resolve_with_outcome(&on_b, &on_a).unwrap();

        assert_eq!(merged_on_a.outcome, MergeOutcome::Merged);
        assert_eq!(merged_on_a.value.name.get(), "Acme Pte Ltd");
        assert_eq!(merged_on_a.value, merged_on_b.value);
        assert_eq!(
            merged_on_a.value.meta.version,
            on_a.meta.version.merge(&on_b.meta.version)
        );
        assert_eq!(merged_on_a.value.meta.updated_at, ts(2_500, "node-b"));
    }

    #[test]
    fn test_concurrent_edits_to_different_fields_both_survive() {
        let base = Customer::new("Acme", ts(1_000, "a"));

        let mut on_a = base.clone();
        edit(&mut on_a, ts(2_000, "a"), |c, t| c.email.set(Some("ops@acme.test".into()), t.clone()));
        let mut on_b = base.clone();
        edit(&mut on_b, ts(1_500, "b"), |c, t| c.phone.set(Some("+65 5555".into()), t.clone()));

        let merged = ConflictResolver.resolve(&on_a, &on_b).unwrap();
        assert_eq!(merged.email.get().as_deref(), Some("ops@acme.test"));
        assert_eq!(merged.phone.get().as_deref(), Some("+65 5555"));
    }

    #[test]
    fn test_causally_newer_remote_wins_even_with_older_field_stamp() {
        let base = Customer::new("Acme", ts(1_000, "a"));
        let mut remote = base.clone();
        edit(&mut remote, ts(900, "b"), |c, t| c.name.set("Renamed".into(), t.clone()));

        let resolution = ConflictResolver.resolve_with_outcome(&base, &remote).unwrap();
        assert_eq!(resolution.outcome, MergeOutcome::TookRemote);
        assert_eq!(resolution.value.name.get(), "Renamed");

        let back = ConflictResolver.resolve_with_outcome(&remote, &base).unwrap();
        assert_eq!(back.outcome, MergeOutcome::KeptLocal);
    }

    #[test]
    fn test_equal_versions_keep_local() {
        let base = Customer::new("Acme", ts(1_000, "a"));
        let resolution = ConflictResolver.resolve_with_outcome(&base, &base.clone()).unwrap();
        assert_eq!(resolution.outcome, MergeOutcome::KeptLocal);
        assert_eq!(resolution.value, base);
    }

    #[test]
    fn test_concurrent_delete_and_edit_merge_tombstone() {
        let base = Customer::new("Acme", ts(1_000, "a"));

        let mut deleted = base.clone();
        edit(&mut deleted, ts(3_000, "a"), |c, t| c.meta.is_deleted.set(true, t.clone()));
        let mut edited = base.clone();
        edit(&mut edited, ts(2_000, "b"), |c, t| c.name.set("Acme Holdings".into(), t.clone()));

        let merged = ConflictResolver.resolve(&edited, &deleted).unwrap();
        assert!(merged.meta.is_deleted());
        assert_eq!(merged.name.get(), "Acme Holdings");
        assert_eq!(merged.meta.version.get(&NodeId::from("a")), 2);
        assert_eq!(merged.meta.version.get(&NodeId::from("b")), 1);
    }

    #[test]
    fn test_mismatched_ids_are_rejected() {
        let a = Customer::new("Acme", ts(1, "a"));
        let b = Customer::new("Acme", ts(1, "a"));
        assert!(matches!(ConflictResolver.resolve(&a, &b), Err(Error::MergeConflict(_))));
    }

    #[test]
    fn test_resolve_record_table_mismatch() {
        let customer = Customer::with_id(EntityId::new(), "Acme", ts(1, "a")).into_record();
        let item = InvoiceItem::new(EntityId::new(), "Widget", 1, Money(100), ts(1, "a")).into_record();
        assert!(ConflictResolver.resolve_record(&customer, &item).is_err());
    }
}
