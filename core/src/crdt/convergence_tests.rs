//! Property-based tests for CRDT convergence
//!
//! Tests that verify CRDT properties hold under various scenarios:
//! - Commutativity: merge order doesn't matter
//! - Associativity: merge grouping doesn't matter
//! - Idempotence: merging the same state again has no effect
//! - Determinism: resolving the same pair on different nodes gives identical bytes

use proptest::prelude::*;
use crate::crdt::{ConflictResolver, HlcTimestamp, HybridLogicalClock, LwwRegister, ManualClock, Mergeable, OrSet, PnCounter};
use crate::entity::{Customer, Entity};
use crate::types::NodeId;

fn arb_node() -> impl Strategy<Value = String> {
    prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())]
}

fn arb_timestamp() -> impl Strategy<Value = HlcTimestamp> {
    (0u64..50, 0u32..3, arb_node()).prop_map(|(p, l, n)| HlcTimestamp::new(p, l, n.as_str()))
}

fn arb_register() -> impl Strategy<Value = LwwRegister<i32>> {
    (0i32..10, arb_timestamp()).prop_map(|(v, ts)| LwwRegister::new(v, ts))
}

fn arb_counter() -> impl Strategy<Value = PnCounter> {
    prop::collection::vec((-20i64..20, arb_timestamp()), 0..8).prop_map(|ops| {
        let mut counter = PnCounter::new();
        for (delta, ts) in ops {
            counter.increment(delta, ts);
        }
        counter
    })
}

fn arb_orset() -> impl Strategy<Value = OrSet<u8>> {
    prop::collection::vec((0u8..4, arb_timestamp(), any::<bool>()), 0..8).prop_map(|ops| {
        let mut set = OrSet::new();
        for (value, ts, remove) in ops {
            if remove {
                set.remove(&value);
            } else {
                set.add(value, ts);
            }
        }
        set
    })
}

/// An edit applied to a customer replica
#[derive(Debug, Clone)]
enum Edit {
    Name(String),
    Email(Option<String>),
    Tag(String),
    Untag(String),
    Points(i64),
    Delete(bool),
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(Edit::Name),
        prop::option::of("[a-z]{1,4}@x\\.test").prop_map(Edit::Email),
        prop_oneof![Just("vip"), Just("trade")].prop_map(|t| Edit::Tag(t.to_string())),
        prop_oneof![Just("vip"), Just("trade")].prop_map(|t| Edit::Untag(t.to_string())),
        (-5i64..5).prop_map(Edit::Points),
        any::<bool>().prop_map(Edit::Delete),
    ]
}

/// Apply edits on a simulated node with its own HLC
fn replay(base: &Customer, node: &str, start: u64, edits: &[Edit]) -> Customer {
    let wall = ManualClock::new(start);
    let clock = HybridLogicalClock::with_wall_clock(NodeId::from(node), wall.clone());
    clock.receive(&base.meta.updated_at);

    let mut customer = base.clone();
    for edit in edits {
        wall.advance(1);
        let ts = clock.tick();
        match edit {
            Edit::Name(n) => customer.name.set(n.clone(), ts.clone()),
            Edit::Email(e) => customer.email.set(e.clone(), ts.clone()),
            Edit::Tag(t) => customer.tags.add(t.clone(), ts.clone()),
            Edit::Untag(t) => customer.tags.remove(t),
            Edit::Points(d) => customer.loyalty_points.increment(*d, ts.clone()),
            Edit::Delete(d) => customer.meta.is_deleted.set(*d, ts.clone()),
        }
        customer.meta.touch(&ts);
    }
    customer
}

proptest! {
    #[test]
    fn test_register_merge_laws(x in arb_register(), y in arb_register(), z in arb_register()) {
        prop_assert_eq!(x.merge(&y), y.merge(&x));
        prop_assert_eq!(x.merge(&y).merge(&z), x.merge(&y.merge(&z)));
        prop_assert_eq!(x.merge(&x), x.clone());
    }

    #[test]
    fn test_counter_merge_laws(x in arb_counter(), y in arb_counter(), z in arb_counter()) {
        prop_assert_eq!(x.merge(&y), y.merge(&x));
        prop_assert_eq!(x.merge(&y).merge(&z), x.merge(&y.merge(&z)));
        prop_assert_eq!(x.merge(&x), x.clone());
    }

    #[test]
    fn test_orset_merge_laws(x in arb_orset(), y in arb_orset(), z in arb_orset()) {
        prop_assert_eq!(x.merge(&y), y.merge(&x));
        prop_assert_eq!(x.merge(&y).merge(&z), x.merge(&y.merge(&z)));
        prop_assert_eq!(x.merge(&x), x.clone());
    }

    /// Test: two replicas edited offline converge regardless of who merges
    #[test]
    fn test_resolver_determinism(
        edits_a in prop::collection::vec(arb_edit(), 0..6),
        edits_b in prop::collection::vec(arb_edit(), 0..6),
        start_b in 0u64..20,
    ) {
        let origin = HybridLogicalClock::with_wall_clock(NodeId::from("origin"), ManualClock::new(100));
        let base = Customer::new("Acme", origin.tick());

        let on_a = replay(&base, "a", 100, &edits_a);
        let on_b = replay(&base, "b", 100 + start_b, &edits_b);

        // Node A merges B's version; node B merges A's version
        let merged_on_a = ConflictResolver.resolve(&on_a, &on_b).unwrap();
        let merged_on_b = ConflictResolver.resolve(&on_b, &on_a).unwrap();

        prop_assert_eq!(&merged_on_a, &merged_on_b);
        prop_assert_eq!(
            merged_on_a.clone().into_record().content_digest().unwrap(),
            merged_on_b.clone().into_record().content_digest().unwrap()
        );

        // Resolving again with either input is a no-op
        prop_assert_eq!(ConflictResolver.resolve(&merged_on_a, &on_b).unwrap(), merged_on_a.clone());
        prop_assert_eq!(ConflictResolver.resolve(&merged_on_a, &on_a).unwrap(), merged_on_a.clone());
    }

    /// Test: HLC timestamps strictly increase across any tick/receive sequence
    #[test]
    fn test_hlc_monotonicity(
        steps in prop::collection::vec((any::<bool>(), 0u64..40, arb_timestamp()), 1..40)
    ) {
        let wall = ManualClock::new(20);
        let clock = HybridLogicalClock::with_wall_clock(NodeId::from("n"), wall.clone());
        let mut highest: Option<HlcTimestamp> = None;

        for (is_receive, wall_ms, remote) in steps {
            wall.set(wall_ms);
            let issued = if is_receive {
                let t = clock.receive(&remote);
                prop_assert!(t > remote);
                t
            } else {
                clock.tick()
            };
            if let Some(prev) = &highest {
                prop_assert!(issued > *prev);
            }
            highest = Some(if is_receive { issued.clone().max(remote) } else { issued });
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_replay_bumps_version() {
        let base = Customer::new("Acme", HlcTimestamp::new(1, 0, "origin"));
        let edited = replay(&base, "a", 10, &[Edit::Name("x".into()), Edit::Points(3)]);

        assert_eq!(edited.meta.version.get(&NodeId::from("a")), 2);
        assert_eq!(edited.loyalty_points.value(), 3);
        assert!(edited.meta.updated_at > base.meta.updated_at);
    }
}
