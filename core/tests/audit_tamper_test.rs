//! Integration test: editing the audit log on disk is detected
//!
//! Writes directly into the node's RocksDB files between restarts, the way
//! an attacker with file access would.

use bizsync_core::audit::{AuditRecord, ChainBreakReason};
use bizsync_core::integrity::{HealthScore, ViolationKind};
use bizsync_core::{Error, Node, NodeConfig, NodeId};
use rocksdb::{Options, DB};
use tempfile::TempDir;

fn config(dir: &TempDir) -> NodeConfig {
    NodeConfig {
        node_id: Some(NodeId::from("back-office")),
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

fn audit_key(sequence: u64) -> Vec<u8> {
    let mut key = b"audit:".to_vec();
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

#[test]
fn test_tampered_record_is_reported_at_its_sequence() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let victim = {
        let node = Node::open(config(&dir))?;
        node.ledger().seed_default_chart()?;
        assert!(node.audit().verify_integrity()?.is_valid);
        node.audit().records()?[4].clone()
    };
    println!("✓ Seeded chart; tampering with audit record {}", victim.sequence);

    {
        let db = DB::open(&Options::default(), dir.path().join("db"))?;
        let raw = db.get(audit_key(victim.sequence))?.expect("audit record on disk");
        let mut record: AuditRecord = serde_json::from_slice(&raw)?;
        record.new_values = Some(serde_json::json!({ "name": "Slush Fund" }));
        db.put(audit_key(victim.sequence), serde_json::to_vec(&record)?)?;
    }

    let node = Node::open(config(&dir))?;
    let verification = node.audit().verify_integrity()?;
    assert!(!verification.is_valid);
    assert_eq!(verification.records_checked, victim.sequence);

    let broken = verification.broken_at.expect("break reported");
    assert_eq!(broken.sequence, victim.sequence);
    assert_eq!(broken.record_id, victim.id);
    assert_eq!(broken.reason, ChainBreakReason::HashMismatch);

    assert!(matches!(node.audit().ensure_intact(), Err(Error::AuditChainBroken { .. })));

    let report = node.integrity().health_report()?;
    assert_eq!(report.health_score, HealthScore::Critical);
    assert!(report.violations.iter().any(|v| v.kind == ViolationKind::AuditChain));
    println!("✓ Break detected at sequence {} and health is CRITICAL", broken.sequence);

    Ok(())
}

#[test]
fn test_deleted_record_is_a_sequence_gap() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    {
        let node = Node::open(config(&dir))?;
        node.ledger().seed_default_chart()?;
    }

    {
        let db = DB::open(&Options::default(), dir.path().join("db"))?;
        db.delete(audit_key(2))?;
    }

    let node = Node::open(config(&dir))?;
    let broken = node.audit().verify_integrity()?.broken_at.expect("break reported");
    assert_eq!(broken.sequence, 3);
    assert_eq!(broken.reason, ChainBreakReason::SequenceGap);

    Ok(())
}
