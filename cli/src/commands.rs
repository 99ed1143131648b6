//! Command handler for CLI

use crate::ui;
use anyhow::{Context, Result};
use bizsync_core::backup::BackupDocument;
use bizsync_core::Node;
use chrono::NaiveDate;
use colored::Colorize;
use std::path::Path;

pub struct CommandHandler {
    node: Node,
}

impl CommandHandler {
    pub fn new(node: Node) -> Self {
        Self { node }
    }

    pub fn cmd_seed_chart(&self) -> Result<()> {
        let created = self.node.ledger().seed_default_chart()?;

        if created.is_empty() {
            ui::print_info("Chart of accounts already complete");
            return Ok(());
        }
        for account in &created {
            println!("  {} {}", account.code.get().bright_cyan(), account.name.get());
        }
        ui::print_success(&format!("Created {} accounts", created.len()));
        Ok(())
    }

    pub fn cmd_health(&self, json: bool) -> Result<()> {
        let report = self.node.integrity().health_report()?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            ui::print_health_report(&report);
        }
        Ok(())
    }

    pub fn cmd_trial_balance(&self, as_of: Option<NaiveDate>) -> Result<()> {
        let balances = self.node.ledger().get_trial_balance(as_of)?;
        let status = self.node.ledger().validate_trial_balance()?;

        ui::print_trial_balance(&balances, as_of);
        if status.is_balanced {
            ui::print_success("Ledger is balanced");
        } else {
            ui::print_error(&format!(
                "Ledger is out of balance: debits {} credits {}",
                status.total_debits, status.total_credits
            ));
        }
        Ok(())
    }

    pub fn cmd_verify_audit(&self) -> Result<()> {
        let verification = self.node.audit().verify_integrity()?;

        match verification.broken_at {
            None => {
                ui::print_success(&format!(
                    "Audit chain intact ({} records)",
                    verification.records_checked
                ));
                Ok(())
            }
            Some(b) => {
                ui::print_error(&format!(
                    "Audit chain broken at sequence {} (record {}): {:?}",
                    b.sequence, b.record_id, b.reason
                ));
                anyhow::bail!("audit verification failed at sequence {}", b.sequence)
            }
        }
    }

    pub fn cmd_export(&self, file: &Path) -> Result<()> {
        let document = self.node.backup().export()?;
        document
            .write_to(file)
            .with_context(|| format!("writing {}", file.display()))?;

        ui::print_success(&format!(
            "Exported {} records to {}",
            document.record_count(),
            file.display()
        ));
        Ok(())
    }

    pub fn cmd_import(&self, file: &Path) -> Result<()> {
        let document = BackupDocument::read_from(file).with_context(|| format!("reading {}", file.display()))?;
        let report = self.node.backup().import(&document)?;

        println!();
        println!("{}", "Import summary:".bright_cyan().bold());
        for (table, r) in &report.tables {
            println!(
                "  {:<16} received {:>5}  new {:>5}  merged {:>5}  replaced {:>5}  rejected {:>5}",
                table, r.received, r.inserted, r.merged, r.took_remote, r.rejected
            );
        }
        ui::print_success(&format!("Imported backup from node {}", document.metadata.node_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizsync_core::crdt::HybridLogicalClock;
    use bizsync_core::storage::MemoryStore;
    use bizsync_core::{NodeConfig, NodeId};
    use std::sync::Arc;

    fn handler() -> (CommandHandler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let node = Node::with_parts(
            NodeConfig::default(),
            store.clone(),
            HybridLogicalClock::new(NodeId::from("cli-test")),
        )
        .unwrap();
        (CommandHandler::new(node), store)
    }

    #[test]
    fn test_verify_audit_fails_on_broken_chain() {
        let (handler, store) = handler();
        handler.cmd_seed_chart().unwrap();
        assert!(handler.cmd_verify_audit().is_ok());

        store.tamper_audit_record(1, |r| r.new_values = None);
        assert!(handler.cmd_verify_audit().is_err());
    }
}
