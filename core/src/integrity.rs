//! Data integrity checks and health reporting
//!
//! Checks never fail on bad data: every finding is an [`IntegrityViolation`]
//! returned as a value. Only storage or decoding problems surface as errors.

use crate::accounting::{is_balanced, DoubleEntryService, TrialBalanceStatus};
use crate::audit::{AuditService, AuditVerification};
use crate::entity::{Account, AccountingTransaction, Entity, InvoiceItem, InvoiceStatus, JournalEntry, Record};
use crate::storage::EntityStore;
use crate::types::{EntityId, Money, Table};
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ForeignKey,
    BusinessRule,
    TrialBalance,
    AuditChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub table: Table,
    pub id: EntityId,
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Check or rule that produced the finding
    pub rule: String,
    /// Offending record, if the finding is about one
    pub record_ref: Option<RecordRef>,
    pub detected_at: DateTime<Utc>,
    pub details: String,
}

impl IntegrityViolation {
    fn new(kind: ViolationKind, severity: Severity, rule: &str, record_ref: Option<RecordRef>, details: String) -> Self {
        Self {
            kind,
            severity,
            rule: rule.to_string(),
            record_ref,
            detected_at: Utc::now(),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthScore {
    Excellent,
    Fair,
    Poor,
    Critical,
}

impl HealthScore {
    /// Worst severity decides; a pile of low findings also drops to FAIR
    pub fn from_violations(violations: &[IntegrityViolation], low_severity_fair_threshold: usize) -> Self {
        let worst = violations.iter().map(|v| v.severity).max();
        let lows = violations.iter().filter(|v| v.severity == Severity::Low).count();

        match worst {
            Some(Severity::Critical) => HealthScore::Critical,
            Some(Severity::High) => HealthScore::Poor,
            Some(Severity::Medium) => HealthScore::Fair,
            _ if lows > low_severity_fair_threshold => HealthScore::Fair,
            _ => HealthScore::Excellent,
        }
    }
}

/// Counts from the most recent run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationStatistics {
    pub total: usize,
    pub by_kind: BTreeMap<ViolationKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ViolationStatistics {
    fn from_run(violations: &[IntegrityViolation], finished_at: DateTime<Utc>) -> Self {
        let mut stats = ViolationStatistics {
            total: violations.len(),
            last_run_at: Some(finished_at),
            ..Default::default()
        };
        for v in violations {
            *stats.by_kind.entry(v.kind).or_default() += 1;
            *stats.by_severity.entry(v.severity).or_default() += 1;
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub foreign_key_violations: usize,
    pub business_rule_violations: usize,
    pub trial_balance: TrialBalanceStatus,
    pub audit_chain: AuditVerification,
    pub health_score: HealthScore,
    pub statistics: ViolationStatistics,
    pub violations: Vec<IntegrityViolation>,
}

/// Every row of every table, loaded once per run
struct Snapshot {
    rows: BTreeMap<(Table, EntityId), Record>,
    item_totals: BTreeMap<EntityId, (usize, Money)>,
    lines_by_transaction: BTreeMap<EntityId, Vec<JournalEntry>>,
    account_codes: BTreeMap<String, usize>,
}

impl Snapshot {
    fn load(store: &dyn EntityStore) -> Result<Self> {
        let mut rows = BTreeMap::new();
        for table in Table::ALL {
            for record in store.scan(table)? {
                rows.insert((table, record.id()), record);
            }
        }

        let mut snapshot = Self {
            rows,
            item_totals: BTreeMap::new(),
            lines_by_transaction: BTreeMap::new(),
            account_codes: BTreeMap::new(),
        };

        for item in snapshot.live::<InvoiceItem>() {
            let slot = snapshot.item_totals.entry(*item.invoice_id.get()).or_default();
            slot.0 += 1;
            slot.1 += *item.line_total.get();
        }
        for line in snapshot.live::<JournalEntry>() {
            snapshot
                .lines_by_transaction
                .entry(*line.transaction_id.get())
                .or_default()
                .push(line);
        }
        for account in snapshot.live::<Account>() {
            *snapshot.account_codes.entry(account.code.get().clone()).or_default() += 1;
        }

        Ok(snapshot)
    }

    fn live<E: Entity>(&self) -> Vec<E> {
        self.rows
            .values()
            .filter(|r| r.table() == E::TABLE && !r.is_deleted())
            .cloned()
            .filter_map(E::from_record)
            .collect()
    }

    fn live_records(&self) -> impl Iterator<Item = &Record> {
        self.rows.values().filter(|r| !r.is_deleted())
    }
}

/// A named predicate over one live record
struct BusinessRule {
    name: &'static str,
    severity: Severity,
    check: fn(&Snapshot, &Record) -> Option<String>,
}

const BUSINESS_RULES: &[BusinessRule] = &[
    BusinessRule {
        name: "invoice_total_matches",
        severity: Severity::High,
        check: invoice_total_matches,
    },
    BusinessRule {
        name: "invoice_subtotal_matches_items",
        severity: Severity::Medium,
        check: invoice_subtotal_matches_items,
    },
    BusinessRule {
        name: "invoice_not_overpaid",
        severity: Severity::Medium,
        check: invoice_not_overpaid,
    },
    BusinessRule {
        name: "paid_invoice_settled",
        severity: Severity::Low,
        check: paid_invoice_settled,
    },
    BusinessRule {
        name: "item_line_total",
        severity: Severity::Medium,
        check: item_line_total,
    },
    BusinessRule {
        name: "transaction_balanced",
        severity: Severity::Critical,
        check: transaction_balanced,
    },
    BusinessRule {
        name: "transaction_has_lines",
        severity: Severity::High,
        check: transaction_has_lines,
    },
    BusinessRule {
        name: "journal_amount_positive",
        severity: Severity::High,
        check: journal_amount_positive,
    },
    BusinessRule {
        name: "customer_name_present",
        severity: Severity::Low,
        check: customer_name_present,
    },
    BusinessRule {
        name: "account_code_unique",
        severity: Severity::Medium,
        check: account_code_unique,
    },
];

fn invoice_total_matches(_: &Snapshot, record: &Record) -> Option<String> {
    let Record::Invoice(invoice) = record else { return None };
    let expected = invoice.subtotal.get().checked_add(*invoice.tax_amount.get());
    (Some(*invoice.total.get()) != expected).then(|| {
        format!(
            "invoice {} total {} != subtotal {} + tax {}",
            invoice.invoice_number.get(),
            invoice.total.get(),
            invoice.subtotal.get(),
            invoice.tax_amount.get()
        )
    })
}

fn invoice_subtotal_matches_items(snapshot: &Snapshot, record: &Record) -> Option<String> {
    let Record::Invoice(invoice) = record else { return None };
    let (count, items_total) = snapshot.item_totals.get(&invoice.id()).copied()?;
    (count > 0 && *invoice.subtotal.get() != items_total).then(|| {
        format!(
            "invoice {} subtotal {} != sum of {} line items {}",
            invoice.invoice_number.get(),
            invoice.subtotal.get(),
            count,
            items_total
        )
    })
}

fn invoice_not_overpaid(_: &Snapshot, record: &Record) -> Option<String> {
    let Record::Invoice(invoice) = record else { return None };
    (invoice.amount_paid() > *invoice.total.get()).then(|| {
        format!(
            "invoice {} paid {} exceeds total {}",
            invoice.invoice_number.get(),
            invoice.amount_paid(),
            invoice.total.get()
        )
    })
}

fn paid_invoice_settled(_: &Snapshot, record: &Record) -> Option<String> {
    let Record::Invoice(invoice) = record else { return None };
    (*invoice.status.get() == InvoiceStatus::Paid && invoice.balance_due().is_positive()).then(|| {
        format!(
            "invoice {} marked paid with {} outstanding",
            invoice.invoice_number.get(),
            invoice.balance_due()
        )
    })
}

fn item_line_total(_: &Snapshot, record: &Record) -> Option<String> {
    let Record::InvoiceItem(item) = record else { return None };
    let expected = item.unit_price.get().checked_times(*item.quantity.get());
    (Some(*item.line_total.get()) != expected).then(|| {
        format!(
            "line total {} != {} x {}",
            item.line_total.get(),
            item.quantity.get(),
            item.unit_price.get()
        )
    })
}

fn transaction_lines<'a>(snapshot: &'a Snapshot, transaction: &AccountingTransaction) -> &'a [JournalEntry] {
    snapshot
        .lines_by_transaction
        .get(&transaction.id())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn transaction_balanced(snapshot: &Snapshot, record: &Record) -> Option<String> {
    let Record::Transaction(transaction) = record else { return None };
    let lines = transaction_lines(snapshot, transaction);
    let debits = Money::checked_sum(lines.iter().filter(|l| l.is_debit()).map(|l| *l.amount.get()));
    let credits = Money::checked_sum(lines.iter().filter(|l| l.is_credit()).map(|l| *l.amount.get()));
    let (Some(debits), Some(credits)) = (debits, credits) else {
        return Some(format!("transaction '{}' line amounts overflow", transaction.description.get()));
    };
    (!is_balanced(debits, credits)).then(|| {
        format!(
            "transaction '{}' debits {} != credits {}",
            transaction.description.get(),
            debits,
            credits
        )
    })
}

fn transaction_has_lines(snapshot: &Snapshot, record: &Record) -> Option<String> {
    let Record::Transaction(transaction) = record else { return None };
    let count = transaction_lines(snapshot, transaction).len();
    (count < 2).then(|| format!("transaction '{}' has {} live lines", transaction.description.get(), count))
}

fn journal_amount_positive(_: &Snapshot, record: &Record) -> Option<String> {
    let Record::JournalEntry(entry) = record else { return None };
    (!entry.amount.get().is_positive()).then(|| format!("journal line amount {} is not positive", entry.amount.get()))
}

fn customer_name_present(_: &Snapshot, record: &Record) -> Option<String> {
    let Record::Customer(customer) = record else { return None };
    customer.name.get().trim().is_empty().then(|| "customer name is empty".to_string())
}

fn account_code_unique(snapshot: &Snapshot, record: &Record) -> Option<String> {
    let Record::Account(account) = record else { return None };
    let code = account.code.get();
    let count = snapshot.account_codes.get(code).copied().unwrap_or(0);
    (count > 1).then(|| format!("account code {} used by {} accounts", code, count))
}

struct CheckRun {
    violations: Vec<IntegrityViolation>,
    trial_balance: TrialBalanceStatus,
    audit_chain: AuditVerification,
}

#[derive(Debug, Clone)]
struct LastRun {
    finished_at: DateTime<Utc>,
    violations: Vec<IntegrityViolation>,
}

pub struct DataIntegrityService {
    store: Arc<dyn EntityStore>,
    audit: Arc<AuditService>,
    ledger: Arc<DoubleEntryService>,
    low_severity_fair_threshold: usize,
    last_run: Mutex<Option<LastRun>>,
}

impl DataIntegrityService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        audit: Arc<AuditService>,
        ledger: Arc<DoubleEntryService>,
        low_severity_fair_threshold: usize,
    ) -> Self {
        Self {
            store,
            audit,
            ledger,
            low_severity_fair_threshold,
            last_run: Mutex::new(None),
        }
    }

    /// Every live reference must point at an existing, live row
    pub fn check_foreign_key_constraints(&self) -> Result<Vec<IntegrityViolation>> {
        let snapshot = Snapshot::load(self.store.as_ref())?;
        Ok(Self::foreign_keys(&snapshot))
    }

    pub fn check_business_rules(&self) -> Result<Vec<IntegrityViolation>> {
        let snapshot = Snapshot::load(self.store.as_ref())?;
        Ok(Self::business_rules(&snapshot))
    }

    pub fn check_trial_balance(&self) -> Result<Vec<IntegrityViolation>> {
        let status = self.ledger.validate_trial_balance()?;
        Ok(Self::trial_balance_findings(&status))
    }

    pub fn check_audit_chain(&self) -> Result<Vec<IntegrityViolation>> {
        let verification = self.audit.verify_integrity()?;
        Ok(Self::audit_findings(&verification))
    }

    /// Run all checks and remember the result for statistics
    pub fn run_integrity_checks(&self) -> Result<Vec<IntegrityViolation>> {
        Ok(self.run_all()?.violations)
    }

    /// Aggregates of the last run (empty before the first run)
    pub fn get_violation_statistics(&self) -> ViolationStatistics {
        match &*self.last_run.lock() {
            Some(run) => ViolationStatistics::from_run(&run.violations, run.finished_at),
            None => ViolationStatistics::default(),
        }
    }

    /// Fresh run summarized for operators
    pub fn health_report(&self) -> Result<HealthReport> {
        let run = self.run_all()?;
        let count = |kind| run.violations.iter().filter(|v| v.kind == kind).count();

        Ok(HealthReport {
            generated_at: Utc::now(),
            foreign_key_violations: count(ViolationKind::ForeignKey),
            business_rule_violations: count(ViolationKind::BusinessRule),
            trial_balance: run.trial_balance,
            audit_chain: run.audit_chain,
            health_score: HealthScore::from_violations(&run.violations, self.low_severity_fair_threshold),
            statistics: self.get_violation_statistics(),
            violations: run.violations,
        })
    }

    /// Run the checks on a fixed interval until the handle is aborted
    pub fn spawn_periodic_checks(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let worker = Arc::clone(&service);
                match tokio::task::spawn_blocking(move || worker.run_integrity_checks()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Periodic integrity check failed"),
                    Err(e) => tracing::error!(error = %e, "Periodic integrity task panicked"),
                }
            }
        })
    }

    fn run_all(&self) -> Result<CheckRun> {
        let snapshot = Snapshot::load(self.store.as_ref())?;
        let trial_balance = self.ledger.validate_trial_balance()?;
        let audit_chain = self.audit.verify_integrity()?;

        let mut violations = Self::foreign_keys(&snapshot);
        violations.extend(Self::business_rules(&snapshot));
        violations.extend(Self::trial_balance_findings(&trial_balance));
        violations.extend(Self::audit_findings(&audit_chain));

        let finished_at = Utc::now();
        let critical = violations.iter().filter(|v| v.severity == Severity::Critical).count();
        if violations.is_empty() {
            tracing::info!("Integrity checks passed");
        } else {
            tracing::warn!(total = violations.len(), critical, "Integrity checks found violations");
        }

        *self.last_run.lock() = Some(LastRun {
            finished_at,
            violations: violations.clone(),
        });

        Ok(CheckRun {
            violations,
            trial_balance,
            audit_chain,
        })
    }

    fn foreign_keys(snapshot: &Snapshot) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();

        for record in snapshot.live_records() {
            for reference in record.references() {
                let referent = snapshot.rows.get(&(reference.table, reference.id));
                let (severity, problem) = match referent {
                    None => (Severity::High, "missing"),
                    Some(r) if r.is_deleted() => (Severity::Medium, "deleted"),
                    Some(_) => continue,
                };

                violations.push(IntegrityViolation::new(
                    ViolationKind::ForeignKey,
                    severity,
                    reference.field,
                    Some(RecordRef {
                        table: record.table(),
                        id: record.id(),
                    }),
                    format!("{} references {} {}/{}", reference.field, problem, reference.table, reference.id),
                ));
            }
        }

        violations
    }

    fn business_rules(snapshot: &Snapshot) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();

        for record in snapshot.live_records() {
            for rule in BUSINESS_RULES {
                if let Some(details) = (rule.check)(snapshot, record) {
                    violations.push(IntegrityViolation::new(
                        ViolationKind::BusinessRule,
                        rule.severity,
                        rule.name,
                        Some(RecordRef {
                            table: record.table(),
                            id: record.id(),
                        }),
                        details,
                    ));
                }
            }
        }

        violations
    }

    fn trial_balance_findings(status: &TrialBalanceStatus) -> Vec<IntegrityViolation> {
        if status.is_balanced {
            return Vec::new();
        }
        vec![IntegrityViolation::new(
            ViolationKind::TrialBalance,
            Severity::Critical,
            "trial_balance",
            None,
            format!(
                "total debits {} != total credits {}",
                status.total_debits, status.total_credits
            ),
        )]
    }

    fn audit_findings(verification: &AuditVerification) -> Vec<IntegrityViolation> {
        match &verification.broken_at {
            None => Vec::new(),
            Some(b) => vec![IntegrityViolation::new(
                ViolationKind::AuditChain,
                Severity::Critical,
                "audit_chain",
                None,
                format!(
                    "chain broken at sequence {} (record {}): {:?}",
                    b.sequence, b.record_id, b.reason
                ),
            )],
        }
    }
}
