//! Journal posting, reversal and trial balance

use super::is_balanced;
use crate::entity::{Account, AccountType, AccountingTransaction, Entity, EntrySide, JournalEntry, TransactionStatus};
use crate::storage::{load_live, EntityStore};
use crate::transaction::{TransactionManager, TxContext};
use crate::types::{EntityId, Money, Table};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Standard small-business chart of accounts
pub const DEFAULT_CHART: &[(&str, &str, AccountType)] = &[
    ("1000", "Cash", AccountType::Asset),
    ("1100", "Accounts Receivable", AccountType::Asset),
    ("2000", "Accounts Payable", AccountType::Liability),
    ("2100", "GST Payable", AccountType::Liability),
    ("3000", "Owner's Equity", AccountType::Equity),
    ("4000", "Sales Revenue", AccountType::Revenue),
    ("5000", "Cost of Goods Sold", AccountType::Expense),
    ("6000", "Operating Expenses", AccountType::Expense),
];

/// One requested debit or credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account_id: EntityId,
    pub side: EntrySide,
    pub amount: Money,
}

impl JournalEntryLine {
    pub fn debit(account_id: EntityId, amount: Money) -> Self {
        Self {
            account_id,
            side: EntrySide::Debit,
            amount,
        }
    }

    pub fn credit(account_id: EntityId, amount: Money) -> Self {
        Self {
            account_id,
            side: EntrySide::Credit,
            amount,
        }
    }
}

/// Per-account totals in a trial balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: EntityId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub total_debits: Money,
    pub total_credits: Money,
    /// Positive on the account's normal side
    pub balance: Money,
}

/// System-wide debit/credit agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceStatus {
    pub is_balanced: bool,
    pub total_debits: Money,
    pub total_credits: Money,
}

pub struct DoubleEntryService {
    store: Arc<dyn EntityStore>,
    transactions: Arc<TransactionManager>,
}

impl DoubleEntryService {
    pub fn new(store: Arc<dyn EntityStore>, transactions: Arc<TransactionManager>) -> Self {
        Self { store, transactions }
    }

    /// Add an account to the chart; codes must be unique
    pub fn create_account(&self, code: &str, name: &str, account_type: AccountType) -> Result<Account> {
        self.transactions.run_in_transaction(|tx| Self::insert_account(tx, code, name, account_type))
    }

    /// Create any [`DEFAULT_CHART`] accounts that are missing
    ///
    /// Returns the accounts created by this call.
    pub fn seed_default_chart(&self) -> Result<Vec<Account>> {
        let created = self.transactions.run_in_transaction(|tx| {
            let existing: BTreeSet<String> = tx
                .query::<Account>(|_| true)?
                .into_iter()
                .map(|a| a.code.get().clone())
                .collect();

            let mut created = Vec::new();
            for (code, name, account_type) in DEFAULT_CHART {
                if !existing.contains(*code) {
                    created.push(Self::insert_account(tx, code, name, *account_type)?);
                }
            }
            Ok(created)
        })?;

        tracing::info!(created = created.len(), "Seeded default chart of accounts");
        Ok(created)
    }

    pub fn account_by_code(&self, code: &str) -> Result<Option<Account>> {
        Ok(load_live::<Account>(self.store.as_ref())?
            .into_iter()
            .find(|a| a.code.get() == code))
    }

    /// Validate and post a journal entry in its own transaction
    pub fn create_journal_entry(
        &self,
        lines: &[JournalEntryLine],
        description: &str,
        reference: Option<&str>,
        transaction_date: NaiveDate,
    ) -> Result<AccountingTransaction> {
        Self::validate_lines(lines)?;

        let posted = self
            .transactions
            .run_in_transaction(|tx| Self::post_entry(tx, lines, description, reference, transaction_date))?;

        tracing::info!(
            transaction = %posted.id(),
            lines = lines.len(),
            description,
            "Journal entry posted"
        );
        Ok(posted)
    }

    /// Post a journal entry inside an enclosing transaction
    pub fn post_entry(
        tx: &mut TxContext<'_>,
        lines: &[JournalEntryLine],
        description: &str,
        reference: Option<&str>,
        transaction_date: NaiveDate,
    ) -> Result<AccountingTransaction> {
        Self::validate_lines(lines)?;

        for line in lines {
            let account = tx
                .get::<Account>(&line.account_id)?
                .ok_or(Error::NotFound {
                    table: Table::Accounts,
                    id: line.account_id,
                })?;
            if !account.is_postable() {
                return Err(Error::InvalidEntry(format!(
                    "account {} ({}) is not open for posting",
                    account.code.get(),
                    account.id()
                )));
            }
        }

        let header = AccountingTransaction::new(
            description,
            reference.map(str::to_string),
            transaction_date,
            tx.tick(),
        );
        let header = tx.insert(header)?;

        for line in lines {
            let entry = JournalEntry::new(header.id(), line.account_id, line.side, line.amount, tx.tick());
            tx.insert(entry)?;
        }

        Ok(header)
    }

    /// Post a mirror entry and mark the original `Reversed`
    pub fn reverse_journal_entry(&self, transaction_id: &EntityId, reversal_date: NaiveDate) -> Result<AccountingTransaction> {
        let reversal = self.transactions.run_in_transaction(|tx| {
            let original = tx.require::<AccountingTransaction>(transaction_id)?;
            if *original.status.get() == TransactionStatus::Reversed {
                return Err(Error::InvalidEntry(format!("transaction {} is already reversed", transaction_id)));
            }

            let mirrored: Vec<JournalEntryLine> = tx
                .query::<JournalEntry>(|e| e.transaction_id.get() == transaction_id)?
                .iter()
                .map(|e| JournalEntryLine {
                    account_id: *e.account_id.get(),
                    side: e.side.get().opposite(),
                    amount: *e.amount.get(),
                })
                .collect();

            let description = format!("Reversal of {}", original.description.get());
            let mut reversal = tx.nested(|inner| {
                Self::post_entry(inner, &mirrored, &description, original.reference.get().as_deref(), reversal_date)
            })?;

            reversal = tx.update::<AccountingTransaction, _>(&reversal.id(), |t, ts| {
                t.reverses.set(Some(*transaction_id), ts.clone());
            })?;
            tx.update::<AccountingTransaction, _>(transaction_id, |t, ts| {
                t.status.set(TransactionStatus::Reversed, ts.clone());
            })?;

            Ok(reversal)
        })?;

        tracing::info!(original = %transaction_id, reversal = %reversal.id(), "Journal entry reversed");
        Ok(reversal)
    }

    /// Per-account totals over posted lines dated on or before `as_of`
    pub fn get_trial_balance(&self, as_of: Option<NaiveDate>) -> Result<Vec<AccountBalance>> {
        let accounts = load_live::<Account>(self.store.as_ref())?;
        let mut totals: BTreeMap<EntityId, (Money, Money)> = BTreeMap::new();

        for entry in self.effective_lines(as_of)? {
            let slot = totals.entry(*entry.account_id.get()).or_default();
            let total = match entry.side.get() {
                EntrySide::Debit => &mut slot.0,
                EntrySide::Credit => &mut slot.1,
            };
            *total = accumulate(*total, *entry.amount.get())?;
        }

        let mut balances: Vec<AccountBalance> = accounts
            .into_iter()
            .map(|account| {
                let (debits, credits) = totals.get(&account.id()).copied().unwrap_or_default();
                let account_type = *account.account_type.get();
                let balance = if account_type.is_debit_normal() {
                    debits - credits
                } else {
                    credits - debits
                };
                AccountBalance {
                    account_id: account.id(),
                    code: account.code.get().clone(),
                    name: account.name.get().clone(),
                    account_type,
                    total_debits: debits,
                    total_credits: credits,
                    balance,
                }
            })
            .collect();

        balances.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(balances)
    }

    /// Normal-side balance of one account
    pub fn account_balance(&self, account_id: &EntityId, as_of: Option<NaiveDate>) -> Result<Money> {
        self.get_trial_balance(as_of)?
            .into_iter()
            .find(|b| b.account_id == *account_id)
            .map(|b| b.balance)
            .ok_or(Error::NotFound {
                table: Table::Accounts,
                id: *account_id,
            })
    }

    /// Compare system-wide debits and credits over every live line
    ///
    /// Totals are accumulated wide, so replicated lines whose sum leaves the
    /// `i64` range show up as an unbalanced ledger with clamped totals.
    pub fn validate_trial_balance(&self) -> Result<TrialBalanceStatus> {
        let mut debits: i128 = 0;
        let mut credits: i128 = 0;

        for entry in self.effective_lines(None)? {
            let amount = i128::from(entry.amount.get().cents());
            match entry.side.get() {
                EntrySide::Debit => debits += amount,
                EntrySide::Credit => credits += amount,
            }
        }

        let status = match (i64::try_from(debits), i64::try_from(credits)) {
            (Ok(d), Ok(c)) => TrialBalanceStatus {
                is_balanced: is_balanced(Money(d), Money(c)),
                total_debits: Money(d),
                total_credits: Money(c),
            },
            _ => TrialBalanceStatus {
                is_balanced: false,
                total_debits: Money(clamp(debits)),
                total_credits: Money(clamp(credits)),
            },
        };
        if !status.is_balanced {
            tracing::warn!(debits = %status.total_debits, credits = %status.total_credits, "Trial balance does not agree");
        }
        Ok(status)
    }

    /// Live lines whose live header is dated on or before `as_of`
    fn effective_lines(&self, as_of: Option<NaiveDate>) -> Result<Vec<JournalEntry>> {
        let headers: BTreeSet<EntityId> = load_live::<AccountingTransaction>(self.store.as_ref())?
            .into_iter()
            .filter(|t| as_of.map_or(true, |d| *t.transaction_date.get() <= d))
            .map(|t| t.id())
            .collect();

        Ok(load_live::<JournalEntry>(self.store.as_ref())?
            .into_iter()
            .filter(|e| headers.contains(e.transaction_id.get()))
            .collect())
    }

    fn insert_account(tx: &mut TxContext<'_>, code: &str, name: &str, account_type: AccountType) -> Result<Account> {
        if code.trim().is_empty() {
            return Err(Error::InvalidEntry("account code must not be empty".to_string()));
        }
        if !tx.query::<Account>(|a| a.code.get() == code)?.is_empty() {
            return Err(Error::InvalidEntry(format!("account code {} already exists", code)));
        }

        let account = Account::new(code, name, account_type, tx.tick());
        tx.insert(account)
    }

    fn validate_lines(lines: &[JournalEntryLine]) -> Result<()> {
        if lines.len() < 2 {
            return Err(Error::InvalidEntry(format!(
                "a journal entry needs at least two lines, got {}",
                lines.len()
            )));
        }
        if let Some(line) = lines.iter().find(|l| !l.amount.is_positive()) {
            return Err(Error::InvalidEntry(format!(
                "line amounts must be positive, got {} on account {}",
                line.amount, line.account_id
            )));
        }

        let side_total = |side: EntrySide| {
            Money::checked_sum(lines.iter().filter(|l| l.side == side).map(|l| l.amount))
                .ok_or_else(|| Error::InvalidEntry(format!("{:?} amounts overflow", side)))
        };
        let debits = side_total(EntrySide::Debit)?;
        let credits = side_total(EntrySide::Credit)?;

        if !is_balanced(debits, credits) {
            tracing::warn!(%debits, %credits, "Rejected unbalanced journal entry");
            return Err(Error::ImbalancedLedger { debits, credits });
        }
        Ok(())
    }
}

fn clamp(total: i128) -> i64 {
    i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
}

fn accumulate(total: Money, amount: Money) -> Result<Money> {
    total
        .checked_add(amount)
        .ok_or_else(|| Error::InvalidEntry(format!("ledger total overflows adding {}", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditService;
    use crate::crdt::HybridLogicalClock;
    use crate::storage::MemoryStore;
    use crate::types::{NodeId, Table};

    fn service() -> (DoubleEntryService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(HybridLogicalClock::new(NodeId::from("ledger-test")));
        let audit = Arc::new(AuditService::open(store.clone(), clock.clone()).unwrap());
        let tm = Arc::new(TransactionManager::new(store.clone(), clock, audit));
        (DoubleEntryService::new(store.clone(), tm), store)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn account(ledger: &DoubleEntryService, code: &str) -> EntityId {
        ledger.account_by_code(code).unwrap().unwrap().id()
    }

    #[test]
    fn test_seed_default_chart_is_idempotent() {
        let (ledger, _) = service();
        assert_eq!(ledger.seed_default_chart().unwrap().len(), DEFAULT_CHART.len());
        assert!(ledger.seed_default_chart().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_account_code_rejected() {
        let (ledger, _) = service();
        ledger.create_account("1000", "Cash", AccountType::Asset).unwrap();
        let dup = ledger.create_account("1000", "Petty Cash", AccountType::Asset);
        assert!(matches!(dup, Err(Error::InvalidEntry(_))));
    }

    #[test]
    fn test_balanced_entry_posts_header_and_lines() {
        let (ledger, store) = service();
        ledger.seed_default_chart().unwrap();
        let cash = account(&ledger, "1000");
        let sales = account(&ledger, "4000");

        let tx = ledger
            .create_journal_entry(
                &[
                    JournalEntryLine::debit(cash, Money(10_900)),
                    JournalEntryLine::credit(sales, Money(10_900)),
                ],
                "Cash sale",
                Some("INV-001"),
                date(1),
            )
            .unwrap();

        assert_eq!(tx.reference.get().as_deref(), Some("INV-001"));
        assert_eq!(store.scan(Table::JournalEntries).unwrap().len(), 2);
        assert_eq!(ledger.account_balance(&cash, None).unwrap(), Money(10_900));
        assert_eq!(ledger.account_balance(&sales, None).unwrap(), Money(10_900));
        assert!(ledger.validate_trial_balance().unwrap().is_balanced);
    }

    #[test]
    fn test_unbalanced_entry_leaves_ledger_unchanged() {
        let (ledger, store) = service();
        ledger.seed_default_chart().unwrap();
        let cash = account(&ledger, "1000");
        let sales = account(&ledger, "4000");
        let accounts_before = store.scan(Table::Accounts).unwrap();

        let result = ledger.create_journal_entry(
            &[
                JournalEntryLine::debit(cash, Money(10_000)),
                JournalEntryLine::credit(sales, Money(9_999)),
            ],
            "Typo",
            None,
            date(1),
        );

        match result {
            Err(Error::ImbalancedLedger { debits, credits }) => {
                assert_eq!(debits, Money(10_000));
                assert_eq!(credits, Money(9_999));
            }
            other => panic!("expected ImbalancedLedger, got {:?}", other),
        }
        assert!(store.scan(Table::Transactions).unwrap().is_empty());
        assert!(store.scan(Table::JournalEntries).unwrap().is_empty());
        assert_eq!(store.scan(Table::Accounts).unwrap(), accounts_before);
    }

    #[test]
    fn test_overflowing_amounts_are_rejected() {
        let (ledger, store) = service();
        ledger.seed_default_chart().unwrap();
        let cash = account(&ledger, "1000");
        let sales = account(&ledger, "4000");

        // Wrapping i64 arithmetic would make these two sides agree
        let result = ledger.create_journal_entry(
            &[
                JournalEntryLine::debit(cash, Money(i64::MAX)),
                JournalEntryLine::debit(cash, Money(i64::MAX)),
                JournalEntryLine::debit(cash, Money(7)),
                JournalEntryLine::credit(sales, Money(5)),
            ],
            "Overflow",
            None,
            date(1),
        );

        assert!(matches!(result, Err(Error::InvalidEntry(_))));
        assert!(store.scan(Table::Transactions).unwrap().is_empty());
        assert!(store.scan(Table::JournalEntries).unwrap().is_empty());
        assert!(ledger.validate_trial_balance().unwrap().is_balanced);
    }

    #[test]
    fn test_line_shape_rules() {
        let (ledger, _) = service();
        ledger.seed_default_chart().unwrap();
        let cash = account(&ledger, "1000");
        let sales = account(&ledger, "4000");

        let single = ledger.create_journal_entry(&[JournalEntryLine::debit(cash, Money(1))], "x", None, date(1));
        assert!(matches!(single, Err(Error::InvalidEntry(_))));

        let zero = ledger.create_journal_entry(
            &[JournalEntryLine::debit(cash, Money(0)), JournalEntryLine::credit(sales, Money(0))],
            "x",
            None,
            date(1),
        );
        assert!(matches!(zero, Err(Error::InvalidEntry(_))));

        let missing = ledger.create_journal_entry(
            &[
                JournalEntryLine::debit(EntityId::new(), Money(5)),
                JournalEntryLine::credit(sales, Money(5)),
            ],
            "x",
            None,
            date(1),
        );
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_trial_balance_as_of_excludes_later_entries() {
        let (ledger, _) = service();
        ledger.seed_default_chart().unwrap();
        let cash = account(&ledger, "1000");
        let equity = account(&ledger, "3000");
        let opex = account(&ledger, "6000");

        ledger
            .create_journal_entry(
                &[JournalEntryLine::debit(cash, Money(50_000)), JournalEntryLine::credit(equity, Money(50_000))],
                "Owner contribution",
                None,
                date(1),
            )
            .unwrap();
        ledger
            .create_journal_entry(
                &[JournalEntryLine::debit(opex, Money(1_200)), JournalEntryLine::credit(cash, Money(1_200))],
                "Rent",
                None,
                date(15),
            )
            .unwrap();

        assert_eq!(ledger.account_balance(&cash, Some(date(10))).unwrap(), Money(50_000));
        assert_eq!(ledger.account_balance(&cash, None).unwrap(), Money(48_800));

        let trial = ledger.get_trial_balance(None).unwrap();
        assert_eq!(trial.len(), DEFAULT_CHART.len());
        assert_eq!(trial[0].code, "1000");
        let debits: Money = trial.iter().map(|b| b.total_debits).sum();
        let credits: Money = trial.iter().map(|b| b.total_credits).sum();
        assert_eq!(debits, credits);
    }

    #[test]
    fn test_reverse_journal_entry() {
        let (ledger, _) = service();
        ledger.seed_default_chart().unwrap();
        let cash = account(&ledger, "1000");
        let sales = account(&ledger, "4000");

        let original = ledger
            .create_journal_entry(
                &[JournalEntryLine::debit(cash, Money(2_000)), JournalEntryLine::credit(sales, Money(2_000))],
                "Sale",
                None,
                date(3),
            )
            .unwrap();

        let reversal = ledger.reverse_journal_entry(&original.id(), date(4)).unwrap();
        assert_eq!(*reversal.reverses.get(), Some(original.id()));
        assert_eq!(ledger.account_balance(&cash, None).unwrap(), Money::ZERO);
        assert_eq!(ledger.account_balance(&cash, Some(date(3))).unwrap(), Money(2_000));

        let again = ledger.reverse_journal_entry(&original.id(), date(5));
        assert!(matches!(again, Err(Error::InvalidEntry(_))));
    }

    #[test]
    fn test_inactive_account_rejected() {
        let (ledger, _) = service();
        ledger.seed_default_chart().unwrap();
        let cash = account(&ledger, "1000");
        let sales = account(&ledger, "4000");

        ledger
            .transactions
            .run_in_transaction(|tx| {
                tx.update::<Account, _>(&sales, |a, ts| a.is_active.set(false, ts.clone()))
            })
            .unwrap();

        let result = ledger.create_journal_entry(
            &[JournalEntryLine::debit(cash, Money(10)), JournalEntryLine::credit(sales, Money(10))],
            "Sale",
            None,
            date(1),
        );
        assert!(matches!(result, Err(Error::InvalidEntry(_))));
    }
}
