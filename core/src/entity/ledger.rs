//! Chart of accounts, journal headers and journal lines

use super::{Entity, EntityMeta, Record, Reference};
use crate::crdt::{HlcTimestamp, LwwRegister, Mergeable};
use crate::types::{EntityId, Money, Table};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Account classification in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Asset and expense accounts increase with debits
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub meta: EntityMeta,
    pub code: LwwRegister<String>,
    pub name: LwwRegister<String>,
    pub account_type: LwwRegister<AccountType>,
    pub is_active: LwwRegister<bool>,
}

impl Account {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
        timestamp: HlcTimestamp,
    ) -> Self {
        Self {
            meta: EntityMeta::new(EntityId::new(), timestamp.clone()),
            code: LwwRegister::new(code.into(), timestamp.clone()),
            name: LwwRegister::new(name.into(), timestamp.clone()),
            account_type: LwwRegister::new(account_type, timestamp.clone()),
            is_active: LwwRegister::new(true, timestamp),
        }
    }

    /// Active and not tombstoned
    pub fn is_postable(&self) -> bool {
        *self.is_active.get() && !self.is_deleted()
    }
}

impl Entity for Account {
    const TABLE: Table = Table::Accounts;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn merge_fields(&self, other: &Self) -> Self {
        Self {
            meta: self.meta.clone(),
            code: self.code.merge(&other.code),
            name: self.name.merge(&other.name),
            account_type: self.account_type.merge(&other.account_type),
            is_active: self.is_active.merge(&other.is_active),
        }
    }

    fn into_record(self) -> Record {
        Record::Account(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Account(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Posted,
    /// Offset by a later reversing transaction
    Reversed,
}

/// Journal header; its lines live in the `journal_entries` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingTransaction {
    pub meta: EntityMeta,
    pub description: LwwRegister<String>,
    pub reference: LwwRegister<Option<String>>,
    pub transaction_date: LwwRegister<NaiveDate>,
    pub status: LwwRegister<TransactionStatus>,
    /// The transaction this one reverses, if any
    pub reverses: LwwRegister<Option<EntityId>>,
}

impl AccountingTransaction {
    pub fn new(
        description: impl Into<String>,
        reference: Option<String>,
        transaction_date: NaiveDate,
        timestamp: HlcTimestamp,
    ) -> Self {
        Self {
            meta: EntityMeta::new(EntityId::new(), timestamp.clone()),
            description: LwwRegister::new(description.into(), timestamp.clone()),
            reference: LwwRegister::new(reference, timestamp.clone()),
            transaction_date: LwwRegister::new(transaction_date, timestamp.clone()),
            status: LwwRegister::new(TransactionStatus::Posted, timestamp.clone()),
            reverses: LwwRegister::new(None, timestamp),
        }
    }
}

impl Entity for AccountingTransaction {
    const TABLE: Table = Table::Transactions;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn merge_fields(&self, other: &Self) -> Self {
        Self {
            meta: self.meta.clone(),
            description: self.description.merge(&other.description),
            reference: self.reference.merge(&other.reference),
            transaction_date: self.transaction_date.merge(&other.transaction_date),
            status: self.status.merge(&other.status),
            reverses: self.reverses.merge(&other.reverses),
        }
    }

    fn into_record(self) -> Record {
        Record::Transaction(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Transaction(t) => Some(t),
            _ => None,
        }
    }

    fn references(&self) -> Vec<Reference> {
        self.reverses
            .get()
            .map(|id| Reference {
                field: "reverses",
                table: Table::Transactions,
                id,
            })
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub fn opposite(&self) -> EntrySide {
        match self {
            EntrySide::Debit => EntrySide::Credit,
            EntrySide::Credit => EntrySide::Debit,
        }
    }
}

/// One debit or credit line of a journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub meta: EntityMeta,
    pub transaction_id: LwwRegister<EntityId>,
    pub account_id: LwwRegister<EntityId>,
    pub side: LwwRegister<EntrySide>,
    pub amount: LwwRegister<Money>,
}

impl JournalEntry {
    pub fn new(
        transaction_id: EntityId,
        account_id: EntityId,
        side: EntrySide,
        amount: Money,
        timestamp: HlcTimestamp,
    ) -> Self {
        Self {
            meta: EntityMeta::new(EntityId::new(), timestamp.clone()),
            transaction_id: LwwRegister::new(transaction_id, timestamp.clone()),
            account_id: LwwRegister::new(account_id, timestamp.clone()),
            side: LwwRegister::new(side, timestamp.clone()),
            amount: LwwRegister::new(amount, timestamp),
        }
    }

    pub fn is_debit(&self) -> bool {
        *self.side.get() == EntrySide::Debit
    }

    pub fn is_credit(&self) -> bool {
        *self.side.get() == EntrySide::Credit
    }

    /// Debit-positive signed amount
    pub fn signed_amount(&self) -> Money {
        match self.side.get() {
            EntrySide::Debit => *self.amount.get(),
            EntrySide::Credit => -*self.amount.get(),
        }
    }
}

impl Entity for JournalEntry {
    const TABLE: Table = Table::JournalEntries;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn merge_fields(&self, other: &Self) -> Self {
        Self {
            meta: self.meta.clone(),
            transaction_id: self.transaction_id.merge(&other.transaction_id),
            account_id: self.account_id.merge(&other.account_id),
            side: self.side.merge(&other.side),
            amount: self.amount.merge(&other.amount),
        }
    }

    fn into_record(self) -> Record {
        Record::JournalEntry(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::JournalEntry(j) => Some(j),
            _ => None,
        }
    }

    fn references(&self) -> Vec<Reference> {
        vec![
            Reference {
                field: "transaction_id",
                table: Table::Transactions,
                id: *self.transaction_id.get(),
            },
            Reference {
                field: "account_id",
                table: Table::Accounts,
                id: *self.account_id.get(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_sides() {
        assert!(AccountType::Asset.is_debit_normal());
        assert!(AccountType::Expense.is_debit_normal());
        assert!(!AccountType::Revenue.is_debit_normal());
        assert!(!AccountType::Liability.is_debit_normal());
        assert!(!AccountType::Equity.is_debit_normal());
    }

    #[test]
    fn test_signed_amount() {
        let ts = HlcTimestamp::new(1, 0, "a");
        let debit = JournalEntry::new(EntityId::new(), EntityId::new(), EntrySide::Debit, Money(700), ts.clone());
        let credit = JournalEntry::new(EntityId::new(), EntityId::new(), EntrySide::Credit, Money(700), ts);

        assert_eq!(debit.signed_amount() + credit.signed_amount(), Money::ZERO);
        assert!(debit.is_debit() && credit.is_credit());
        assert_eq!(debit.references().len(), 2);
    }
}
