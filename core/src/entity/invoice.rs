//! Invoices and invoice line items

use super::{Entity, EntityMeta, Record, Reference};
use crate::crdt::{HlcTimestamp, LwwRegister, Mergeable, PnCounter};
use crate::types::{EntityId, Money, Table};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub meta: EntityMeta,
    pub customer_id: LwwRegister<EntityId>,
    pub invoice_number: LwwRegister<String>,
    pub status: LwwRegister<InvoiceStatus>,
    pub issue_date: LwwRegister<NaiveDate>,
    pub due_date: LwwRegister<Option<NaiveDate>>,
    pub subtotal: LwwRegister<Money>,
    pub tax_amount: LwwRegister<Money>,
    pub total: LwwRegister<Money>,
    /// Payments recorded against the invoice, in cents
    pub amount_paid: PnCounter,
    pub notes: LwwRegister<Option<String>>,
}

impl Invoice {
    pub fn new(
        customer_id: EntityId,
        invoice_number: impl Into<String>,
        issue_date: NaiveDate,
        timestamp: HlcTimestamp,
    ) -> Self {
        Self {
            meta: EntityMeta::new(EntityId::new(), timestamp.clone()),
            customer_id: LwwRegister::new(customer_id, timestamp.clone()),
            invoice_number: LwwRegister::new(invoice_number.into(), timestamp.clone()),
            status: LwwRegister::new(InvoiceStatus::Draft, timestamp.clone()),
            issue_date: LwwRegister::new(issue_date, timestamp.clone()),
            due_date: LwwRegister::new(None, timestamp.clone()),
            subtotal: LwwRegister::new(Money::ZERO, timestamp.clone()),
            tax_amount: LwwRegister::new(Money::ZERO, timestamp.clone()),
            total: LwwRegister::new(Money::ZERO, timestamp.clone()),
            amount_paid: PnCounter::new(),
            notes: LwwRegister::new(None, timestamp),
        }
    }

    /// Set subtotal and tax; total is derived from both
    pub fn set_amounts(&mut self, subtotal: Money, tax_amount: Money, timestamp: &HlcTimestamp) {
        self.subtotal.set(subtotal, timestamp.clone());
        self.tax_amount.set(tax_amount, timestamp.clone());
        self.total.set(subtotal + tax_amount, timestamp.clone());
    }

    pub fn record_payment(&mut self, amount: Money, timestamp: HlcTimestamp) {
        self.amount_paid.increment(amount.cents(), timestamp);
    }

    pub fn amount_paid(&self) -> Money {
        Money(self.amount_paid.value())
    }

    pub fn balance_due(&self) -> Money {
        *self.total.get() - self.amount_paid()
    }
}

impl Entity for Invoice {
    const TABLE: Table = Table::Invoices;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn merge_fields(&self, other: &Self) -> Self {
        Self {
            meta: self.meta.clone(),
            customer_id: self.customer_id.merge(&other.customer_id),
            invoice_number: self.invoice_number.merge(&other.invoice_number),
            status: self.status.merge(&other.status),
            issue_date: self.issue_date.merge(&other.issue_date),
            due_date: self.due_date.merge(&other.due_date),
            subtotal: self.subtotal.merge(&other.subtotal),
            tax_amount: self.tax_amount.merge(&other.tax_amount),
            total: self.total.merge(&other.total),
            amount_paid: self.amount_paid.merge(&other.amount_paid),
            notes: self.notes.merge(&other.notes),
        }
    }

    fn into_record(self) -> Record {
        Record::Invoice(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Invoice(i) => Some(i),
            _ => None,
        }
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference {
            field: "customer_id",
            table: Table::Customers,
            id: *self.customer_id.get(),
        }]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub meta: EntityMeta,
    pub invoice_id: LwwRegister<EntityId>,
    pub description: LwwRegister<String>,
    pub quantity: LwwRegister<u32>,
    pub unit_price: LwwRegister<Money>,
    pub line_total: LwwRegister<Money>,
}

impl InvoiceItem {
    pub fn new(
        invoice_id: EntityId,
        description: impl Into<String>,
        quantity: u32,
        unit_price: Money,
        timestamp: HlcTimestamp,
    ) -> Self {
        Self {
            meta: EntityMeta::new(EntityId::new(), timestamp.clone()),
            invoice_id: LwwRegister::new(invoice_id, timestamp.clone()),
            description: LwwRegister::new(description.into(), timestamp.clone()),
            quantity: LwwRegister::new(quantity, timestamp.clone()),
            unit_price: LwwRegister::new(unit_price, timestamp.clone()),
            line_total: LwwRegister::new(unit_price.times(quantity), timestamp),
        }
    }

    /// Change quantity and price together, keeping line_total consistent
    pub fn set_pricing(&mut self, quantity: u32, unit_price: Money, timestamp: &HlcTimestamp) {
        self.quantity.set(quantity, timestamp.clone());
        self.unit_price.set(unit_price, timestamp.clone());
        self.line_total.set(unit_price.times(quantity), timestamp.clone());
    }
}

impl Entity for InvoiceItem {
    const TABLE: Table = Table::InvoiceItems;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn merge_fields(&self, other: &Self) -> Self {
        Self {
            meta: self.meta.clone(),
            invoice_id: self.invoice_id.merge(&other.invoice_id),
            description: self.description.merge(&other.description),
            quantity: self.quantity.merge(&other.quantity),
            unit_price: self.unit_price.merge(&other.unit_price),
            line_total: self.line_total.merge(&other.line_total),
        }
    }

    fn into_record(self) -> Record {
        Record::InvoiceItem(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::InvoiceItem(i) => Some(i),
            _ => None,
        }
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference {
            field: "invoice_id",
            table: Table::Invoices,
            id: *self.invoice_id.get(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(physical: u64, node: &str) -> HlcTimestamp {
        HlcTimestamp::new(physical, 0, node)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_invoice_amounts_and_payments() {
        let mut invoice = Invoice::new(EntityId::new(), "INV-001", date(), ts(1, "a"));
        invoice.set_amounts(Money(10_000), Money(900), &ts(2, "a"));
        invoice.record_payment(Money(4_000), ts(3, "a"));

        assert_eq!(*invoice.total.get(), Money(10_900));
        assert_eq!(invoice.balance_due(), Money(6_900));
    }

    #[test]
    fn test_concurrent_payments_accumulate() {
        let mut base = Invoice::new(EntityId::new(), "INV-002", date(), ts(1, "a"));
        base.set_amounts(Money(5_000), Money::ZERO, &ts(2, "a"));

        let mut a = base.clone();
        a.record_payment(Money(1_000), ts(3, "a"));
        let mut b = base.clone();
        b.record_payment(Money(2_500), ts(3, "b"));

        let merged = a.merge_fields(&b);
        assert_eq!(merged.amount_paid(), Money(3_500));
    }

    #[test]
    fn test_item_pricing_keeps_line_total() {
        let mut item = InvoiceItem::new(EntityId::new(), "Consulting", 3, Money(15_000), ts(1, "a"));
        assert_eq!(*item.line_total.get(), Money(45_000));

        item.set_pricing(2, Money(12_500), &ts(2, "a"));
        assert_eq!(*item.line_total.get(), Money(25_000));
        assert_eq!(item.references()[0].table, Table::Invoices);
    }
}
