//! Double-entry bookkeeping
//!
//! Every financial mutation is a balanced set of journal lines: total debits
//! equal total credits, in integer cents. Unbalanced entries are rejected
//! before anything is written.

mod double_entry;

pub use double_entry::{AccountBalance, DoubleEntryService, JournalEntryLine, TrialBalanceStatus, DEFAULT_CHART};

use crate::types::Money;

/// Allowed |debits - credits| for a balanced entry
///
/// Amounts are integral cents, so any difference is a real imbalance.
pub const ROUNDING_TOLERANCE: Money = Money::ZERO;

/// True if the two totals agree within [`ROUNDING_TOLERANCE`]
pub fn is_balanced(debits: Money, credits: Money) -> bool {
    let diff = i128::from(debits.cents()) - i128::from(credits.cents());
    diff.abs() <= i128::from(ROUNDING_TOLERANCE.cents())
}
