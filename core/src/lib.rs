//! BizSync Core Library
//!
//! The local-first consistency engine behind BizSync. Independent devices
//! mutate a shared business ledger (customers, invoices, journal entries)
//! offline and merge later without a coordinator. This library provides
//! hybrid logical clocks, per-field CRDTs, transactional writes with a
//! hash-chained audit trail, and double-entry bookkeeping checks.

pub mod accounting;
pub mod audit;
pub mod backup;
pub mod config;
pub mod crdt;
pub mod entity;
pub mod integrity;
pub mod node;
pub mod storage;
pub mod sync;
pub mod transaction;
pub mod types;
pub mod version;

pub use config::NodeConfig;
pub use node::Node;
pub use types::*;
pub use version::version_string;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transaction {transaction_id} failed: {reason}")]
    TransactionFailure {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("Journal entry is not balanced: debits {debits}, credits {credits}")]
    ImbalancedLedger { debits: Money, credits: Money },

    #[error("Audit chain broken at sequence {sequence}: {reason}")]
    AuditChainBroken { sequence: u64, reason: String },

    #[error("Record not found: {table}/{id}")]
    NotFound { table: Table, id: EntityId },

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Cannot merge versions: {0}")]
    MergeConflict(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
