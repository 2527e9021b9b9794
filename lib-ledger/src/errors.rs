//! Ledger store errors.

use thiserror::Error;

/// Error during ledger operations.
///
/// Duplicate idempotency keys are not errors: inserts report them as
/// [`crate::records::InsertOutcome::Duplicate`] because a repeated write is
/// the expected outcome of a retried batch.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(sqlx::Error),

    #[error("invalid record field {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
