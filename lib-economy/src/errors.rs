//! Engine errors.

use thiserror::Error;

use lib_ledger::LedgerError;
use lib_types::Tier;

/// Error during engine operations.
///
/// Duplicate accruals never surface here; the ledger reports them as skip
/// outcomes. Per-item failures inside a batch are aggregated into the run
/// report instead of aborting the batch.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A subscription references a tier with no configured allocation
    #[error("invalid tier: no allocation configured for '{0}'")]
    InvalidTier(Tier),

    /// The ledger store rejected an operation
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The referral graph service could not be reached
    #[error("referral graph unavailable: {0}")]
    GraphUnavailable(String),

    /// The subscription directory could not be reached
    #[error("subscription directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Economy configuration failed validation
    #[error("invalid economy configuration: {0}")]
    Config(String),

    /// A month argument was not of the form YYYY-MM
    #[error("invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
