//! Parse errors for platform primitives.

use thiserror::Error;

/// Error converting platform string representations into typed values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown subscription status: {0}")]
    UnknownStatus(String),

    #[error("unknown rank: {0}")]
    UnknownRank(String),
}
