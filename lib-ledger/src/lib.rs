//! Append-only accrual ledger on SQLite.
//!
//! Source of truth for distribution, commission, and rank-bonus records,
//! plus the derived wallet aggregate. Every idempotency key in the system
//! is enforced here as a storage-level UNIQUE constraint, so concurrent or
//! retried batch runs cannot double-write regardless of in-process checks.

pub mod errors;
pub mod records;
pub mod store;

pub use errors::{LedgerError, LedgerResult};
pub use records::{
    CommissionLevelSummary, CommissionRecordRow, DistributionRecordRow, InsertOutcome,
    NewCommission, NewDistribution, NewRankBonus, RankBonusRow, RankBonusStatus,
    RankBonusSummary, WalletRow,
};
pub use store::LedgerStore;
