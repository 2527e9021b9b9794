//! Ledger row and insert types.
//!
//! Row structs mirror the SQLite schema (`FromRow`); insert structs carry
//! the caller-supplied fields while the store stamps `created_at` itself.
//! Rows are immutable once written; corrections happen through
//! compensating records, never updates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use lib_types::{Amount, Bps, EventId, Rank, SubscriberId, SubscriptionId, Tier};

use crate::errors::LedgerError;

/// Outcome of an idempotent-keyed insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// A row with the same idempotency key already existed; nothing written
    Duplicate,
}

impl InsertOutcome {
    /// Whether this outcome wrote a new row
    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

// ============================================================================
// Distribution ledger
// ============================================================================

/// New daily accrual entry, keyed by (subscriber, subscription, date)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDistribution {
    pub subscriber_id: SubscriberId,
    pub subscription_id: SubscriptionId,
    pub tier: Tier,
    /// Daily entitlement in micro-MRD
    pub token_amount: Amount,
    pub distribution_date: NaiveDate,
}

/// Stored daily accrual entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DistributionRecordRow {
    pub id: i64,
    pub subscriber_id: String,
    pub subscription_id: String,
    pub tier: String,
    pub token_amount: Amount,
    pub distribution_date: NaiveDate,
    /// Unix seconds
    pub created_at: i64,
}

// ============================================================================
// Commission ledger
// ============================================================================

/// New commission entry, keyed by (earner, source event, level)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommission {
    pub earner_id: SubscriberId,
    pub source_subscriber_id: SubscriberId,
    pub source_event_id: EventId,
    /// Referral level of the earner relative to the source subscriber
    pub level: u32,
    pub rate_bps: Bps,
    /// Commission in micro-USD
    pub commission_amount: Amount,
}

/// Stored commission entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionRecordRow {
    pub id: i64,
    pub earner_id: String,
    pub source_subscriber_id: String,
    pub source_event_id: String,
    pub level: i64,
    pub rate_bps: i64,
    pub commission_amount: Amount,
    /// Unix seconds
    pub created_at: i64,
}

/// Per-level commission aggregate for one distribution date
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionLevelSummary {
    pub level: i64,
    pub records: i64,
    pub total_amount: Amount,
}

// ============================================================================
// Rank bonus ledger
// ============================================================================

/// Terminal state of a subscriber-month rank evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBonusStatus {
    /// A rank was reached and the bonus was disbursed
    Paid,
    /// Evaluated, no rank reached; recorded so the month is never revisited
    NoRank,
}

impl fmt::Display for RankBonusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankBonusStatus::Paid => write!(f, "paid"),
            RankBonusStatus::NoRank => write!(f, "no_rank"),
        }
    }
}

impl FromStr for RankBonusStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(RankBonusStatus::Paid),
            "no_rank" => Ok(RankBonusStatus::NoRank),
            other => Err(LedgerError::InvalidField {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// New rank-bonus entry, keyed by (subscriber, month)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRankBonus {
    pub subscriber_id: SubscriberId,
    /// Month in `YYYY-MM` form
    pub month: String,
    /// Achieved rank; `None` for a no-rank terminal record
    pub rank: Option<Rank>,
    /// Total bonus in micro-USD (zero when no rank)
    pub bonus_total: Amount,
    /// MRD half of the split, micro-units
    pub mrd_amount: Amount,
    /// MGC half of the split, micro-units
    pub mgc_amount: Amount,
    pub status: RankBonusStatus,
}

/// Stored rank-bonus entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RankBonusRow {
    pub id: i64,
    pub subscriber_id: String,
    pub month: String,
    /// Rank name, or empty string for a no-rank record
    pub rank: String,
    pub bonus_total: Amount,
    pub mrd_amount: Amount,
    pub mgc_amount: Amount,
    pub status: String,
    /// Unix seconds
    pub created_at: i64,
}

impl RankBonusRow {
    /// Parsed terminal status of this record
    pub fn parsed_status(&self) -> Result<RankBonusStatus, LedgerError> {
        self.status.parse()
    }
}

/// Aggregate view of one month's rank-bonus run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankBonusSummary {
    pub month: String,
    pub paid: i64,
    pub no_rank: i64,
    pub total_bonus: Amount,
    pub total_mrd: Amount,
    pub total_mgc: Amount,
}

// ============================================================================
// Wallet aggregate
// ============================================================================

/// Cached wallet balance, derived from the distribution ledger
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletRow {
    pub subscriber_id: String,
    /// Micro-MRD
    pub token_balance: Amount,
    /// Unix seconds of the last reconciliation, if any
    pub last_reconciled_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_bonus_status_round_trip() {
        assert_eq!(
            "paid".parse::<RankBonusStatus>().unwrap(),
            RankBonusStatus::Paid
        );
        assert_eq!(
            "no_rank".parse::<RankBonusStatus>().unwrap(),
            RankBonusStatus::NoRank
        );
        assert!("pending".parse::<RankBonusStatus>().is_err());
    }

    #[test]
    fn test_insert_outcome() {
        assert!(InsertOutcome::Inserted.was_inserted());
        assert!(!InsertOutcome::Duplicate.was_inserted());
    }
}
