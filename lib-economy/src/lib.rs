//! Meridian accrual economics engine.
//!
//! Implements the recurring value-accrual and commission-fanout pipeline of
//! the membership platform:
//! - Daily token entitlement per active subscription, exactly once per
//!   (subscriber, subscription, day)
//! - Commission fanout up the referral tree, bounded by each ancestor's own
//!   subscription tier
//! - Ledger-driven wallet reconciliation (ledger wins, cache is rebuilt)
//! - Monthly rank bonuses classified from downline shape
//!
//! # Design Principles
//!
//! - **Integer math only.** Token amounts and reference values are micro-unit
//!   integers; rates are basis points. No floating-point rounding drift.
//! - **Idempotency at the storage layer.** Every write is protected by a
//!   UNIQUE key in `lib-ledger`; engines treat duplicate outcomes as skips.
//! - **Explicit dates.** Every operation takes `as_of_date` / `month`
//!   parameters; engines never read the wall clock.
//! - **Versioned config snapshot.** Allocation, rate, and rank tables are
//!   loaded once per run and validated; a run never observes a mid-flight
//!   configuration change.

pub mod collaborators;
pub mod commission;
pub mod distribution;
pub mod errors;
pub mod params;
pub mod rank;
pub mod reconcile;
pub mod testing;

pub use collaborators::{Notifier, NotifyEvent, ReferralGraph, SubscriptionDirectory};
pub use commission::{AccrualEvent, CommissionEngine, CommissionReport};
pub use distribution::{DistributionEngine, DistributionRunReport};
pub use errors::{EngineError, EngineResult};
pub use params::{
    AllocationEntry, AllocationTable, CommissionRateTable, EconomyParams, RankRow, RankTable,
    DAYS_PER_YEAR,
};
pub use rank::{DownlineShape, GroupStats, RankBonusEngine, RankRunReport};
pub use reconcile::{BalanceReconciler, ReconcileReport};

#[cfg(test)]
mod invariant_tests {
    use super::*;
    use lib_types::Tier;

    #[test]
    fn default_params_are_valid() {
        EconomyParams::default().validate().unwrap();
    }

    #[test]
    fn default_rates_are_non_increasing() {
        let rates = CommissionRateTable::default();
        let levels = rates.levels();
        for pair in levels.windows(2) {
            assert!(
                pair[0] >= pair[1],
                "commission rates must not increase with depth: {:?}",
                levels
            );
        }
    }

    #[test]
    fn default_daily_amounts_match_reference_values() {
        // starter: 500 MRD / 365 days; vip: 6900 MRD / 365 days
        let allocations = AllocationTable::default();
        assert_eq!(
            allocations.daily_amount(&Tier::new("starter")),
            Some(1_369_863)
        );
        assert_eq!(allocations.daily_amount(&Tier::new("vip")), Some(18_904_109));
    }

    #[test]
    fn default_rank_bonuses_split_evenly() {
        for row in RankTable::default().rows() {
            let half = row.monthly_bonus / 2;
            assert_eq!(half * 2, row.monthly_bonus, "bonus for {} must split 50/50 exactly", row.rank);
        }
    }
}
