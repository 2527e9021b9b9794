//! Versioned economy configuration.
//!
//! Allocation, commission-rate, and rank tables are business parameters.
//! They are deserialized from configuration, validated once, and shared as
//! an immutable snapshot (`Arc<EconomyParams>`) for the whole of a batch
//! run, so a run is always computed against one consistent rule set.
//!
//! All amounts are micro-units; all rates are basis points. Integer
//! arithmetic throughout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use lib_types::{Amount, Bps, Rank, Tier, BPS_DENOMINATOR, MICROS_PER_TOKEN};

use crate::errors::{EngineError, EngineResult};

/// Days in an entitlement year; daily amount = yearly / 365, floored
pub const DAYS_PER_YEAR: Amount = 365;

/// Apply a basis-point rate to a micro-unit amount (floor)
pub fn apply_rate(base: Amount, rate: Bps) -> Amount {
    base * rate as Amount / BPS_DENOMINATOR
}

// ============================================================================
// Allocation table
// ============================================================================

/// Per-tier entitlement and commission ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    /// Yearly token entitlement in micro-MRD
    pub yearly_tokens: Amount,
    /// How many referral levels below their own position a holder of this
    /// tier may earn commission on
    pub commission_depth: u32,
}

/// Static mapping of subscription tier to allocation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationTable {
    entries: BTreeMap<String, AllocationEntry>,
}

impl AllocationTable {
    /// Build a table from (tier, entry) pairs
    pub fn new(entries: impl IntoIterator<Item = (Tier, AllocationEntry)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(tier, entry)| (tier.as_str().to_string(), entry))
                .collect(),
        }
    }

    /// Look up the allocation entry for a tier
    pub fn entry(&self, tier: &Tier) -> Option<&AllocationEntry> {
        self.entries.get(tier.as_str())
    }

    /// Daily entitlement for a tier in micro-MRD, `None` for unknown tiers
    pub fn daily_amount(&self, tier: &Tier) -> Option<Amount> {
        self.entry(tier).map(|e| e.yearly_tokens / DAYS_PER_YEAR)
    }

    /// Commission ceiling for a tier, `None` for unknown tiers
    pub fn commission_depth(&self, tier: &Tier) -> Option<u32> {
        self.entry(tier).map(|e| e.commission_depth)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.entries.is_empty() {
            return Err(EngineError::Config("allocation table is empty".into()));
        }
        for (tier, entry) in &self.entries {
            if entry.yearly_tokens <= 0 {
                return Err(EngineError::Config(format!(
                    "tier '{}' has non-positive yearly allocation",
                    tier
                )));
            }
        }
        Ok(())
    }
}

impl Default for AllocationTable {
    fn default() -> Self {
        Self::new([
            (
                Tier::new("starter"),
                AllocationEntry {
                    yearly_tokens: 500 * MICROS_PER_TOKEN,
                    commission_depth: 1,
                },
            ),
            (
                Tier::new("vip"),
                AllocationEntry {
                    yearly_tokens: 6_900 * MICROS_PER_TOKEN,
                    commission_depth: 15,
                },
            ),
        ])
    }
}

// ============================================================================
// Commission rate table
// ============================================================================

/// Per-level commission rates in basis points, index 0 = level 1.
///
/// Rates must be non-increasing with depth; the table length bounds
/// commission fanout globally (no one earns past the last level).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRateTable {
    levels: Vec<Bps>,
}

impl CommissionRateTable {
    /// Build a table from per-level rates (index 0 = level 1)
    pub fn new(levels: Vec<Bps>) -> Self {
        Self { levels }
    }

    /// Rate for a 1-based level, `None` past the end of the table
    pub fn rate_for_level(&self, level: u32) -> Option<Bps> {
        if level == 0 {
            return None;
        }
        self.levels.get(level as usize - 1).copied()
    }

    /// Deepest level any earner can be paid on
    pub fn max_level(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Borrow the raw per-level rates
    pub fn levels(&self) -> &[Bps] {
        &self.levels
    }

    fn validate(&self) -> EngineResult<()> {
        if self.levels.is_empty() {
            return Err(EngineError::Config("commission rate table is empty".into()));
        }
        for pair in self.levels.windows(2) {
            if pair[1] > pair[0] {
                return Err(EngineError::Config(
                    "commission rates must be non-increasing with depth".into(),
                ));
            }
        }
        if self.levels[0] as Amount > BPS_DENOMINATOR {
            return Err(EngineError::Config("commission rate exceeds 100%".into()));
        }
        Ok(())
    }
}

impl Default for CommissionRateTable {
    fn default() -> Self {
        // Level 1: 10%; levels 2-6: 5%; levels 7-10: 2.5%; levels 11-15: 1%
        let mut levels = vec![1000];
        levels.extend([500; 5]);
        levels.extend([250; 4]);
        levels.extend([100; 5]);
        Self::new(levels)
    }
}

// ============================================================================
// Rank table
// ============================================================================

/// One rank threshold row.
///
/// A subscriber reaches the rank when all three thresholds are met: enough
/// direct referrals, enough qualifying groups (depth-1 branches containing a
/// member at `group_depth` or deeper), and by implication the downline depth
/// those groups require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRow {
    pub rank: Rank,
    /// Minimum direct (depth-1) referrals
    pub min_direct: u32,
    /// Minimum number of qualifying depth-1 branches
    pub min_groups: u32,
    /// Depth a branch must reach to qualify
    pub group_depth: u32,
    /// Monthly bonus in micro-USD, split 50/50 MRD/MGC
    pub monthly_bonus: Amount,
}

/// Ordered rank thresholds, highest rank first; first matching row wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankTable {
    rows: Vec<RankRow>,
}

impl RankTable {
    /// Build a table from rows ordered highest rank first
    pub fn new(rows: Vec<RankRow>) -> Self {
        Self { rows }
    }

    /// Borrow the ordered rows
    pub fn rows(&self) -> &[RankRow] {
        &self.rows
    }

    fn validate(&self) -> EngineResult<()> {
        if self.rows.is_empty() {
            return Err(EngineError::Config("rank table is empty".into()));
        }
        for pair in self.rows.windows(2) {
            if pair[1].rank >= pair[0].rank {
                return Err(EngineError::Config(
                    "rank rows must be ordered highest rank first".into(),
                ));
            }
        }
        for row in &self.rows {
            if row.monthly_bonus <= 0 {
                return Err(EngineError::Config(format!(
                    "rank '{}' has non-positive bonus",
                    row.rank
                )));
            }
        }
        Ok(())
    }
}

impl Default for RankTable {
    fn default() -> Self {
        const USD: Amount = MICROS_PER_TOKEN;
        Self::new(vec![
            RankRow {
                rank: Rank::Diamond,
                min_direct: 12,
                min_groups: 5,
                group_depth: 10,
                monthly_bonus: 14_904 * USD,
            },
            RankRow {
                rank: Rank::Platinum,
                min_direct: 8,
                min_groups: 4,
                group_depth: 10,
                monthly_bonus: 8_832 * USD,
            },
            RankRow {
                rank: Rank::Gold,
                min_direct: 6,
                min_groups: 3,
                group_depth: 10,
                monthly_bonus: 4_830 * USD,
            },
            RankRow {
                rank: Rank::Silver,
                min_direct: 5,
                min_groups: 3,
                group_depth: 10,
                monthly_bonus: 2_484 * USD,
            },
            RankRow {
                rank: Rank::Bronze,
                min_direct: 5,
                min_groups: 2,
                group_depth: 10,
                monthly_bonus: 690 * USD,
            },
        ])
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable economy configuration snapshot for one batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyParams {
    /// Snapshot version, bumped whenever business rules change
    pub version: u32,
    /// Tier → yearly entitlement and commission depth
    pub allocations: AllocationTable,
    /// Per-level commission rates
    pub rates: CommissionRateTable,
    /// Ordered rank thresholds
    pub ranks: RankTable,
    /// Stable reference value per accrual event in micro-USD; commissions
    /// are computed against this, not against the token amount
    pub commission_base_value: Amount,
    /// Tolerated wallet drift in micro-MRD before reconciliation rewrites
    pub reconcile_epsilon: Amount,
}

impl Default for EconomyParams {
    fn default() -> Self {
        Self {
            version: 1,
            allocations: AllocationTable::default(),
            rates: CommissionRateTable::default(),
            ranks: RankTable::default(),
            commission_base_value: 440_000, // $0.44 per accrual event
            reconcile_epsilon: 0,
        }
    }
}

impl EconomyParams {
    /// Validate the whole snapshot; called at load and at batch start
    pub fn validate(&self) -> EngineResult<()> {
        self.allocations.validate()?;
        self.rates.validate()?;
        self.ranks.validate()?;
        if self.commission_base_value <= 0 {
            return Err(EngineError::Config(
                "commission base value must be positive".into(),
            ));
        }
        if self.reconcile_epsilon < 0 {
            return Err(EngineError::Config(
                "reconcile epsilon must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_rate() {
        assert_eq!(apply_rate(440_000, 1000), 44_000); // 10% of $0.44
        assert_eq!(apply_rate(440_000, 500), 22_000);
        assert_eq!(apply_rate(440_000, 250), 11_000);
        assert_eq!(apply_rate(440_000, 100), 4_400);
        assert_eq!(apply_rate(0, 1000), 0);
    }

    #[test]
    fn test_daily_amount_floor_division() {
        let table = AllocationTable::default();
        // 500_000_000 / 365 = 1_369_863.01..., floored
        assert_eq!(table.daily_amount(&Tier::new("starter")), Some(1_369_863));
        // 6_900_000_000 / 365 = 18_904_109.58..., floored
        assert_eq!(table.daily_amount(&Tier::new("vip")), Some(18_904_109));
        assert_eq!(table.daily_amount(&Tier::new("gold-plan")), None);
    }

    #[test]
    fn test_rate_lookup_bounds() {
        let rates = CommissionRateTable::default();
        assert_eq!(rates.rate_for_level(0), None);
        assert_eq!(rates.rate_for_level(1), Some(1000));
        assert_eq!(rates.rate_for_level(6), Some(500));
        assert_eq!(rates.rate_for_level(7), Some(250));
        assert_eq!(rates.rate_for_level(11), Some(100));
        assert_eq!(rates.rate_for_level(15), Some(100));
        assert_eq!(rates.rate_for_level(16), None);
        assert_eq!(rates.max_level(), 15);
    }

    #[test]
    fn test_increasing_rates_rejected() {
        let table = CommissionRateTable::new(vec![100, 500]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_rank_table_order_enforced() {
        let mut rows = RankTable::default().rows().to_vec();
        rows.reverse();
        assert!(RankTable::new(rows).validate().is_err());
    }

    #[test]
    fn test_params_serde_round_trip() {
        let params = EconomyParams::default();
        let json = serde_json::to_string(&params).unwrap();
        let back: EconomyParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
