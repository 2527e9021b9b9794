//! Monthly rank bonus engine.
//!
//! Classifies each referrer into a rank from the shape of their downline
//! (direct referrals, qualifying depth-1 groups, downline depth) and
//! disburses the rank's monthly bonus split 50/50 across MRD and MGC.
//! Every subscriber-month reaches exactly one terminal state (paid or
//! no-rank), recorded under a UNIQUE (subscriber, month) key and never
//! revisited.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use lib_ledger::{LedgerStore, NewRankBonus, RankBonusRow, RankBonusStatus};
use lib_types::{ReferralEdge, SubscriberId};

use crate::collaborators::{Notifier, NotifyEvent, ReferralGraph};
use crate::errors::{EngineError, EngineResult};
use crate::params::{EconomyParams, RankRow};

/// Aggregate shape of one depth-1 branch of a downline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    /// The direct referral rooting this branch
    pub root: SubscriberId,
    /// Members in the branch, root included
    pub members: u32,
    /// Deepest level the branch reaches, measured from the referrer
    pub max_depth: u32,
}

/// Downline shape used for rank classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlineShape {
    /// Direct (depth-1) referrals
    pub direct_count: u32,
    /// Total reachable members
    pub total_members: u32,
    /// Deepest level reached anywhere in the downline
    pub max_depth: u32,
    /// Per-branch aggregates, in (root id) order
    pub groups: Vec<GroupStats>,
}

impl DownlineShape {
    /// Fold a parent-labeled downline snapshot into branch aggregates.
    ///
    /// Members are processed in (depth, id) order so the assignment of
    /// members to branches is deterministic. Edges whose parent is not yet
    /// assigned to a branch (inconsistent snapshot) are ignored.
    pub fn from_edges(root: &SubscriberId, edges: &[ReferralEdge]) -> Self {
        let mut sorted: Vec<&ReferralEdge> = edges.iter().collect();
        sorted.sort_by(|a, b| {
            (a.depth, a.referred_id.as_str()).cmp(&(b.depth, b.referred_id.as_str()))
        });

        let mut groups: Vec<GroupStats> = Vec::new();
        let mut branch_of: HashMap<String, usize> = HashMap::new();
        let mut max_depth = 0;
        let mut total_members = 0;

        for edge in sorted {
            let branch = if edge.depth == 1 {
                if edge.referrer_id != *root {
                    debug!(member = %edge.referred_id, "ignoring depth-1 edge with foreign parent");
                    continue;
                }
                groups.push(GroupStats {
                    root: edge.referred_id.clone(),
                    members: 0,
                    max_depth: 0,
                });
                let index = groups.len() - 1;
                branch_of.insert(edge.referred_id.as_str().to_string(), index);
                index
            } else {
                match branch_of.get(edge.referrer_id.as_str()) {
                    Some(&index) => {
                        branch_of.insert(edge.referred_id.as_str().to_string(), index);
                        index
                    }
                    None => {
                        debug!(member = %edge.referred_id, "ignoring orphaned downline edge");
                        continue;
                    }
                }
            };

            groups[branch].members += 1;
            groups[branch].max_depth = groups[branch].max_depth.max(edge.depth);
            max_depth = max_depth.max(edge.depth);
            total_members += 1;
        }

        DownlineShape {
            direct_count: groups.len() as u32,
            total_members,
            max_depth,
            groups,
        }
    }

    /// Number of branches containing a member at `depth` or deeper
    pub fn qualifying_groups(&self, depth: u32) -> u32 {
        self.groups.iter().filter(|g| g.max_depth >= depth).count() as u32
    }
}

impl crate::params::RankTable {
    /// First rank row, highest to lowest, whose thresholds the shape meets
    pub fn classify(&self, shape: &DownlineShape) -> Option<&RankRow> {
        self.rows().iter().find(|row| {
            shape.direct_count >= row.min_direct
                && shape.qualifying_groups(row.group_depth) >= row.min_groups
        })
    }
}

/// Summary of one monthly rank-bonus run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRunReport {
    /// Referrers whose month reached a terminal state (this run or earlier)
    pub evaluated: u64,
    /// Terminal records with a paid bonus
    pub paid: u64,
    /// Referrers whose month had already been evaluated before this run
    pub already_evaluated: u64,
    /// Referrers that could not be evaluated (replayable)
    pub failed: u64,
}

/// Monthly batch engine for rank bonuses
#[derive(Clone)]
pub struct RankBonusEngine {
    store: LedgerStore,
    graph: Arc<dyn ReferralGraph>,
    notifier: Arc<dyn Notifier>,
    params: Arc<EconomyParams>,
}

impl RankBonusEngine {
    pub fn new(
        store: LedgerStore,
        graph: Arc<dyn ReferralGraph>,
        notifier: Arc<dyn Notifier>,
        params: Arc<EconomyParams>,
    ) -> Self {
        Self {
            store,
            graph,
            notifier,
            params,
        }
    }

    /// Evaluate one subscriber for one month.
    ///
    /// Returns the month's terminal record, or `None` for subscribers with
    /// no downline (nothing to classify). Idempotent: once a terminal
    /// record exists it is returned unchanged on every later call.
    pub async fn evaluate(
        &self,
        subscriber: &SubscriberId,
        month: &str,
    ) -> EngineResult<Option<RankBonusRow>> {
        validate_month(month)?;

        if let Some(existing) = self.store.rank_bonus_for(subscriber, month).await? {
            return Ok(Some(existing));
        }

        let edges = self
            .graph
            .downline_of(subscriber)
            .await
            .map_err(|e| EngineError::GraphUnavailable(e.to_string()))?;
        if edges.is_empty() {
            return Ok(None);
        }

        let shape = DownlineShape::from_edges(subscriber, &edges);
        let new = match self.params.ranks.classify(&shape) {
            Some(row) => {
                let mrd_amount = row.monthly_bonus / 2;
                info!(
                    subscriber = %subscriber,
                    month,
                    rank = %row.rank,
                    direct = shape.direct_count,
                    groups = shape.qualifying_groups(row.group_depth),
                    "rank bonus reached"
                );
                NewRankBonus {
                    subscriber_id: subscriber.clone(),
                    month: month.to_string(),
                    rank: Some(row.rank),
                    bonus_total: row.monthly_bonus,
                    mrd_amount,
                    mgc_amount: row.monthly_bonus - mrd_amount,
                    status: RankBonusStatus::Paid,
                }
            }
            None => NewRankBonus {
                subscriber_id: subscriber.clone(),
                month: month.to_string(),
                rank: None,
                bonus_total: 0,
                mrd_amount: 0,
                mgc_amount: 0,
                status: RankBonusStatus::NoRank,
            },
        };

        // A concurrent evaluator may have written the month first; either
        // way the stored row is the terminal state.
        self.store.insert_rank_bonus(&new).await?;
        Ok(self.store.rank_bonus_for(subscriber, month).await?)
    }

    /// Evaluate every referrer for one month.
    ///
    /// Partial success is the normal case; per-subscriber failures are
    /// counted and the run continues.
    pub async fn evaluate_all(&self, month: &str) -> EngineResult<RankRunReport> {
        validate_month(month)?;

        let referrers = self
            .graph
            .list_referrers()
            .await
            .map_err(|e| EngineError::GraphUnavailable(e.to_string()))?;

        info!(month, referrers = referrers.len(), "starting rank bonus run");

        let mut report = RankRunReport::default();
        for subscriber in &referrers {
            let previously_evaluated = self
                .store
                .rank_bonus_for(subscriber, month)
                .await?
                .is_some();

            match self.evaluate(subscriber, month).await {
                Ok(Some(row)) => {
                    report.evaluated += 1;
                    if previously_evaluated {
                        report.already_evaluated += 1;
                    }
                    if row.parsed_status()? == RankBonusStatus::Paid {
                        report.paid += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(subscriber = %subscriber, month, "rank evaluation failed: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            month,
            evaluated = report.evaluated,
            paid = report.paid,
            failed = report.failed,
            "rank bonus run finished"
        );

        self.notifier
            .notify(NotifyEvent::RankBonusRunCompleted {
                month: month.to_string(),
                evaluated: report.evaluated,
                paid: report.paid,
            })
            .await;

        Ok(report)
    }
}

fn validate_month(month: &str) -> EngineResult<()> {
    let parsed = chrono::NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d");
    if month.len() != 7 || parsed.is_err() {
        return Err(EngineError::InvalidMonth(month.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{RankTable, RankRow};
    use crate::testing::{InMemoryGraph, NoopNotifier};
    use lib_types::Rank;

    /// A shallow rank table so fixtures stay small: bronze needs 2 direct
    /// referrals and 2 branches reaching depth 2; silver needs 3/2/2.
    fn shallow_params() -> Arc<EconomyParams> {
        let mut params = EconomyParams::default();
        params.ranks = RankTable::new(vec![
            RankRow {
                rank: Rank::Silver,
                min_direct: 3,
                min_groups: 2,
                group_depth: 2,
                monthly_bonus: 2_484_000_000,
            },
            RankRow {
                rank: Rank::Bronze,
                min_direct: 2,
                min_groups: 2,
                group_depth: 2,
                monthly_bonus: 690_000_000,
            },
        ]);
        Arc::new(params)
    }

    async fn engine(graph: InMemoryGraph) -> (RankBonusEngine, LedgerStore) {
        let store = LedgerStore::open_in_memory().await.unwrap();
        let engine = RankBonusEngine::new(
            store.clone(),
            Arc::new(graph),
            Arc::new(NoopNotifier),
            shallow_params(),
        );
        (engine, store)
    }

    /// root with two branches each reaching depth 2
    fn bronze_graph() -> InMemoryGraph {
        let mut graph = InMemoryGraph::new();
        graph.add_referral("root", "a");
        graph.add_referral("a", "a1");
        graph.add_referral("root", "b");
        graph.add_referral("b", "b1");
        graph
    }

    #[tokio::test]
    async fn test_shape_partitions_branches() {
        let mut graph = bronze_graph();
        graph.add_referral("root", "c"); // shallow third branch

        let edges = graph.downline_of(&"root".into()).await.unwrap();
        let shape = DownlineShape::from_edges(&"root".into(), &edges);

        assert_eq!(shape.direct_count, 3);
        assert_eq!(shape.total_members, 5);
        assert_eq!(shape.max_depth, 2);
        assert_eq!(shape.qualifying_groups(2), 2);
        assert_eq!(shape.qualifying_groups(1), 3);
        assert_eq!(shape.qualifying_groups(3), 0);
    }

    #[tokio::test]
    async fn test_rank_reached_pays_split_bonus() {
        let (engine, _store) = engine(bronze_graph()).await;

        let row = engine
            .evaluate(&"root".into(), "2024-06")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.rank, "bronze");
        assert_eq!(row.status, "paid");
        assert_eq!(row.bonus_total, 690_000_000);
        assert_eq!(row.mrd_amount, 345_000_000);
        assert_eq!(row.mgc_amount, 345_000_000);
    }

    #[tokio::test]
    async fn test_highest_matching_rank_wins() {
        // Three branches reaching depth 2: silver, not bronze.
        let mut graph = bronze_graph();
        graph.add_referral("root", "c");
        graph.add_referral("c", "c1");

        let (engine, _store) = engine(graph).await;
        let row = engine
            .evaluate(&"root".into(), "2024-06")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.rank, "silver");
        assert_eq!(row.bonus_total, 2_484_000_000);
    }

    #[tokio::test]
    async fn test_no_rank_is_terminal() {
        // One branch only: evaluated, no rank, recorded.
        let mut graph = InMemoryGraph::new();
        graph.add_referral("root", "a");
        graph.add_referral("a", "a1");

        let (engine, store) = engine(graph).await;
        let row = engine
            .evaluate(&"root".into(), "2024-06")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "no_rank");
        assert_eq!(row.bonus_total, 0);

        let summary = store.rank_bonus_summary("2024-06").await.unwrap();
        assert_eq!(summary.no_rank, 1);
        assert_eq!(summary.paid, 0);
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent_per_month() {
        let (engine, store) = engine(bronze_graph()).await;

        let first = engine
            .evaluate(&"root".into(), "2024-06")
            .await
            .unwrap()
            .unwrap();
        let second = engine
            .evaluate(&"root".into(), "2024-06")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.rank, second.rank);

        let summary = store.rank_bonus_summary("2024-06").await.unwrap();
        assert_eq!(summary.paid, 1);
        assert_eq!(summary.total_bonus, 690_000_000);

        // A different month is a fresh evaluation.
        let july = engine
            .evaluate(&"root".into(), "2024-07")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(first.id, july.id);
    }

    #[tokio::test]
    async fn test_evaluate_all_covers_every_referrer() {
        let (engine, _store) = engine(bronze_graph()).await;

        let report = engine.evaluate_all("2024-06").await.unwrap();
        // Referrers: root, a, b. root is paid; a and b have shallow
        // downlines and terminate as no_rank.
        assert_eq!(report.evaluated, 3);
        assert_eq!(report.paid, 1);
        assert_eq!(report.failed, 0);

        let rerun = engine.evaluate_all("2024-06").await.unwrap();
        assert_eq!(rerun.evaluated, 3);
        assert_eq!(rerun.paid, 1);
        assert_eq!(rerun.already_evaluated, 3);
    }

    #[tokio::test]
    async fn test_invalid_month_rejected() {
        let (engine, _store) = engine(bronze_graph()).await;
        for month in ["2024-13", "2024-6", "202406", "junk"] {
            assert!(matches!(
                engine.evaluate(&"root".into(), month).await,
                Err(EngineError::InvalidMonth(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_subscriber_without_downline_is_untouched() {
        let (engine, store) = engine(InMemoryGraph::new()).await;
        assert!(engine
            .evaluate(&"loner".into(), "2024-06")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .rank_bonus_for(&"loner".into(), "2024-06")
            .await
            .unwrap()
            .is_none());
    }
}
