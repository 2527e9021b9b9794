//! End-to-end accrual flow over the SQLite-backed adapters.
//!
//! Seeds the platform tables the way the membership service would, then
//! drives the engines exactly as the admin surface does: daily runs,
//! reconciliation, commission fanout, and the monthly rank evaluation.

use std::sync::Arc;

use chrono::NaiveDate;

use lib_economy::{
    BalanceReconciler, CommissionEngine, DistributionEngine, EconomyParams, RankBonusEngine,
    RankRow, RankTable, ReferralGraph, SubscriptionDirectory,
};
use lib_economy::testing::NoopNotifier;
use lib_ledger::LedgerStore;
use lib_types::{Rank, SubscriberId, Subscription, SubscriptionStatus};
use meridian::adapters::{SqliteDirectory, SqliteGraph};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn subscription(subscriber: &str, subscription: &str, tier: &str) -> Subscription {
    Subscription {
        subscriber_id: subscriber.into(),
        subscription_id: subscription.into(),
        tier: tier.into(),
        status: SubscriptionStatus::Active,
        start_date: date(2024, 1, 1),
        end_date: date(2030, 1, 1),
    }
}

struct Node {
    store: LedgerStore,
    distribution: DistributionEngine,
    reconciler: BalanceReconciler,
    rank: RankBonusEngine,
}

async fn node(params: EconomyParams) -> Node {
    let store = LedgerStore::open_in_memory().await.unwrap();
    let params = Arc::new(params);
    let directory: Arc<dyn SubscriptionDirectory> = Arc::new(SqliteDirectory::new(store.clone()));
    let graph: Arc<dyn ReferralGraph> = Arc::new(SqliteGraph::new(store.clone()));
    let notifier = Arc::new(NoopNotifier);

    let commission = CommissionEngine::new(
        store.clone(),
        Arc::clone(&directory),
        Arc::clone(&graph),
        Arc::clone(&params),
    );
    let distribution = DistributionEngine::new(
        store.clone(),
        directory,
        commission,
        notifier.clone(),
        Arc::clone(&params),
        4,
    );
    let reconciler = BalanceReconciler::new(store.clone(), notifier.clone(), params.reconcile_epsilon);
    let rank = RankBonusEngine::new(store.clone(), graph, notifier, params);

    Node {
        store,
        distribution,
        reconciler,
        rank,
    }
}

/// Seed: carol referred bob, bob referred alice. Closure rows as the
/// membership service maintains them.
async fn seed_referrals(store: &LedgerStore) {
    for (referrer, referred, depth) in [
        ("bob", "alice", 1),
        ("carol", "alice", 2),
        ("carol", "bob", 1),
    ] {
        store
            .insert_referral_edge(&referrer.into(), &referred.into(), depth)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn daily_run_accrues_credits_and_fans_out() {
    let node = node(EconomyParams::default()).await;
    let day = date(2024, 6, 1);

    for sub in [
        subscription("alice", "sub-alice", "vip"),
        subscription("bob", "sub-bob", "starter"),
        subscription("carol", "sub-carol", "vip"),
    ] {
        node.store.upsert_subscription(&sub).await.unwrap();
    }
    seed_referrals(&node.store).await;

    let report = node.distribution.run(day).await.unwrap();
    assert_eq!(report.created, 3);
    assert_eq!(report.failed, 0);

    // Wallets hold the exact daily entitlements.
    let alice = node.store.wallet(&"alice".into()).await.unwrap().unwrap();
    assert_eq!(alice.token_balance, 18_904_109);
    let bob = node.store.wallet(&"bob".into()).await.unwrap().unwrap();
    assert_eq!(bob.token_balance, 1_369_863);

    // bob (starter, ceiling 1) earns level 1 on alice's accrual; carol
    // (vip, ceiling 15) earns level 2 on alice's and level 1 on bob's.
    assert_eq!(
        node.store.commission_total(&"bob".into()).await.unwrap(),
        44_000
    );
    assert_eq!(
        node.store.commission_total(&"carol".into()).await.unwrap(),
        22_000 + 44_000
    );

    // Per-level view matches: two level-1 records, one level-2.
    let summary = node.store.commission_summary(day).await.unwrap();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].records, 2);
    assert_eq!(summary[1].records, 1);
}

#[tokio::test]
async fn rerun_and_backfill_are_idempotent() {
    let node = node(EconomyParams::default()).await;
    node.store
        .upsert_subscription(&subscription("alice", "sub-alice", "vip"))
        .await
        .unwrap();

    // Backfill three days, running the middle day twice.
    for day in [date(2024, 6, 1), date(2024, 6, 2), date(2024, 6, 2), date(2024, 6, 3)] {
        node.distribution.run(day).await.unwrap();
    }

    let alice: SubscriberId = "alice".into();
    assert_eq!(node.store.ledger_balance(&alice).await.unwrap(), 3 * 18_904_109);
    let wallet = node.store.wallet(&alice).await.unwrap().unwrap();
    assert_eq!(wallet.token_balance, 3 * 18_904_109);

    // Reconciliation agrees: the cache never drifted.
    let report = node.reconciler.reconcile(&alice).await.unwrap();
    assert_eq!(report.delta, 0);
}

#[tokio::test]
async fn reconcile_repairs_out_of_band_mutation() {
    let node = node(EconomyParams::default()).await;
    node.store
        .upsert_subscription(&subscription("alice", "sub-alice", "starter"))
        .await
        .unwrap();
    node.distribution.run(date(2024, 6, 1)).await.unwrap();

    let alice: SubscriberId = "alice".into();
    // Out-of-band corruption.
    node.store.credit_wallet(&alice, -1_000_000).await.unwrap();

    let report = node.reconciler.reconcile(&alice).await.unwrap();
    assert!(report.corrected);
    assert_eq!(report.recomputed_balance, 1_369_863);
    assert_eq!(
        node.store
            .wallet(&alice)
            .await
            .unwrap()
            .unwrap()
            .token_balance,
        1_369_863
    );
}

#[tokio::test]
async fn monthly_rank_run_reaches_terminal_states() {
    // Shallow thresholds so the fixture tree stays small.
    let mut params = EconomyParams::default();
    params.ranks = RankTable::new(vec![RankRow {
        rank: Rank::Bronze,
        min_direct: 2,
        min_groups: 2,
        group_depth: 2,
        monthly_bonus: 690_000_000,
    }]);
    let node = node(params).await;

    // root has two branches reaching depth 2; bob has one shallow branch.
    for (referrer, referred, depth) in [
        ("root", "a", 1),
        ("root", "b", 2),
        ("a", "b", 1),
        ("root", "c", 1),
        ("root", "d", 2),
        ("c", "d", 1),
        ("bob", "x", 1),
    ] {
        node.store
            .insert_referral_edge(&referrer.into(), &referred.into(), depth)
            .await
            .unwrap();
    }

    let report = node.rank.evaluate_all("2024-06").await.unwrap();
    // Referrers: a, bob, c, root.
    assert_eq!(report.evaluated, 4);
    assert_eq!(report.paid, 1);

    let row = node
        .store
        .rank_bonus_for(&"root".into(), "2024-06")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.rank, "bronze");
    assert_eq!(row.mrd_amount, 345_000_000);
    assert_eq!(row.mgc_amount, 345_000_000);

    // Second run changes nothing.
    let rerun = node.rank.evaluate_all("2024-06").await.unwrap();
    assert_eq!(rerun.paid, 1);
    assert_eq!(rerun.already_evaluated, 4);
    let summary = node.store.rank_bonus_summary("2024-06").await.unwrap();
    assert_eq!(summary.paid, 1);
    assert_eq!(summary.no_rank, 3);
}
