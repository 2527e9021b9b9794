//! Wallet balance reconciler.
//!
//! The distribution ledger is the source of truth; the wallet row is a
//! cache. Reconciliation recomputes the balance as a fold over the
//! subscriber's ledger records and rewrites the cache when it has drifted
//! past the configured epsilon. Ledger wins and the cache is rebuilt from
//! it, never the reverse. This single primitive replaces ad hoc repair jobs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use lib_ledger::LedgerStore;
use lib_types::{format_amount, Amount, SubscriberId};

use crate::collaborators::{Notifier, NotifyEvent};
use crate::errors::EngineResult;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub subscriber_id: SubscriberId,
    /// Cached balance before the pass (0 when no wallet row existed)
    pub previous_balance: Amount,
    /// Ledger-derived balance
    pub recomputed_balance: Amount,
    /// recomputed - previous
    pub delta: Amount,
    /// Whether the cached value was rewritten
    pub corrected: bool,
}

/// Rebuilds cached wallet balances from the distribution ledger
#[derive(Clone)]
pub struct BalanceReconciler {
    store: LedgerStore,
    notifier: Arc<dyn Notifier>,
    epsilon: Amount,
}

impl BalanceReconciler {
    pub fn new(store: LedgerStore, notifier: Arc<dyn Notifier>, epsilon: Amount) -> Self {
        Self {
            store,
            notifier,
            epsilon,
        }
    }

    /// Recompute and, if drifted, rewrite one subscriber's cached balance.
    ///
    /// Idempotent: immediately re-running after a successful pass yields
    /// `delta == 0`. On failure the cached value is left untouched.
    pub async fn reconcile(&self, subscriber: &SubscriberId) -> EngineResult<ReconcileReport> {
        let wallet = self.store.wallet(subscriber).await?;
        let previous_balance = wallet.as_ref().map(|w| w.token_balance).unwrap_or(0);
        let recomputed_balance = self.store.ledger_balance(subscriber).await?;
        let delta = recomputed_balance - previous_balance;

        // A missing wallet row is always materialized so later accruals and
        // reads see a reconciled aggregate.
        let needs_rewrite = wallet.is_none() || delta.abs() > self.epsilon;

        if needs_rewrite {
            let rebuilt = self.store.reconcile_wallet_from_ledger(subscriber).await?;
            if delta != 0 {
                warn!(
                    subscriber = %subscriber,
                    previous = %format_amount(previous_balance),
                    rebuilt = %format_amount(rebuilt),
                    delta = %format_amount(delta),
                    "wallet drift corrected from ledger"
                );
                self.notifier
                    .notify(NotifyEvent::WalletCorrected {
                        subscriber_id: subscriber.clone(),
                        delta,
                    })
                    .await;
            }
        } else {
            debug!(subscriber = %subscriber, "wallet consistent with ledger");
        }

        Ok(ReconcileReport {
            subscriber_id: subscriber.clone(),
            previous_balance,
            recomputed_balance,
            delta,
            corrected: needs_rewrite && delta != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NoopNotifier;
    use chrono::NaiveDate;
    use lib_ledger::NewDistribution;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded_store() -> LedgerStore {
        let store = LedgerStore::open_in_memory().await.unwrap();
        for (sub_id, day) in [("sub-1", date(2024, 6, 1)), ("sub-1", date(2024, 6, 2))] {
            store
                .insert_distribution(&NewDistribution {
                    subscriber_id: "alice".into(),
                    subscription_id: sub_id.into(),
                    tier: "starter".into(),
                    token_amount: 1_369_863,
                    distribution_date: day,
                })
                .await
                .unwrap();
        }
        store
    }

    fn reconciler(store: LedgerStore) -> BalanceReconciler {
        BalanceReconciler::new(store, Arc::new(NoopNotifier), 0)
    }

    #[tokio::test]
    async fn test_corrupted_wallet_restored_to_ledger_sum() {
        let store = seeded_store().await;
        let alice: SubscriberId = "alice".into();
        // Corrupt the cache to an arbitrary value.
        store.credit_wallet(&alice, 123_456_789).await.unwrap();

        let report = reconciler(store.clone()).reconcile(&alice).await.unwrap();
        assert_eq!(report.previous_balance, 123_456_789);
        assert_eq!(report.recomputed_balance, 2 * 1_369_863);
        assert_eq!(report.delta, 2 * 1_369_863 - 123_456_789);
        assert!(report.corrected);

        let wallet = store.wallet(&alice).await.unwrap().unwrap();
        assert_eq!(wallet.token_balance, 2 * 1_369_863);
    }

    #[tokio::test]
    async fn test_reconcile_is_a_fixpoint() {
        let store = seeded_store().await;
        let alice: SubscriberId = "alice".into();
        store.credit_wallet(&alice, 1).await.unwrap();

        let reconciler = reconciler(store);
        let first = reconciler.reconcile(&alice).await.unwrap();
        assert!(first.corrected);

        let second = reconciler.reconcile(&alice).await.unwrap();
        assert_eq!(second.delta, 0);
        assert!(!second.corrected);
    }

    #[tokio::test]
    async fn test_missing_wallet_created_at_ledger_sum() {
        let store = seeded_store().await;
        let alice: SubscriberId = "alice".into();
        assert!(store.wallet(&alice).await.unwrap().is_none());

        let report = reconciler(store.clone()).reconcile(&alice).await.unwrap();
        assert_eq!(report.previous_balance, 0);
        assert_eq!(report.recomputed_balance, 2 * 1_369_863);

        let wallet = store.wallet(&alice).await.unwrap().unwrap();
        assert_eq!(wallet.token_balance, 2 * 1_369_863);
        assert!(wallet.last_reconciled_at.is_some());
    }

    #[tokio::test]
    async fn test_epsilon_tolerates_small_drift() {
        let store = seeded_store().await;
        let alice: SubscriberId = "alice".into();
        store
            .credit_wallet(&alice, 2 * 1_369_863 + 1)
            .await
            .unwrap();

        let reconciler = BalanceReconciler::new(store.clone(), Arc::new(NoopNotifier), 5);
        let report = reconciler.reconcile(&alice).await.unwrap();
        assert_eq!(report.delta, -1);
        assert!(!report.corrected);

        // The cached value was deliberately left untouched.
        let wallet = store.wallet(&alice).await.unwrap().unwrap();
        assert_eq!(wallet.token_balance, 2 * 1_369_863 + 1);
    }
}
