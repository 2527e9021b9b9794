//! Daily distribution engine.
//!
//! Grants every active subscription its daily token entitlement exactly
//! once per (subscriber, subscription, date). The idempotency decision is
//! made by the ledger's UNIQUE constraint, so overlapping or retried runs
//! for the same date cannot double-accrue, even from separate processes.
//!
//! ## Operation
//! - Lists eligible subscriptions from the directory for `as_of_date`
//! - Processes each independently on a bounded worker pool
//! - On a fresh accrual: appends the ledger record, then atomically credits
//!   the wallet, then fans out commissions
//! - On an already-accrued key: skips the grant but still replays commission
//!   fanout (idempotent per level), healing any fanout interrupted earlier
//! - Per-subscription failures are counted and never abort the run

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use lib_ledger::{InsertOutcome, LedgerStore, NewDistribution};
use lib_types::{format_amount, Subscription};

use crate::collaborators::{Notifier, NotifyEvent, SubscriptionDirectory};
use crate::commission::{AccrualEvent, CommissionEngine};
use crate::errors::{EngineError, EngineResult};
use crate::params::EconomyParams;

/// Default bound on concurrently processed subscriptions
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Summary of one distribution run; partial success is the normal case
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRunReport {
    /// Fresh accrual records written
    pub created: u64,
    /// Subscriptions already accrued for the date
    pub skipped: u64,
    /// Subscriptions that could not be processed (replayable)
    pub failed: u64,
}

enum SubscriptionOutcome {
    Created,
    Skipped,
    Failed,
}

/// Batch engine for the daily accrual
#[derive(Clone)]
pub struct DistributionEngine {
    store: LedgerStore,
    directory: Arc<dyn SubscriptionDirectory>,
    commission: CommissionEngine,
    notifier: Arc<dyn Notifier>,
    params: Arc<EconomyParams>,
    concurrency: usize,
}

impl DistributionEngine {
    pub fn new(
        store: LedgerStore,
        directory: Arc<dyn SubscriptionDirectory>,
        commission: CommissionEngine,
        notifier: Arc<dyn Notifier>,
        params: Arc<EconomyParams>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            directory,
            commission,
            notifier,
            params,
            concurrency: concurrency.max(1),
        }
    }

    /// Run the daily distribution for an explicit business date.
    ///
    /// Safe to re-run and safe under concurrent invocation; the second run
    /// reports the already-written records as skipped.
    pub async fn run(&self, as_of: NaiveDate) -> EngineResult<DistributionRunReport> {
        let subscriptions = self
            .directory
            .list_active_subscriptions(as_of)
            .await
            .map_err(|e| EngineError::DirectoryUnavailable(e.to_string()))?;

        info!(
            date = %as_of,
            subscriptions = subscriptions.len(),
            "starting daily distribution"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(subscriptions.len());

        for subscription in subscriptions {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return SubscriptionOutcome::Failed,
                };
                engine.process_subscription(&subscription, as_of).await
            }));
        }

        let mut report = DistributionRunReport::default();
        for handle in handles {
            match handle.await {
                Ok(SubscriptionOutcome::Created) => report.created += 1,
                Ok(SubscriptionOutcome::Skipped) => report.skipped += 1,
                Ok(SubscriptionOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    error!("distribution worker panicked: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            date = %as_of,
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            "daily distribution finished"
        );

        self.notifier
            .notify(NotifyEvent::DistributionCompleted {
                date: as_of,
                created: report.created,
                skipped: report.skipped,
                failed: report.failed,
            })
            .await;

        Ok(report)
    }

    async fn process_subscription(
        &self,
        subscription: &Subscription,
        as_of: NaiveDate,
    ) -> SubscriptionOutcome {
        let Some(amount) = self.params.allocations.daily_amount(&subscription.tier) else {
            let err = EngineError::InvalidTier(subscription.tier.clone());
            warn!(
                subscriber = %subscription.subscriber_id,
                subscription = %subscription.subscription_id,
                "excluding subscription from run: {err}"
            );
            return SubscriptionOutcome::Failed;
        };

        let new = NewDistribution {
            subscriber_id: subscription.subscriber_id.clone(),
            subscription_id: subscription.subscription_id.clone(),
            tier: subscription.tier.clone(),
            token_amount: amount,
            distribution_date: as_of,
        };

        let outcome = match self.store.insert_distribution(&new).await {
            Ok(InsertOutcome::Inserted) => {
                // The wallet credit must happen-after the ledger insert; a
                // failure here leaves the ledger authoritative and the
                // reconciler heals the cache.
                if let Err(e) = self
                    .store
                    .credit_wallet(&subscription.subscriber_id, amount)
                    .await
                {
                    error!(
                        subscriber = %subscription.subscriber_id,
                        "wallet credit failed after accrual insert, reconcile to repair: {e}"
                    );
                    return SubscriptionOutcome::Failed;
                }
                debug!(
                    subscriber = %subscription.subscriber_id,
                    subscription = %subscription.subscription_id,
                    amount = %format_amount(amount),
                    "accrued daily entitlement"
                );
                SubscriptionOutcome::Created
            }
            Ok(InsertOutcome::Duplicate) => SubscriptionOutcome::Skipped,
            Err(e) => {
                warn!(
                    subscriber = %subscription.subscriber_id,
                    subscription = %subscription.subscription_id,
                    "accrual write failed: {e}"
                );
                return SubscriptionOutcome::Failed;
            }
        };

        // Fan out commissions for fresh and already-accrued events alike:
        // propagation is idempotent per level, so this is also the replay
        // path for fanout that a previous run left incomplete.
        let event = AccrualEvent::new(
            as_of,
            subscription.subscriber_id.clone(),
            subscription.subscription_id.clone(),
            subscription.tier.clone(),
            amount,
        );
        if let Err(e) = self.commission.propagate(&event).await {
            warn!(
                event = %event.event_id,
                "commission propagation deferred to a later run: {e}"
            );
        }

        outcome
    }
}
