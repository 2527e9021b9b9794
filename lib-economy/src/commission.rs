//! Commission fanout engine.
//!
//! For each accrual event, walks the accruing subscriber's ancestor chain
//! and pays each ancestor whose own tier ceiling covers their distance from
//! the source. Every ancestor is judged independently: a near ancestor with
//! a shallow tier never truncates the walk for a deeper ancestor with a
//! deeper ceiling.
//!
//! Commissions are denominated against a stable per-event reference value
//! (micro-USD), decoupled from token-price movement. Writes are idempotent
//! per (earner, event, level), so replaying an event is always safe.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use lib_ledger::{InsertOutcome, LedgerStore, NewCommission};
use lib_types::{Amount, EventId, SubscriberId, SubscriptionId, Tier};

use crate::collaborators::{ReferralGraph, SubscriptionDirectory};
use crate::errors::{EngineError, EngineResult};
use crate::params::{apply_rate, EconomyParams};

/// A successfully persisted daily accrual, as handed to commission fanout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualEvent {
    pub event_id: EventId,
    pub subscriber_id: SubscriberId,
    pub subscription_id: SubscriptionId,
    pub tier: Tier,
    /// Tokens granted by the accrual, micro-MRD
    pub token_amount: Amount,
    pub date: NaiveDate,
}

impl AccrualEvent {
    /// Build the event for an accrual identified by its idempotency key
    pub fn new(
        date: NaiveDate,
        subscriber_id: SubscriberId,
        subscription_id: SubscriptionId,
        tier: Tier,
        token_amount: Amount,
    ) -> Self {
        let event_id = EventId::for_accrual(date, &subscriber_id, &subscription_id);
        Self {
            event_id,
            subscriber_id,
            subscription_id,
            tier,
            token_amount,
            date,
        }
    }
}

/// Outcome of propagating one accrual event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommissionReport {
    /// Newly written commission records
    pub paid: u64,
    /// Levels already paid by an earlier invocation
    pub already_paid: u64,
    /// Ancestors evaluated but not eligible at their distance
    pub ineligible: u64,
    /// Per-ancestor failures (storage or directory); replayable
    pub failed: u64,
    /// The records written by this invocation
    pub records: Vec<NewCommission>,
}

/// Walks ancestor chains and appends commission ledger records
#[derive(Clone)]
pub struct CommissionEngine {
    store: LedgerStore,
    directory: Arc<dyn SubscriptionDirectory>,
    graph: Arc<dyn ReferralGraph>,
    params: Arc<EconomyParams>,
}

impl CommissionEngine {
    pub fn new(
        store: LedgerStore,
        directory: Arc<dyn SubscriptionDirectory>,
        graph: Arc<dyn ReferralGraph>,
        params: Arc<EconomyParams>,
    ) -> Self {
        Self {
            store,
            directory,
            graph,
            params,
        }
    }

    /// Propagate one accrual event up the referral tree.
    ///
    /// Idempotent: re-invocation with the same event writes nothing for
    /// already-paid levels. A failure for one ancestor is recorded and does
    /// not block the others. Returns [`EngineError::GraphUnavailable`] only
    /// when the ancestor chain itself cannot be resolved; the accrual is
    /// unaffected either way.
    pub async fn propagate(&self, event: &AccrualEvent) -> EngineResult<CommissionReport> {
        let ancestors = self
            .graph
            .ancestors_of(&event.subscriber_id)
            .await
            .map_err(|e| EngineError::GraphUnavailable(e.to_string()))?;

        let mut report = CommissionReport::default();

        for edge in &ancestors {
            let level = edge.depth;

            // Past the rate table nobody earns, and ancestors arrive depth-
            // ascending, so the remainder of the chain is out of range too.
            let Some(rate) = self.params.rates.rate_for_level(level) else {
                break;
            };

            // The earner's own tier sets their ceiling, not the source's.
            let tiers = match self
                .directory
                .active_tiers(&edge.referrer_id, event.date)
                .await
            {
                Ok(tiers) => tiers,
                Err(e) => {
                    warn!(
                        earner = %edge.referrer_id,
                        event = %event.event_id,
                        level,
                        "commission deferred, directory lookup failed: {e}"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let ceiling = tiers
                .iter()
                .filter_map(|t| self.params.allocations.commission_depth(t))
                .max()
                .unwrap_or(0);

            if level > ceiling {
                report.ineligible += 1;
                continue;
            }

            let commission = NewCommission {
                earner_id: edge.referrer_id.clone(),
                source_subscriber_id: event.subscriber_id.clone(),
                source_event_id: event.event_id.clone(),
                level,
                rate_bps: rate,
                commission_amount: apply_rate(self.params.commission_base_value, rate),
            };

            match self.store.insert_commission(&commission).await {
                Ok(InsertOutcome::Inserted) => {
                    report.paid += 1;
                    report.records.push(commission);
                }
                Ok(InsertOutcome::Duplicate) => report.already_paid += 1,
                Err(e) => {
                    warn!(
                        earner = %commission.earner_id,
                        event = %event.event_id,
                        level,
                        "commission write failed, eligible for replay: {e}"
                    );
                    report.failed += 1;
                }
            }
        }

        debug!(
            event = %event.event_id,
            paid = report.paid,
            already_paid = report.already_paid,
            ineligible = report.ineligible,
            failed = report.failed,
            "commission propagation finished"
        );

        Ok(report)
    }
}
