//! External collaborator interfaces.
//!
//! The engines own nothing but the ledger: subscriptions and the referral
//! tree belong to the wider platform and are consumed through these seams.
//! Implementations must be cheap to call repeatedly; the engines treat each
//! response as an immutable snapshot for the duration of one operation.
//!
//! ## Example
//! ```rust,ignore
//! use lib_economy::collaborators::SubscriptionDirectory;
//!
//! async fn count_active<D: SubscriptionDirectory>(dir: &D, as_of: chrono::NaiveDate) -> anyhow::Result<usize> {
//!     Ok(dir.list_active_subscriptions(as_of).await?.len())
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lib_types::{ReferralEdge, SubscriberId, Subscription, Tier};

/// Read access to the platform's subscription records
#[async_trait]
pub trait SubscriptionDirectory: Send + Sync {
    /// Subscriptions eligible for accrual on the given date
    /// (status active, end date not passed)
    async fn list_active_subscriptions(&self, as_of: NaiveDate) -> Result<Vec<Subscription>>;

    /// Distinct tiers of one subscriber's active subscriptions on a date.
    ///
    /// Used to derive an ancestor's commission ceiling; an empty result
    /// means the subscriber earns nothing.
    async fn active_tiers(&self, subscriber: &SubscriberId, as_of: NaiveDate)
        -> Result<Vec<Tier>>;
}

/// Read access to the membership service's referral tree.
///
/// Both queries return pre-resolved, ordered snapshots; the engines never
/// traverse mutable graph state themselves.
#[async_trait]
pub trait ReferralGraph: Send + Sync {
    /// Ancestor chain of a subscriber, ordered by increasing depth
    /// (1 = direct referrer)
    async fn ancestors_of(&self, subscriber: &SubscriberId) -> Result<Vec<ReferralEdge>>;

    /// Downline snapshot of a subscriber: parent-labeled edges whose depth
    /// is the distance from the queried root, ordered by (depth, member)
    async fn downline_of(&self, subscriber: &SubscriberId) -> Result<Vec<ReferralEdge>>;

    /// Every subscriber with at least one direct referral
    async fn list_referrers(&self) -> Result<Vec<SubscriberId>>;
}

/// Administrative event published after a batch completes.
///
/// Informational only; delivery is out of scope and failures never affect
/// the batch outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifyEvent {
    DistributionCompleted {
        date: NaiveDate,
        created: u64,
        skipped: u64,
        failed: u64,
    },
    RankBonusRunCompleted {
        month: String,
        evaluated: u64,
        paid: u64,
    },
    WalletCorrected {
        subscriber_id: SubscriberId,
        delta: lib_types::Amount,
    },
}

/// Fire-and-forget administrative notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Dispatch an event; implementations swallow their own failures
    async fn notify(&self, event: NotifyEvent);
}
