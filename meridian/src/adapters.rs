//! Collaborator adapters over the platform tables.
//!
//! The subscription directory and referral graph are owned by the wider
//! platform; in this deployment they are read from the shared database the
//! platform maintains, through the read-only queries in `lib-ledger`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

use lib_economy::{Notifier, NotifyEvent, ReferralGraph, SubscriptionDirectory};
use lib_ledger::LedgerStore;
use lib_types::{ReferralEdge, SubscriberId, Subscription, Tier};

/// Subscription directory backed by the platform's subscriptions table
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    store: LedgerStore,
}

impl SqliteDirectory {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SubscriptionDirectory for SqliteDirectory {
    async fn list_active_subscriptions(&self, as_of: NaiveDate) -> Result<Vec<Subscription>> {
        Ok(self.store.list_active_subscriptions(as_of).await?)
    }

    async fn active_tiers(
        &self,
        subscriber: &SubscriberId,
        as_of: NaiveDate,
    ) -> Result<Vec<Tier>> {
        Ok(self.store.active_tiers(subscriber, as_of).await?)
    }
}

/// Referral graph backed by the platform's closure-table rows
#[derive(Debug, Clone)]
pub struct SqliteGraph {
    store: LedgerStore,
}

impl SqliteGraph {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReferralGraph for SqliteGraph {
    async fn ancestors_of(&self, subscriber: &SubscriberId) -> Result<Vec<ReferralEdge>> {
        Ok(self.store.ancestors_of(subscriber).await?)
    }

    async fn downline_of(&self, subscriber: &SubscriberId) -> Result<Vec<ReferralEdge>> {
        Ok(self.store.downline_of(subscriber).await?)
    }

    async fn list_referrers(&self) -> Result<Vec<SubscriberId>> {
        Ok(self.store.list_referrers().await?)
    }
}

/// Notifier that publishes administrative events to the log stream.
///
/// Delivery to operators (mail, chat) is handled by external tooling that
/// tails these structured lines; correctness never depends on them.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: NotifyEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| format!("{event:?}"));
        info!(target: "meridian::notify", "{payload}");
    }
}
