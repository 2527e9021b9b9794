//! In-memory collaborator fixtures for tests.
//!
//! Deterministic, snapshot-style implementations of the collaborator
//! traits. The graph fixture is built from plain (referrer, referred)
//! pairs and resolves ancestor chains and parent-labeled downlines the
//! same way the production adapters do.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use lib_types::{ReferralEdge, SubscriberId, Subscription, Tier};

use crate::collaborators::{Notifier, NotifyEvent, ReferralGraph, SubscriptionDirectory};

/// Fixed list of subscriptions, filtered per query date
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    subscriptions: Vec<Subscription>,
}

impl InMemoryDirectory {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions }
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }
}

#[async_trait]
impl SubscriptionDirectory for InMemoryDirectory {
    async fn list_active_subscriptions(&self, as_of: NaiveDate) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| s.is_eligible(as_of))
            .cloned()
            .collect())
    }

    async fn active_tiers(
        &self,
        subscriber: &SubscriberId,
        as_of: NaiveDate,
    ) -> Result<Vec<Tier>> {
        let mut tiers: Vec<Tier> = self
            .subscriptions
            .iter()
            .filter(|s| &s.subscriber_id == subscriber && s.is_eligible(as_of))
            .map(|s| s.tier.clone())
            .collect();
        tiers.sort();
        tiers.dedup();
        Ok(tiers)
    }
}

/// Referral tree built from immediate (referrer, referred) pairs
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    /// child -> immediate parent
    parents: BTreeMap<String, String>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `referrer` directly referred `referred`
    pub fn add_referral(&mut self, referrer: &str, referred: &str) {
        self.parents
            .insert(referred.to_string(), referrer.to_string());
    }

    fn children_of(&self, parent: &str) -> Vec<&str> {
        // BTreeMap iteration keeps this deterministic.
        self.parents
            .iter()
            .filter(|(_, p)| p.as_str() == parent)
            .map(|(c, _)| c.as_str())
            .collect()
    }
}

#[async_trait]
impl ReferralGraph for InMemoryGraph {
    async fn ancestors_of(&self, subscriber: &SubscriberId) -> Result<Vec<ReferralEdge>> {
        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        let mut current = subscriber.as_str().to_string();
        let mut depth = 0u32;

        while let Some(parent) = self.parents.get(&current) {
            if !seen.insert(parent.clone()) {
                break;
            }
            depth += 1;
            edges.push(ReferralEdge {
                referrer_id: SubscriberId::new(parent.clone()),
                referred_id: subscriber.clone(),
                depth,
            });
            current = parent.clone();
        }

        Ok(edges)
    }

    async fn downline_of(&self, subscriber: &SubscriberId) -> Result<Vec<ReferralEdge>> {
        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        let mut frontier = vec![(subscriber.as_str().to_string(), 0u32)];

        while let Some((member, depth)) = frontier.pop() {
            for child in self.children_of(&member) {
                if !seen.insert(child.to_string()) {
                    continue;
                }
                edges.push(ReferralEdge {
                    referrer_id: SubscriberId::new(member.clone()),
                    referred_id: SubscriberId::new(child),
                    depth: depth + 1,
                });
                frontier.push((child.to_string(), depth + 1));
            }
        }

        edges.sort_by(|a, b| {
            (a.depth, a.referred_id.as_str()).cmp(&(b.depth, b.referred_id.as_str()))
        });
        Ok(edges)
    }

    async fn list_referrers(&self) -> Result<Vec<SubscriberId>> {
        let mut referrers: Vec<SubscriberId> = self
            .parents
            .values()
            .map(|p| SubscriberId::new(p.clone()))
            .collect();
        referrers.sort();
        referrers.dedup();
        Ok(referrers)
    }
}

/// Graph stub whose every query fails (outage simulation)
#[derive(Debug, Default)]
pub struct FailingGraph;

#[async_trait]
impl ReferralGraph for FailingGraph {
    async fn ancestors_of(&self, _subscriber: &SubscriberId) -> Result<Vec<ReferralEdge>> {
        Err(anyhow!("referral graph offline"))
    }

    async fn downline_of(&self, _subscriber: &SubscriberId) -> Result<Vec<ReferralEdge>> {
        Err(anyhow!("referral graph offline"))
    }

    async fn list_referrers(&self) -> Result<Vec<SubscriberId>> {
        Err(anyhow!("referral graph offline"))
    }
}

/// Directory stub whose every query fails (outage simulation)
#[derive(Debug, Default)]
pub struct FailingDirectory;

#[async_trait]
impl SubscriptionDirectory for FailingDirectory {
    async fn list_active_subscriptions(&self, _as_of: NaiveDate) -> Result<Vec<Subscription>> {
        Err(anyhow!("subscription directory offline"))
    }

    async fn active_tiers(
        &self,
        _subscriber: &SubscriberId,
        _as_of: NaiveDate,
    ) -> Result<Vec<Tier>> {
        Err(anyhow!("subscription directory offline"))
    }
}

/// Notifier that drops every event
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: NotifyEvent) {}
}

/// Notifier that records events for assertions
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events dispatched so far
    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().expect("notifier lock poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotifyEvent) {
        self.events.lock().expect("notifier lock poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_graph_resolves_ancestors_in_depth_order() {
        let mut graph = InMemoryGraph::new();
        graph.add_referral("root", "mid");
        graph.add_referral("mid", "leaf");

        let ancestors = graph.ancestors_of(&"leaf".into()).await.unwrap();
        assert_eq!(ancestors.len(), 2);
        assert_eq!(ancestors[0].referrer_id.as_str(), "mid");
        assert_eq!(ancestors[0].depth, 1);
        assert_eq!(ancestors[1].referrer_id.as_str(), "root");
        assert_eq!(ancestors[1].depth, 2);
    }

    #[tokio::test]
    async fn test_graph_downline_is_parent_labeled() {
        let mut graph = InMemoryGraph::new();
        graph.add_referral("root", "a");
        graph.add_referral("root", "b");
        graph.add_referral("a", "a1");

        let downline = graph.downline_of(&"root".into()).await.unwrap();
        assert_eq!(downline.len(), 3);
        assert_eq!(downline[0].referred_id.as_str(), "a");
        assert_eq!(downline[1].referred_id.as_str(), "b");
        let a1 = &downline[2];
        assert_eq!(a1.referred_id.as_str(), "a1");
        assert_eq!(a1.referrer_id.as_str(), "a");
        assert_eq!(a1.depth, 2);

        let referrers = graph.list_referrers().await.unwrap();
        assert_eq!(referrers, vec![SubscriberId::new("a"), SubscriberId::new("root")]);
    }
}
