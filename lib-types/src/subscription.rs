//! Subscription data types.
//!
//! Subscriptions are created on purchase by the wider platform and are
//! read-only to the accrual subsystem. Eligibility is evaluated against an
//! explicit `as_of` date, never the wall clock.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::TypeError;
use crate::primitives::{SubscriberId, SubscriptionId};

/// Subscription plan tier, case-normalized.
///
/// The set of tiers is open: business configuration maps tier names to
/// yearly allocations and commission depths, and a tier missing from that
/// table is a data-integrity error at run time, not a parse error.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(String);

impl Tier {
    /// Create a tier from its platform name (normalized to lowercase)
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    /// Borrow the normalized tier name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tier({})", self.0)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Tier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Expired => write!(f, "expired"),
            SubscriptionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

/// A subscriber's plan purchase, as supplied by the subscription directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Owning subscriber
    pub subscriber_id: SubscriberId,
    /// Unique subscription identifier
    pub subscription_id: SubscriptionId,
    /// Plan tier
    pub tier: Tier,
    /// Lifecycle status
    pub status: SubscriptionStatus,
    /// First day of validity
    pub start_date: NaiveDate,
    /// Last day of validity (inclusive)
    pub end_date: NaiveDate,
}

impl Subscription {
    /// Whether this subscription accrues on the given date.
    ///
    /// Only `active` subscriptions whose end date has not passed are
    /// eligible.
    pub fn is_eligible(&self, as_of: NaiveDate) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date >= as_of
    }
}
