//! Canonical primitive types for the accrual ledger.
//!
//! These types are the foundational building blocks for all ledger-critical
//! data structures. They are designed to be:
//! - Integer-only (no floating-point drift)
//! - Deterministically serializable
//! - Efficient to copy and compare

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Token and reference-currency amounts in micro-units
/// (1 token = 1_000_000 micro-units). Signed so that reconciliation
/// deltas are representable.
pub type Amount = i64;

/// Basis points for percentage calculations (10000 = 100%)
pub type Bps = u16;

/// Micro-units per whole token / whole reference-currency unit
pub const MICROS_PER_TOKEN: Amount = 1_000_000;

/// Basis-point denominator
pub const BPS_DENOMINATOR: Amount = 10_000;

/// Render a micro-unit amount as a decimal string (6 fractional digits).
///
/// For logs and admin responses only; ledger state stays integral.
pub fn format_amount(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!(
        "{}{}.{:06}",
        sign,
        abs / MICROS_PER_TOKEN as u64,
        abs % MICROS_PER_TOKEN as u64
    )
}

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Opaque subscriber identifier assigned by the membership platform
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    /// Create a new subscriber id from its platform representation
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque subscription identifier (one subscriber may hold several)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// Create a new subscription id from its platform representation
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// EVENT IDENTITY
// ============================================================================

/// Deterministic accrual event identifier.
///
/// Derived from the idempotency key of the accrual, so a retried run
/// produces the same id: `{date}:{subscriber}:{subscription}`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Build the event id for a (date, subscriber, subscription) accrual
    pub fn for_accrual(
        date: chrono::NaiveDate,
        subscriber: &SubscriberId,
        subscription: &SubscriptionId,
    ) -> Self {
        Self(format!("{}:{}:{}", date, subscriber, subscription))
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// TOKEN TYPES
// ============================================================================

/// Token denominations issued by the platform
///
/// MRD is the daily-accrual token held in the wallet aggregate; MGC is the
/// growth credit used for the second half of rank bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TokenKind {
    /// Meridian token, accrued daily per subscription
    Mrd = 0,
    /// Meridian growth credit, disbursed by rank bonuses
    Mgc = 1,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Mrd => write!(f, "MRD"),
            TokenKind::Mgc => write!(f, "MGC"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1_369_863), "1.369863");
        assert_eq!(format_amount(0), "0.000000");
        assert_eq!(format_amount(-500_000), "-0.500000");
        assert_eq!(format_amount(37_808_218), "37.808218");
    }

    #[test]
    fn test_event_id_deterministic() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let a = EventId::for_accrual(date, &"alice".into(), &"sub-1".into());
        let b = EventId::for_accrual(date, &"alice".into(), &"sub-1".into());
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "2024-03-01:alice:sub-1");
    }

    #[test]
    fn test_token_kind_display() {
        assert_eq!(TokenKind::Mrd.to_string(), "MRD");
        assert_eq!(TokenKind::Mgc.to_string(), "MGC");
    }

    #[test]
    fn test_subscriber_id_serde_transparent() {
        let id = SubscriberId::new("alice");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alice\"");
        let back: SubscriberId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
