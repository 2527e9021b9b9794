//! Meridian platform primitives.
//! Stable, behavior-free, serialization-stable.
//!
//! Rule: ledger state never holds floating-point values. Ever.

pub mod errors;
pub mod primitives;
pub mod referral;
pub mod subscription;

pub use errors::TypeError;
pub use primitives::{
    format_amount, Amount, Bps, EventId, SubscriberId, SubscriptionId, TokenKind, BPS_DENOMINATOR,
    MICROS_PER_TOKEN,
};
pub use referral::{Rank, ReferralEdge};
pub use subscription::{Subscription, SubscriptionStatus, Tier};
