//! Referral-tree data types.
//!
//! The referral graph is owned by the membership service; this subsystem
//! consumes pre-resolved, ordered edge snapshots and never traverses
//! mutable graph state itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::TypeError;
use crate::primitives::SubscriberId;

/// One edge of a resolved referral snapshot.
///
/// For ancestor queries, `referrer_id` is the ancestor and `depth` is the
/// distance to the queried subscriber (1 = direct referrer). For downline
/// queries, `referrer_id` is the member's immediate parent and `depth` is
/// the distance from the queried root, so a downline snapshot can be
/// partitioned into depth-1 branches without further queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    /// Ancestor (ancestor query) or immediate parent (downline query)
    pub referrer_id: SubscriberId,
    /// The referred subscriber
    pub referred_id: SubscriberId,
    /// Distance from the queried subscriber, 1-based
    pub depth: u32,
}

/// Monthly rank achieved from the shape of a subscriber's downline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rank::Bronze => write!(f, "bronze"),
            Rank::Silver => write!(f, "silver"),
            Rank::Gold => write!(f, "gold"),
            Rank::Platinum => write!(f, "platinum"),
            Rank::Diamond => write!(f, "diamond"),
        }
    }
}

impl FromStr for Rank {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" => Ok(Rank::Bronze),
            "silver" => Ok(Rank::Silver),
            "gold" => Ok(Rank::Gold),
            "platinum" => Ok(Rank::Platinum),
            "diamond" => Ok(Rank::Diamond),
            other => Err(TypeError::UnknownRank(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_round_trip() {
        for r in [
            Rank::Bronze,
            Rank::Silver,
            Rank::Gold,
            Rank::Platinum,
            Rank::Diamond,
        ] {
            assert_eq!(r.to_string().parse::<Rank>().unwrap(), r);
        }
        assert!("copper".parse::<Rank>().is_err());
    }

    #[test]
    fn test_rank_ordering() {
        assert!(Rank::Diamond > Rank::Platinum);
        assert!(Rank::Silver > Rank::Bronze);
    }
}
