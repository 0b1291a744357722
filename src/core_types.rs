//! Core identifier and tier types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User ID - assigned by the (out-of-scope) account system, stored as i64
/// to match the PostgreSQL column type.
pub type UserId = i64;

macro_rules! ulid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// ULID-based: monotonic, sortable, no coordination needed.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a new unique id
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Get the inner ULID value
            pub fn inner(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(ulid::Ulid::from_string(s)?))
            }
        }
    };
}

ulid_id!(
    /// Deposit record ID
    DepositId
);
ulid_id!(
    /// Investment record ID
    InvestmentId
);
ulid_id!(
    /// Withdrawal record ID
    WithdrawalId
);
ulid_id!(
    /// Balance audit entry ID
    AuditId
);

/// Displayed account tier, upgraded when a user invests into a higher plan.
///
/// Total order: Starter < Silver < Gold < Platinum < Diamond.
/// The derived `Ord` on the discriminants IS the tier order - keep the
/// variants sorted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Tier {
    #[default]
    Starter = 1,
    Silver = 2,
    Gold = 3,
    Platinum = 4,
    Diamond = 5,
}

impl Tier {
    /// Get numeric ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Tier::Starter),
            2 => Some(Tier::Silver),
            3 => Some(Tier::Gold),
            4 => Some(Tier::Platinum),
            5 => Some(Tier::Diamond),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Starter => "Starter",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
            Tier::Diamond => "Diamond",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "starter" => Ok(Tier::Starter),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            "platinum" => Ok(Tier::Platinum),
            "diamond" => Ok(Tier::Diamond),
            _ => Err(format!("Invalid tier: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_uniqueness() {
        let a = InvestmentId::new();
        let b = InvestmentId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_roundtrip() {
        let id = WithdrawalId::new();
        let parsed: WithdrawalId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_tier_total_order() {
        assert!(Tier::Starter < Tier::Silver);
        assert!(Tier::Silver < Tier::Gold);
        assert!(Tier::Gold < Tier::Platinum);
        assert!(Tier::Platinum < Tier::Diamond);
    }

    #[test]
    fn test_tier_id_roundtrip() {
        for id in 1..=5 {
            let tier = Tier::from_id(id).unwrap();
            assert_eq!(tier.id(), id);
        }
        assert_eq!(Tier::from_id(0), None);
        assert_eq!(Tier::from_id(6), None);
    }
}
