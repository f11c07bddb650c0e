use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::UHODL_PER_HODL;
use crate::types::Amount;

/// Validator tier, derived purely from bonded stake. Controls verification
/// authority, reward multipliers, and governance weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

/// Tier lower bounds in uhodl: Bronze 50k, Silver 150k, Gold 350k,
/// Platinum 750k, Diamond 1.5M HODL.
pub const TIER_BOUNDS: [Amount; 5] = [
    50_000 * UHODL_PER_HODL,
    150_000 * UHODL_PER_HODL,
    350_000 * UHODL_PER_HODL,
    750_000 * UHODL_PER_HODL,
    1_500_000 * UHODL_PER_HODL,
];

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Bronze,
        Tier::Silver,
        Tier::Gold,
        Tier::Platinum,
        Tier::Diamond,
    ];

    /// Derive the tier from a bonded stake amount. `None` below the Bronze
    /// floor.
    pub fn from_stake(stake: Amount) -> Option<Tier> {
        if stake < TIER_BOUNDS[0] {
            return None;
        }
        let mut tier = Tier::Bronze;
        for (i, bound) in TIER_BOUNDS.iter().enumerate() {
            if stake >= *bound {
                tier = Tier::ALL[i];
            }
        }
        Some(tier)
    }

    /// Index into per-tier parameter arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
            Tier::Diamond => "diamond",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
