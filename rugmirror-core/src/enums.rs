//! Enum types for token state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frame tier earned through sustained maintenance.
///
/// Higher tiers slow both dirt accumulation and aging. Gold and above never
/// get dirty. Persisted by name; numeric levels 0-4 are accepted on read
/// because the contract reports the tier as an integer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "FrameTierRepr", into = "String")]
pub enum FrameTier {
    #[default]
    None,
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl FrameTier {
    pub const ALL: [FrameTier; 5] = [
        FrameTier::None,
        FrameTier::Bronze,
        FrameTier::Silver,
        FrameTier::Gold,
        FrameTier::Diamond,
    ];

    /// Numeric level as reported on chain.
    pub fn level(self) -> u8 {
        match self {
            FrameTier::None => 0,
            FrameTier::Bronze => 1,
            FrameTier::Silver => 2,
            FrameTier::Gold => 3,
            FrameTier::Diamond => 4,
        }
    }

    /// Map an on-chain level to a tier. Levels above 4 saturate to Diamond.
    pub fn from_level(level: u64) -> Self {
        match level {
            0 => FrameTier::None,
            1 => FrameTier::Bronze,
            2 => FrameTier::Silver,
            3 => FrameTier::Gold,
            _ => FrameTier::Diamond,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameTier::None => "None",
            FrameTier::Bronze => "Bronze",
            FrameTier::Silver => "Silver",
            FrameTier::Gold => "Gold",
            FrameTier::Diamond => "Diamond",
        }
    }

    pub fn is_dirt_immune(self) -> bool {
        self >= FrameTier::Gold
    }

    /// Aging speed in percent of the unframed rate.
    pub fn aging_multiplier(self) -> u64 {
        match self {
            FrameTier::None => 100,
            FrameTier::Bronze => 75,
            FrameTier::Silver => 50,
            FrameTier::Gold => 20,
            FrameTier::Diamond => 10,
        }
    }

    /// Dirt threshold scale as `(numerator, denominator)`.
    pub fn dirt_threshold_scale(self) -> (u64, u64) {
        match self {
            FrameTier::Silver => (2, 1),
            FrameTier::Bronze => (3, 2),
            _ => (1, 1),
        }
    }
}

impl fmt::Display for FrameTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FrameTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(level) = trimmed.parse::<u64>() {
            return Ok(FrameTier::from_level(level));
        }
        FrameTier::ALL
            .into_iter()
            .find(|tier| tier.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown frame tier: {trimmed}"))
    }
}

impl From<FrameTier> for String {
    fn from(tier: FrameTier) -> Self {
        tier.name().to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameTierRepr {
    Name(String),
    Level(u64),
}

impl TryFrom<FrameTierRepr> for FrameTier {
    type Error = String;

    fn try_from(repr: FrameTierRepr) -> Result<Self, Self::Error> {
        match repr {
            FrameTierRepr::Name(name) => name.parse(),
            FrameTierRepr::Level(level) => Ok(FrameTier::from_level(level)),
        }
    }
}

/// How an owner came to hold a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquiredVia {
    Mint,
    Purchase,
    Transfer,
}
