//! Sentiment readings and the ladder tiers they are compared against.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound of the Fear & Greed scale.
pub const SENTIMENT_MAX: u8 = 100;

/// A Fear & Greed index reading (0 = extreme fear, 100 = extreme greed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sentiment(u8);

impl Sentiment {
    /// Build a reading, rejecting values outside 0..=100.
    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= SENTIMENT_MAX)
            .map(Self)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Greed side of the ladder: the reading has reached the tier.
    pub fn at_or_above(&self, tier: Tier) -> bool {
        self.0 >= tier.0
    }

    /// Fear side of the ladder: the reading has dropped to the tier.
    pub fn at_or_below(&self, tier: Tier) -> bool {
        self.0 <= tier.0
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ladder threshold on the sentiment scale.
///
/// Used as the key of bucket and fired-flag maps, so it serializes as a
/// plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(pub u8);

impl Tier {
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
