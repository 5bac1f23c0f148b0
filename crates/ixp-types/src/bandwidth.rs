//! Bandwidth tiers and tier ranges.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capacity class of a peering link, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BandwidthTier {
    /// 100 Mbit/s
    M100,
    /// 1 Gbit/s
    G1,
    /// 10 Gbit/s
    G10,
    /// 40 Gbit/s
    G40,
    /// 100 Gbit/s
    G100,
    /// 400 Gbit/s
    G400,
}

impl BandwidthTier {
    /// All tiers in ascending order.
    pub const ALL: [BandwidthTier; 6] = [
        BandwidthTier::M100,
        BandwidthTier::G1,
        BandwidthTier::G10,
        BandwidthTier::G40,
        BandwidthTier::G100,
        BandwidthTier::G400,
    ];

    /// Returns the canonical label ("100M", "1G", ...).
    pub const fn as_str(&self) -> &'static str {
        match self {
            BandwidthTier::M100 => "100M",
            BandwidthTier::G1 => "1G",
            BandwidthTier::G10 => "10G",
            BandwidthTier::G40 => "40G",
            BandwidthTier::G100 => "100G",
            BandwidthTier::G400 => "400G",
        }
    }

    /// Returns the nominal capacity in Mbit/s.
    pub const fn mbps(&self) -> u64 {
        match self {
            BandwidthTier::M100 => 100,
            BandwidthTier::G1 => 1_000,
            BandwidthTier::G10 => 10_000,
            BandwidthTier::G40 => 40_000,
            BandwidthTier::G100 => 100_000,
            BandwidthTier::G400 => 400_000,
        }
    }
}

impl fmt::Display for BandwidthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BandwidthTier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        BandwidthTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == normalized)
            .ok_or_else(|| ParseError::InvalidBandwidthTier(s.to_string()))
    }
}

impl TryFrom<String> for BandwidthTier {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BandwidthTier> for String {
    fn from(tier: BandwidthTier) -> String {
        tier.as_str().to_string()
    }
}

/// Inclusive range of bandwidth tiers an AS is willing to peer at.
///
/// The upper bound is the tier the AS *requests*; anything down to the
/// lower bound is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct BandwidthRange {
    min: BandwidthTier,
    max: BandwidthTier,
}

#[derive(Deserialize)]
struct RawRange {
    min: BandwidthTier,
    max: BandwidthTier,
}

impl TryFrom<RawRange> for BandwidthRange {
    type Error = ParseError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        BandwidthRange::new(raw.min, raw.max)
    }
}

impl BandwidthRange {
    /// Creates a new range.
    ///
    /// # Errors
    ///
    /// Returns an error if `min` is above `max`.
    pub fn new(min: BandwidthTier, max: BandwidthTier) -> Result<Self, ParseError> {
        if min > max {
            return Err(ParseError::InvalidBandwidthRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(Self { min, max })
    }

    /// A range containing exactly one tier.
    pub const fn exactly(tier: BandwidthTier) -> Self {
        Self { min: tier, max: tier }
    }

    /// Lowest acceptable tier.
    pub const fn min(&self) -> BandwidthTier {
        self.min
    }

    /// Highest acceptable tier.
    pub const fn max(&self) -> BandwidthTier {
        self.max
    }

    /// The tier this side asks for.
    pub const fn requested(&self) -> BandwidthTier {
        self.max
    }

    /// Returns true if `tier` lies within the range.
    pub fn contains(&self, tier: BandwidthTier) -> bool {
        self.min <= tier && tier <= self.max
    }

    /// Intersection of two ranges, if they overlap.
    pub fn overlap(&self, other: &BandwidthRange) -> Option<BandwidthRange> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(BandwidthRange { min, max })
    }
}

impl Default for BandwidthRange {
    fn default() -> Self {
        Self::exactly(BandwidthTier::G1)
    }
}

impl fmt::Display for BandwidthRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.max)
        } else {
            write!(f, "{}..{}", self.min, self.max)
        }
    }
}

impl FromStr for BandwidthRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("..") {
            Some((min, max)) => BandwidthRange::new(min.parse()?, max.parse()?),
            None => Ok(BandwidthRange::exactly(s.parse()?)),
        }
    }
}
