//! AS numbers, groups and canonical AS pairs.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Autonomous system number.
///
/// AS 0 is reserved (RFC 7607) and rejected.
///
/// # Examples
///
/// ```
/// use ixp_types::Asn;
///
/// let asn: Asn = "AS65001".parse().unwrap();
/// assert_eq!(asn.as_u32(), 65001);
/// assert_eq!(asn.to_string(), "AS65001");
///
/// assert!(Asn::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Asn(u32);

impl Asn {
    /// Creates a new AS number.
    ///
    /// # Errors
    ///
    /// Returns an error for the reserved AS 0.
    pub fn new(asn: u32) -> Result<Self, ParseError> {
        if asn == 0 {
            return Err(ParseError::InvalidAsn("0".to_string()));
        }
        Ok(Asn(asn))
    }

    /// Returns the AS number as a u32.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}

impl FromStr for Asn {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Accept both "AS65001" and "65001"
        let digits = match trimmed.get(..2) {
            Some(prefix) if prefix.eq_ignore_ascii_case("as") => &trimmed[2..],
            _ => trimmed,
        };

        let value: u32 = digits
            .parse()
            .map_err(|_| ParseError::InvalidAsn(s.to_string()))?;

        Asn::new(value).map_err(|_| ParseError::InvalidAsn(s.to_string()))
    }
}

impl TryFrom<u32> for Asn {
    type Error = ParseError;

    fn try_from(asn: u32) -> Result<Self, Self::Error> {
        Asn::new(asn)
    }
}

impl From<Asn> for u32 {
    fn from(asn: Asn) -> u32 {
        asn.0
    }
}

/// Isolation-domain group an AS belongs to.
///
/// Groups are the attribute that group selectors (`AcceptGroup`/`DenyGroup`)
/// filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u16);

impl GroupId {
    /// Creates a new group id.
    pub const fn new(id: u16) -> Self {
        GroupId(id)
    }

    /// Returns the group id as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches(['G', 'g']);
        digits
            .parse()
            .map(GroupId)
            .map_err(|_| ParseError::InvalidGroupId(s.to_string()))
    }
}

/// Unordered pair of distinct ASes, stored as (min, max).
///
/// The canonical order makes the pair usable as a deduplication key and as
/// the lock token for per-pair exclusive sections: `{A, B}` and `{B, A}`
/// produce the same `AsPair`.
///
/// # Examples
///
/// ```
/// use ixp_types::{AsPair, Asn};
///
/// let a = Asn::new(2).unwrap();
/// let b = Asn::new(1).unwrap();
/// let pair = AsPair::new(a, b).unwrap();
/// assert_eq!(pair.low(), b);
/// assert_eq!(pair.high(), a);
/// assert_eq!(pair, AsPair::new(b, a).unwrap());
///
/// assert!(AsPair::new(a, a).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AsPair {
    low: Asn,
    high: Asn,
}

impl AsPair {
    /// Creates the canonical pair for two ASes.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::SelfPair`] if both sides are the same AS.
    pub fn new(a: Asn, b: Asn) -> Result<Self, ParseError> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => Err(ParseError::SelfPair(a.as_u32())),
        }
    }

    /// Returns the numerically smaller AS.
    pub const fn low(&self) -> Asn {
        self.low
    }

    /// Returns the numerically larger AS.
    pub const fn high(&self) -> Asn {
        self.high
    }

    /// Returns true if `asn` is one side of this pair.
    pub fn contains(&self, asn: Asn) -> bool {
        self.low == asn || self.high == asn
    }

    /// Returns the side of the pair that is not `asn`.
    pub fn other(&self, asn: Asn) -> Option<Asn> {
        if asn == self.low {
            Some(self.high)
        } else if asn == self.high {
            Some(self.low)
        } else {
            None
        }
    }

    /// Returns both sides as (low, high).
    pub const fn as_tuple(&self) -> (Asn, Asn) {
        (self.low, self.high)
    }
}

impl fmt::Display for AsPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

impl FromStr for AsPair {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| ParseError::InvalidAsPair(s.to_string()))?;
        AsPair::new(a.parse()?, b.parse()?)
    }
}

impl TryFrom<String> for AsPair {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AsPair> for String {
    fn from(pair: AsPair) -> String {
        pair.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn asn(n: u32) -> Asn {
        Asn::new(n).unwrap()
    }

    #[test]
    fn test_asn_parse() {
        assert_eq!("AS65001".parse::<Asn>().unwrap(), asn(65001));
        assert_eq!("as7".parse::<Asn>().unwrap(), asn(7));
        assert_eq!("42".parse::<Asn>().unwrap(), asn(42));
        assert!("AS0".parse::<Asn>().is_err());
        assert!("ASx".parse::<Asn>().is_err());
        assert!("".parse::<Asn>().is_err());
    }

    #[test]
    fn test_asn_serde_rejects_zero() {
        assert_eq!(serde_json::from_str::<Asn>("64512").unwrap(), asn(64512));
        assert!(serde_json::from_str::<Asn>("0").is_err());
        assert_eq!(serde_json::to_string(&asn(3)).unwrap(), "3");
    }

    #[test]
    fn test_pair_is_canonical() {
        let forward = AsPair::new(asn(1), asn(2)).unwrap();
        let reverse = AsPair::new(asn(2), asn(1)).unwrap();
        assert_eq!(forward, reverse);
        assert_eq!(forward.as_tuple(), (asn(1), asn(2)));
        assert_eq!(forward.to_string(), "AS1-AS2");
    }

    #[test]
    fn test_pair_rejects_self() {
        assert_eq!(AsPair::new(asn(5), asn(5)), Err(ParseError::SelfPair(5)));
    }

    #[test]
    fn test_pair_other_side() {
        let pair = AsPair::new(asn(10), asn(3)).unwrap();
        assert!(pair.contains(asn(3)));
        assert!(!pair.contains(asn(4)));
        assert_eq!(pair.other(asn(3)), Some(asn(10)));
        assert_eq!(pair.other(asn(10)), Some(asn(3)));
        assert_eq!(pair.other(asn(4)), None);
    }

    #[test]
    fn test_pair_parse_and_serde() {
        let pair: AsPair = "AS9-AS2".parse().unwrap();
        assert_eq!(pair.low(), asn(2));
        assert_eq!(serde_json::to_string(&pair).unwrap(), "\"AS2-AS9\"");
        assert!("AS2".parse::<AsPair>().is_err());
        assert!("AS2-AS2".parse::<AsPair>().is_err());
    }

    #[test]
    fn test_group_id() {
        assert_eq!("G17".parse::<GroupId>().unwrap(), GroupId::new(17));
        assert_eq!("19".parse::<GroupId>().unwrap().as_u16(), 19);
        assert!("Gx".parse::<GroupId>().is_err());
    }
}
