//! Link realization types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a peering link between two ASes is realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Over the shared IXP fabric
    Ixp,
    /// Private network interconnect (dedicated cross-connect)
    Private,
    /// Overlay tunnel across a third-party network
    Tunnel,
}

impl LinkType {
    /// Returns the lowercase label used in configuration and APIs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LinkType::Ixp => "ixp",
            LinkType::Private => "private",
            LinkType::Tunnel => "tunnel",
        }
    }
}

impl Default for LinkType {
    fn default() -> Self {
        LinkType::Ixp
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ixp" => Ok(LinkType::Ixp),
            "private" | "pni" => Ok(LinkType::Private),
            "tunnel" => Ok(LinkType::Tunnel),
            _ => Err(ParseError::InvalidLinkType(s.to_string())),
        }
    }
}
