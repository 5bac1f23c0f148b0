//! Autonomous systems and peering links.

use crate::policy::PolicyRef;
use chrono::{DateTime, Utc};
use ixp_types::{AsPair, Asn, BandwidthTier, GroupId, LinkType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A registered autonomous system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomousSystem {
    pub asn: Asn,
    /// Owning account
    pub account: String,
    /// Isolation-domain group, used by group selectors
    pub group: GroupId,
}

impl AutonomousSystem {
    pub fn new(asn: Asn, account: impl Into<String>, group: GroupId) -> Self {
        Self {
            asn,
            account: account.into(),
            group,
        }
    }
}

/// Link identity. A pair gets a fresh identity every time a link is
/// (re)created for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(u64);

impl LinkId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Link lifecycle: `proposed -> active -> removed`. Removed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Written, waiting for downstream provisioning to confirm
    Proposed,
    /// Authoritative intent
    Active,
    /// No longer justified by any policy pair
    Removed,
}

impl LinkState {
    /// Proposed and active links both occupy their pair.
    pub fn is_live(&self) -> bool {
        !matches!(self, LinkState::Removed)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Proposed => write!(f, "proposed"),
            LinkState::Active => write!(f, "active"),
            LinkState::Removed => write!(f, "removed"),
        }
    }
}

/// Negotiated link attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkAttributes {
    pub bandwidth: BandwidthTier,
    pub link_type: LinkType,
}

impl fmt::Display for LinkAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bandwidth, self.link_type)
    }
}

/// The policy revisions a link was derived from, one per side of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Justification {
    /// Policy of the numerically lower AS
    pub low: PolicyRef,
    /// Policy of the numerically higher AS
    pub high: PolicyRef,
}

impl Justification {
    pub fn observed(&self) -> ObservedPolicies {
        ObservedPolicies {
            low: Some(self.low),
            high: Some(self.high),
        }
    }
}

/// Active policy revisions of both sides of a pair, as seen at planning
/// time. `None` means the AS had no active policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservedPolicies {
    pub low: Option<PolicyRef>,
    pub high: Option<PolicyRef>,
}

impl fmt::Display for ObservedPolicies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |r: &Option<PolicyRef>| r.map_or_else(|| "none".to_string(), |r| r.to_string());
        write!(f, "({}, {})", side(&self.low), side(&self.high))
    }
}

/// A peering link between two ASes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringLink {
    pub id: LinkId,
    pub pair: AsPair,
    pub attributes: LinkAttributes,
    pub state: LinkState,
    /// Bumped on every state transition of this link identity; starts at 0
    pub revision: u64,
    pub justification: Justification,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PeeringLink {
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }
}
