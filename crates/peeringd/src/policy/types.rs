//! Peering policy value types.

use chrono::{DateTime, Utc};
use ixp_types::{Asn, BandwidthRange, GroupId, LinkType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Per-AS policy revision. The first policy an AS submits has revision 1.
pub type Revision = u64;

/// Policy identifier, unique across all ASes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(u64);

impl PolicyId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy#{}", self.0)
    }
}

/// One entry of a policy's selector set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// Accept this AS explicitly
    AcceptAs(Asn),
    /// Refuse this AS explicitly
    DenyAs(Asn),
    /// Accept every AS of this group
    AcceptGroup(GroupId),
    /// Refuse every AS of this group
    DenyGroup(GroupId),
    /// Accept any AS
    AcceptAny,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::AcceptAs(asn) => write!(f, "+{}", asn),
            Selector::DenyAs(asn) => write!(f, "-{}", asn),
            Selector::AcceptGroup(group) => write!(f, "+{}", group),
            Selector::DenyGroup(group) => write!(f, "-{}", group),
            Selector::AcceptAny => f.write_str("*"),
        }
    }
}

/// The set of peer selectors of one policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorSet(BTreeSet<Selector>);

impl SelectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a selector, returning the set for chaining.
    pub fn with(mut self, selector: Selector) -> Self {
        self.0.insert(selector);
        self
    }

    pub fn contains(&self, selector: &Selector) -> bool {
        self.0.contains(selector)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.0.iter()
    }

    /// ASes named by an explicit `AcceptAs` or `DenyAs`.
    pub fn named_ases(&self) -> BTreeSet<Asn> {
        self.0
            .iter()
            .filter_map(|s| match s {
                Selector::AcceptAs(asn) | Selector::DenyAs(asn) => Some(*asn),
                _ => None,
            })
            .collect()
    }

    /// Checks the rules that need nothing but the set itself.
    ///
    /// Returns a description of the first violated rule.
    pub fn check(&self, owner: Asn) -> Result<(), String> {
        if self.is_empty() {
            return Err("selector set is empty".to_string());
        }

        for selector in &self.0 {
            match *selector {
                Selector::AcceptAs(asn) | Selector::DenyAs(asn) if asn == owner => {
                    return Err(format!("selector {} names the owning AS", selector));
                }
                Selector::AcceptAs(asn) if self.0.contains(&Selector::DenyAs(asn)) => {
                    return Err(format!("{} is both accepted and denied", asn));
                }
                Selector::AcceptGroup(group) if self.0.contains(&Selector::DenyGroup(group)) => {
                    return Err(format!("group {} is both accepted and denied", group));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl FromIterator<Selector> for SelectorSet {
    fn from_iter<I: IntoIterator<Item = Selector>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for SelectorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

/// Link attribute preferences of a policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreferences {
    /// Acceptable bandwidth tiers; the upper bound is the requested tier
    #[serde(default)]
    pub bandwidth: BandwidthRange,
    /// Requested link type, if the AS cares
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
}

impl LinkPreferences {
    pub fn new(bandwidth: BandwidthRange) -> Self {
        Self {
            bandwidth,
            link_type: None,
        }
    }

    pub fn with_link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = Some(link_type);
        self
    }
}

/// Lifecycle status of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    /// The AS's current policy
    Active,
    /// Replaced by a newer submission
    Superseded,
    /// Explicitly withdrawn
    Withdrawn,
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyStatus::Active => write!(f, "active"),
            PolicyStatus::Superseded => write!(f, "superseded"),
            PolicyStatus::Withdrawn => write!(f, "withdrawn"),
        }
    }
}

/// Reference to a specific policy revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRef {
    pub policy_id: PolicyId,
    pub revision: Revision,
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@r{}", self.policy_id, self.revision)
    }
}

/// A policy as requested by the caller, before the store assigns its
/// identity and revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDraft {
    pub asn: Asn,
    pub selectors: SelectorSet,
    pub preferences: LinkPreferences,
}

/// One AS's declared peering intent.
///
/// Selector set and preferences never change after submission; only the
/// status moves (active to superseded or withdrawn).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringPolicy {
    pub id: PolicyId,
    pub asn: Asn,
    pub selectors: SelectorSet,
    pub preferences: LinkPreferences,
    pub status: PolicyStatus,
    pub revision: Revision,
    pub created_at: DateTime<Utc>,
}

impl PeeringPolicy {
    pub fn is_active(&self) -> bool {
        self.status == PolicyStatus::Active
    }

    pub fn policy_ref(&self) -> PolicyRef {
        PolicyRef {
            policy_id: self.id,
            revision: self.revision,
        }
    }
}
