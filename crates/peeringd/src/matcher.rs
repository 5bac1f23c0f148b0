//! Compatibility matcher.
//!
//! Decides, for two ASes with policies, whether they should be peered and
//! with which attributes. The decision is a pure function of its inputs
//! and does not depend on argument order.

use crate::model::{AutonomousSystem, LinkAttributes};
use crate::policy::{PeeringPolicy, Selector, SelectorSet};
use ixp_types::{AsPair, Asn, LinkType};
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

/// Interpretation of a selector set.
///
/// Implementations must be pure: the same inputs always yield the same
/// answer.
pub trait SelectorSemantics: Send + Sync + Debug {
    /// Returns true if `owner`'s selectors accept `peer`.
    fn accepts(&self, selectors: &SelectorSet, owner: Asn, peer: &AutonomousSystem) -> bool;
}

/// Default semantics. First matching rule wins:
///
/// 1. `AcceptAs(peer)`
/// 2. `DenyAs(peer)`
/// 3. `DenyGroup(group of peer)`
/// 4. `AcceptGroup(group of peer)`
/// 5. `AcceptAny`
///
/// Anything else is rejected, and an AS never accepts itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecedenceSemantics;

impl SelectorSemantics for PrecedenceSemantics {
    fn accepts(&self, selectors: &SelectorSet, owner: Asn, peer: &AutonomousSystem) -> bool {
        if peer.asn == owner {
            return false;
        }
        if selectors.contains(&Selector::AcceptAs(peer.asn)) {
            return true;
        }
        if selectors.contains(&Selector::DenyAs(peer.asn)) {
            return false;
        }
        if selectors.contains(&Selector::DenyGroup(peer.group)) {
            return false;
        }
        if selectors.contains(&Selector::AcceptGroup(peer.group)) {
            return true;
        }
        selectors.contains(&Selector::AcceptAny)
    }
}

/// One side of a match: an AS together with its policy.
#[derive(Debug, Clone, Copy)]
pub struct Participant<'a> {
    pub system: &'a AutonomousSystem,
    pub policy: &'a PeeringPolicy,
}

impl<'a> Participant<'a> {
    pub fn new(system: &'a AutonomousSystem, policy: &'a PeeringPolicy) -> Self {
        Self { system, policy }
    }

    fn asn(&self) -> Asn {
        self.system.asn
    }
}

/// Positive outcome of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LinkDecision {
    pub pair: AsPair,
    pub attributes: LinkAttributes,
}

/// The compatibility matcher.
#[derive(Debug, Clone)]
pub struct Matcher {
    semantics: Arc<dyn SelectorSemantics>,
    default_link_type: LinkType,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(Arc::new(PrecedenceSemantics), LinkType::default())
    }
}

impl Matcher {
    pub fn new(semantics: Arc<dyn SelectorSemantics>, default_link_type: LinkType) -> Self {
        Self {
            semantics,
            default_link_type,
        }
    }

    pub fn default_link_type(&self) -> LinkType {
        self.default_link_type
    }

    /// Decides whether `a` and `b` should be peered.
    ///
    /// Returns `None` unless both policies are active, each accepts the
    /// other AS, and their bandwidth ranges overlap. Attributes:
    ///
    /// - bandwidth: the lower of the two requested tiers
    /// - link type: the common request; if only one side requests a type,
    ///   that one; if they differ, the numerically lower AS's request;
    ///   if neither requests one, the configured default
    pub fn decide(&self, a: Participant<'_>, b: Participant<'_>) -> Option<LinkDecision> {
        if !a.policy.is_active() || !b.policy.is_active() {
            return None;
        }

        let pair = AsPair::new(a.asn(), b.asn()).ok()?;
        let (low, high) = if a.asn() == pair.low() { (a, b) } else { (b, a) };

        if !self.accepts(low, high) || !self.accepts(high, low) {
            return None;
        }

        let low_prefs = &low.policy.preferences;
        let high_prefs = &high.policy.preferences;

        low_prefs.bandwidth.overlap(&high_prefs.bandwidth)?;
        let bandwidth = low_prefs
            .bandwidth
            .requested()
            .min(high_prefs.bandwidth.requested());

        let link_type = match (low_prefs.link_type, high_prefs.link_type) {
            (Some(low_type), _) => low_type,
            (None, Some(high_type)) => high_type,
            (None, None) => self.default_link_type,
        };

        Some(LinkDecision {
            pair,
            attributes: LinkAttributes {
                bandwidth,
                link_type,
            },
        })
    }

    fn accepts(&self, owner: Participant<'_>, peer: Participant<'_>) -> bool {
        self.semantics
            .accepts(&owner.policy.selectors, owner.asn(), peer.system)
    }
}
