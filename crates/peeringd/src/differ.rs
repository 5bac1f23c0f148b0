//! Topology differ.
//!
//! Computes the desired peering graph from a [`Snapshot`] and the delta
//! against the snapshot's live links. All iteration runs over ordered maps
//! keyed by canonical pairs, so the same snapshot always yields the same
//! delta.

use crate::matcher::{LinkDecision, Matcher, Participant};
use crate::model::{Justification, ObservedPolicies, PeeringLink};
use crate::policy::PolicyRef;
use crate::store::Snapshot;
use itertools::Itertools;
use ixp_types::{AsPair, Asn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Which pairs a differ pass considers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every pair of ASes holding active policies
    All,
    /// Only pairs with at least one side in the set
    Ases(BTreeSet<Asn>),
}

impl Scope {
    pub fn single(asn: Asn) -> Self {
        Scope::Ases(BTreeSet::from([asn]))
    }

    pub fn touches(&self, pair: &AsPair) -> bool {
        match self {
            Scope::All => true,
            Scope::Ases(ases) => ases.contains(&pair.low()) || ases.contains(&pair.high()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("all"),
            Scope::Ases(ases) => write!(f, "{}", ases.iter().join(",")),
        }
    }
}

/// A desired link the inventory lacks, or whose attributes differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedLink {
    pub decision: LinkDecision,
    pub justification: Justification,
    /// Live link with different attributes this one replaces
    pub replaces: Option<PeeringLink>,
}

/// Why a live link is planned for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// The pair is no longer in the desired graph
    NotDesired,
    /// Superseded by a replacement in `to_create`
    Replaced,
}

/// A live link planned for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRemoval {
    pub link: PeeringLink,
    pub reason: RemovalReason,
    pub observed: ObservedPolicies,
}

/// Output of one differ pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delta {
    pub to_create: Vec<PlannedLink>,
    pub to_remove: Vec<PlannedRemoval>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_remove.is_empty()
    }

    /// Distinct pairs this delta touches.
    pub fn pairs(&self) -> BTreeSet<AsPair> {
        self.to_create
            .iter()
            .map(|c| c.decision.pair)
            .chain(self.to_remove.iter().map(|r| r.link.pair))
            .collect()
    }
}

/// Derives the desired graph and diffs it against the live links.
#[derive(Debug, Clone, Default)]
pub struct TopologyDiffer {
    matcher: Matcher,
}

impl TopologyDiffer {
    pub fn new(matcher: Matcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Candidate pairs: both sides hold active policies and the pair is in scope.
    fn candidates(snapshot: &Snapshot, scope: &Scope) -> BTreeSet<AsPair> {
        match scope {
            Scope::All => snapshot
                .policies
                .keys()
                .tuple_combinations()
                .filter_map(|(a, b)| AsPair::new(*a, *b).ok())
                .collect(),
            Scope::Ases(ases) => ases
                .iter()
                .filter(|asn| snapshot.policies.contains_key(*asn))
                .flat_map(|asn| {
                    snapshot
                        .policies
                        .keys()
                        .filter_map(move |other| AsPair::new(*asn, *other).ok())
                })
                .collect(),
        }
    }

    /// The desired graph restricted to `scope`.
    pub fn desired(
        &self,
        snapshot: &Snapshot,
        scope: &Scope,
    ) -> BTreeMap<AsPair, (LinkDecision, Justification)> {
        Self::candidates(snapshot, scope)
            .into_iter()
            .filter_map(|pair| {
                let low = Self::participant(snapshot, pair.low())?;
                let high = Self::participant(snapshot, pair.high())?;
                let decision = self.matcher.decide(low, high)?;
                let justification = Justification {
                    low: low.policy.policy_ref(),
                    high: high.policy.policy_ref(),
                };
                Some((pair, (decision, justification)))
            })
            .collect()
    }

    /// Computes the delta for `scope`.
    pub fn diff(&self, snapshot: &Snapshot, scope: &Scope) -> Delta {
        let desired = self.desired(snapshot, scope);
        let existing: BTreeMap<AsPair, &PeeringLink> = snapshot
            .links
            .iter()
            .filter(|(pair, _)| scope.touches(pair))
            .map(|(pair, link)| (*pair, link))
            .collect();

        let mut delta = Delta::default();
        let pairs: BTreeSet<AsPair> = desired.keys().chain(existing.keys()).copied().collect();

        for pair in pairs {
            match (desired.get(&pair), existing.get(&pair)) {
                (Some((decision, justification)), None) => {
                    delta.to_create.push(PlannedLink {
                        decision: *decision,
                        justification: *justification,
                        replaces: None,
                    });
                }
                (Some((decision, justification)), Some(link)) => {
                    if link.attributes == decision.attributes {
                        continue;
                    }
                    delta.to_create.push(PlannedLink {
                        decision: *decision,
                        justification: *justification,
                        replaces: Some((*link).clone()),
                    });
                    delta.to_remove.push(PlannedRemoval {
                        link: (*link).clone(),
                        reason: RemovalReason::Replaced,
                        observed: justification.observed(),
                    });
                }
                (None, Some(link)) => {
                    delta.to_remove.push(PlannedRemoval {
                        link: (*link).clone(),
                        reason: RemovalReason::NotDesired,
                        observed: Self::observed(snapshot, pair),
                    });
                }
                (None, None) => {}
            }
        }

        debug!(
            scope = %scope,
            desired = desired.len(),
            to_create = delta.to_create.len(),
            to_remove = delta.to_remove.len(),
            "Computed topology delta"
        );
        delta
    }

    fn participant(snapshot: &Snapshot, asn: Asn) -> Option<Participant<'_>> {
        let system = snapshot.systems.get(&asn)?;
        let policy = snapshot.policies.get(&asn)?;
        Some(Participant::new(system, policy))
    }

    fn observed(snapshot: &Snapshot, pair: AsPair) -> ObservedPolicies {
        let active = |asn: Asn| -> Option<PolicyRef> { snapshot.policies.get(&asn).map(|p| p.policy_ref()) };
        ObservedPolicies {
            low: active(pair.low()),
            high: active(pair.high()),
        }
    }
}
