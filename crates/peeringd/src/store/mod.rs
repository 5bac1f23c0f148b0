//! Storage interface for systems, policies, and links.
//!
//! The engine keeps no global state of its own: everything lives behind
//! [`PeeringStore`]. Implementations must provide:
//!
//! - a consistent read [`Snapshot`] (no mix of pre- and post-edit state)
//! - atomic supersede of a policy (both writes or neither)
//! - conditional, per-pair link writes ([`LinkWrite`])

mod memory;

pub use memory::InMemoryStore;

use crate::error::PeeringResult;
use crate::model::{
    AutonomousSystem, Justification, LinkAttributes, LinkId, LinkState, ObservedPolicies, PeeringLink,
};
use crate::policy::{PeeringPolicy, PolicyDraft, PolicyId, Revision};
use async_trait::async_trait;
use ixp_types::{AsPair, Asn};
use std::collections::BTreeMap;

/// A repeatable-read view of everything the differ needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Registered ASes
    pub systems: BTreeMap<Asn, AutonomousSystem>,
    /// Active policy per AS
    pub policies: BTreeMap<Asn, PeeringPolicy>,
    /// Live (non-removed) link per pair
    pub links: BTreeMap<AsPair, PeeringLink>,
}

/// A conditional link write.
///
/// Every variant except `Insert` names the live link it expects to find
/// for the pair; the write fails with a conflict if that link is no longer
/// the pair's live link. `Insert` fails if the pair already has one.
///
/// `Insert`, `Replace` and `Remove` also carry the active policies the
/// write was planned against. If either side's active policy differs when
/// the write is applied, it fails with `StaleTask` and nothing changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkWrite {
    /// Create the first live link for the pair.
    Insert {
        pair: AsPair,
        observed: ObservedPolicies,
        attributes: LinkAttributes,
        state: LinkState,
        justification: Justification,
    },
    /// Remove `current` and create a new link identity in one step.
    Replace {
        pair: AsPair,
        current: LinkId,
        observed: ObservedPolicies,
        attributes: LinkAttributes,
        state: LinkState,
        justification: Justification,
    },
    /// Move `current` to removed.
    Remove {
        pair: AsPair,
        current: LinkId,
        observed: ObservedPolicies,
    },
    /// Move `current` from proposed to active.
    Confirm { pair: AsPair, current: LinkId },
}

impl LinkWrite {
    pub fn pair(&self) -> AsPair {
        match self {
            LinkWrite::Insert { pair, .. }
            | LinkWrite::Replace { pair, .. }
            | LinkWrite::Remove { pair, .. }
            | LinkWrite::Confirm { pair, .. } => *pair,
        }
    }

    /// The policies the write is conditioned on. `Confirm` has none.
    pub fn observed(&self) -> Option<&ObservedPolicies> {
        match self {
            LinkWrite::Insert { observed, .. }
            | LinkWrite::Replace { observed, .. }
            | LinkWrite::Remove { observed, .. } => Some(observed),
            LinkWrite::Confirm { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LinkWrite::Insert { .. } => "insert",
            LinkWrite::Replace { .. } => "replace",
            LinkWrite::Remove { .. } => "remove",
            LinkWrite::Confirm { .. } => "confirm",
        }
    }
}

/// Persistent state used by the peering engine.
#[async_trait]
pub trait PeeringStore: Send + Sync {
    /// Registers an AS. Fails with a conflict if the ASN is taken.
    async fn register_system(&self, system: AutonomousSystem) -> PeeringResult<()>;

    async fn autonomous_system(&self, asn: Asn) -> PeeringResult<Option<AutonomousSystem>>;

    async fn policy(&self, id: PolicyId) -> PeeringResult<Option<PeeringPolicy>>;

    /// All policies of an AS (any status), oldest first.
    async fn policies_for(&self, asn: Asn) -> PeeringResult<Vec<PeeringPolicy>>;

    async fn active_policy(&self, asn: Asn) -> PeeringResult<Option<PeeringPolicy>>;

    /// Stores `draft` as the AS's new active policy and supersedes the
    /// previous one, atomically.
    ///
    /// `expected_active` is the active policy the caller observed; the
    /// write fails with a conflict if it has changed since.
    async fn insert_superseding(
        &self,
        draft: PolicyDraft,
        expected_active: Option<PolicyId>,
    ) -> PeeringResult<PeeringPolicy>;

    /// Marks an active policy withdrawn. Fails with a conflict if it is
    /// no longer active at `expected_revision`.
    async fn withdraw_policy(
        &self,
        id: PolicyId,
        expected_revision: Revision,
    ) -> PeeringResult<PeeringPolicy>;

    async fn snapshot(&self) -> PeeringResult<Snapshot>;

    /// The live link of a pair, if any.
    async fn current_link(&self, pair: AsPair) -> PeeringResult<Option<PeeringLink>>;

    /// Live links of an AS, ordered by pair.
    async fn links_for(&self, asn: Asn) -> PeeringResult<Vec<PeeringLink>>;

    /// Applies a conditional link write and returns the resulting link
    /// (the new identity for `Insert`/`Replace`).
    ///
    /// The observed-policy check and the link write happen atomically.
    async fn commit_link(&self, write: LinkWrite) -> PeeringResult<PeeringLink>;
}
