//! In-memory store.

use super::{LinkWrite, PeeringStore, Snapshot};
use crate::error::{PeeringError, PeeringResult};
use crate::model::{
    AutonomousSystem, Justification, LinkAttributes, LinkId, LinkState, ObservedPolicies, PeeringLink,
};
use crate::policy::{PeeringPolicy, PolicyDraft, PolicyId, PolicyStatus, Revision};
use async_trait::async_trait;
use chrono::Utc;
use ixp_types::{AsPair, Asn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Default)]
struct Tables {
    systems: BTreeMap<Asn, AutonomousSystem>,
    policies: BTreeMap<PolicyId, PeeringPolicy>,
    active: BTreeMap<Asn, PolicyId>,
    last_revision: BTreeMap<Asn, Revision>,
    links: BTreeMap<LinkId, PeeringLink>,
    live: BTreeMap<AsPair, LinkId>,
    next_policy_id: u64,
    next_link_id: u64,
}

impl Tables {
    fn live_link(&self, pair: AsPair) -> Option<&PeeringLink> {
        self.live.get(&pair).and_then(|id| self.links.get(id))
    }

    fn expect_live(&self, pair: AsPair, current: LinkId) -> PeeringResult<()> {
        match self.live.get(&pair) {
            Some(id) if *id == current => Ok(()),
            Some(id) => Err(PeeringError::conflict(
                pair,
                format!("expected live {} but found {}", current, id),
            )),
            None => Err(PeeringError::conflict(
                pair,
                format!("expected live {} but pair has no live link", current),
            )),
        }
    }

    fn observed(&self, pair: AsPair) -> ObservedPolicies {
        let side = |asn: Asn| {
            self.active
                .get(&asn)
                .and_then(|id| self.policies.get(id))
                .map(PeeringPolicy::policy_ref)
        };
        ObservedPolicies {
            low: side(pair.low()),
            high: side(pair.high()),
        }
    }

    fn expect_observed(&self, pair: AsPair, observed: &ObservedPolicies) -> PeeringResult<()> {
        let now = self.observed(pair);
        if now != *observed {
            return Err(PeeringError::stale(
                pair,
                format!("planned against {} but active is {}", observed, now),
            ));
        }
        Ok(())
    }

    fn create_link(
        &mut self,
        pair: AsPair,
        attributes: LinkAttributes,
        state: LinkState,
        justification: Justification,
    ) -> PeeringLink {
        self.next_link_id += 1;
        let now = Utc::now();
        let link = PeeringLink {
            id: LinkId::new(self.next_link_id),
            pair,
            attributes,
            state,
            revision: 0,
            justification,
            created_at: now,
            updated_at: now,
        };
        self.links.insert(link.id, link.clone());
        self.live.insert(pair, link.id);
        link
    }

    fn transition(&mut self, pair: AsPair, id: LinkId, state: LinkState) -> PeeringResult<PeeringLink> {
        let link = self
            .links
            .get_mut(&id)
            .ok_or_else(|| PeeringError::link_not_found(pair))?;
        link.state = state;
        link.revision += 1;
        link.updated_at = Utc::now();
        if !state.is_live() {
            self.live.remove(&pair);
        }
        Ok(link.clone())
    }
}

/// A [`PeeringStore`] held entirely in memory.
///
/// Every operation runs under one reader-writer lock, which gives
/// snapshots repeatable-read semantics and makes each write atomic.
/// Removed links are retained for history.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every link ever written, including removed ones.
    pub fn link_history(&self, pair: AsPair) -> Vec<PeeringLink> {
        self.tables
            .read()
            .links
            .values()
            .filter(|link| link.pair == pair)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PeeringStore for InMemoryStore {
    async fn register_system(&self, system: AutonomousSystem) -> PeeringResult<()> {
        let mut tables = self.tables.write();
        if tables.systems.contains_key(&system.asn) {
            return Err(PeeringError::conflict(system.asn, "already registered"));
        }
        tables.systems.insert(system.asn, system);
        Ok(())
    }

    async fn autonomous_system(&self, asn: Asn) -> PeeringResult<Option<AutonomousSystem>> {
        Ok(self.tables.read().systems.get(&asn).cloned())
    }

    async fn policy(&self, id: PolicyId) -> PeeringResult<Option<PeeringPolicy>> {
        Ok(self.tables.read().policies.get(&id).cloned())
    }

    async fn policies_for(&self, asn: Asn) -> PeeringResult<Vec<PeeringPolicy>> {
        Ok(self
            .tables
            .read()
            .policies
            .values()
            .filter(|p| p.asn == asn)
            .cloned()
            .collect())
    }

    async fn active_policy(&self, asn: Asn) -> PeeringResult<Option<PeeringPolicy>> {
        let tables = self.tables.read();
        Ok(tables
            .active
            .get(&asn)
            .and_then(|id| tables.policies.get(id))
            .cloned())
    }

    async fn insert_superseding(
        &self,
        draft: PolicyDraft,
        expected_active: Option<PolicyId>,
    ) -> PeeringResult<PeeringPolicy> {
        let mut tables = self.tables.write();
        let asn = draft.asn;

        let current = tables.active.get(&asn).copied();
        if current != expected_active {
            return Err(PeeringError::conflict(
                asn,
                "active policy changed concurrently",
            ));
        }

        if let Some(previous) = current.and_then(|id| tables.policies.get_mut(&id)) {
            previous.status = PolicyStatus::Superseded;
        }

        tables.next_policy_id += 1;
        let revision = tables.last_revision.get(&asn).copied().unwrap_or(0) + 1;
        let policy = PeeringPolicy {
            id: PolicyId::new(tables.next_policy_id),
            asn,
            selectors: draft.selectors,
            preferences: draft.preferences,
            status: PolicyStatus::Active,
            revision,
            created_at: Utc::now(),
        };

        tables.last_revision.insert(asn, revision);
        tables.active.insert(asn, policy.id);
        tables.policies.insert(policy.id, policy.clone());
        trace!(asn = %asn, policy_id = %policy.id, revision, "Stored policy");

        Ok(policy)
    }

    async fn withdraw_policy(
        &self,
        id: PolicyId,
        expected_revision: Revision,
    ) -> PeeringResult<PeeringPolicy> {
        let mut tables = self.tables.write();
        let policy = tables
            .policies
            .get_mut(&id)
            .ok_or_else(|| PeeringError::policy_not_found(id))?;

        if !policy.is_active() || policy.revision != expected_revision {
            return Err(PeeringError::conflict(
                id,
                format!("policy is {} at revision {}", policy.status, policy.revision),
            ));
        }

        policy.status = PolicyStatus::Withdrawn;
        let withdrawn = policy.clone();
        tables.active.remove(&withdrawn.asn);
        Ok(withdrawn)
    }

    async fn snapshot(&self) -> PeeringResult<Snapshot> {
        let tables = self.tables.read();
        let policies = tables
            .active
            .iter()
            .filter_map(|(asn, id)| tables.policies.get(id).map(|p| (*asn, p.clone())))
            .collect();
        let links = tables
            .live
            .iter()
            .filter_map(|(pair, id)| tables.links.get(id).map(|l| (*pair, l.clone())))
            .collect();

        Ok(Snapshot {
            systems: tables.systems.clone(),
            policies,
            links,
        })
    }

    async fn current_link(&self, pair: AsPair) -> PeeringResult<Option<PeeringLink>> {
        Ok(self.tables.read().live_link(pair).cloned())
    }

    async fn links_for(&self, asn: Asn) -> PeeringResult<Vec<PeeringLink>> {
        let tables = self.tables.read();
        Ok(tables
            .live
            .iter()
            .filter(|(pair, _)| pair.contains(asn))
            .filter_map(|(_, id)| tables.links.get(id).cloned())
            .collect())
    }

    async fn commit_link(&self, write: LinkWrite) -> PeeringResult<PeeringLink> {
        let mut tables = self.tables.write();
        trace!(pair = %write.pair(), kind = write.kind(), "Committing link write");
        if let Some(observed) = write.observed() {
            tables.expect_observed(write.pair(), observed)?;
        }

        match write {
            LinkWrite::Insert {
                pair,
                attributes,
                state,
                justification,
                ..
            } => {
                if let Some(existing) = tables.live.get(&pair) {
                    return Err(PeeringError::conflict(
                        pair,
                        format!("pair already has live {}", existing),
                    ));
                }
                Ok(tables.create_link(pair, attributes, state, justification))
            }
            LinkWrite::Replace {
                pair,
                current,
                attributes,
                state,
                justification,
                ..
            } => {
                tables.expect_live(pair, current)?;
                tables.transition(pair, current, LinkState::Removed)?;
                Ok(tables.create_link(pair, attributes, state, justification))
            }
            LinkWrite::Remove { pair, current, .. } => {
                tables.expect_live(pair, current)?;
                tables.transition(pair, current, LinkState::Removed)
            }
            LinkWrite::Confirm { pair, current } => {
                tables.expect_live(pair, current)?;
                let state = tables.live_link(pair).map(|l| l.state);
                match state {
                    Some(LinkState::Proposed) => tables.transition(pair, current, LinkState::Active),
                    Some(state) => Err(PeeringError::conflict(
                        pair,
                        format!("{} is {}, not proposed", current, state),
                    )),
                    None => Err(PeeringError::link_not_found(pair)),
                }
            }
        }
    }
}
