//! Policy submission and withdrawal.

use super::types::{LinkPreferences, PeeringPolicy, PolicyDraft, PolicyId, SelectorSet};
use crate::audit::{audit_log, AuditCategory, AuditOutcome, AuditRecord};
use crate::error::{PeeringError, PeeringResult};
use crate::store::PeeringStore;
use crate::trigger::{ChangeTrigger, TriggerCause};
use ixp_types::Asn;
use std::sync::Arc;
use tracing::{info, instrument};

const SOURCE: &str = "PolicyModel";

/// Validates and records policy mutations, then notifies the change
/// trigger for every AS whose matching outcome may have moved.
pub struct PolicyModel {
    store: Arc<dyn PeeringStore>,
    trigger: Arc<ChangeTrigger>,
}

impl PolicyModel {
    pub fn new(store: Arc<dyn PeeringStore>, trigger: Arc<ChangeTrigger>) -> Self {
        Self { store, trigger }
    }

    /// Creates a new active policy for `asn`, superseding its previous one.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `asn` is not registered
    /// - `Validation` if the selector set breaks a rule; nothing is written
    /// - `Conflict` if another submission for `asn` won the race
    #[instrument(skip(self, selectors, preferences), fields(asn = %asn))]
    pub async fn submit(
        &self,
        asn: Asn,
        selectors: SelectorSet,
        preferences: LinkPreferences,
    ) -> PeeringResult<PeeringPolicy> {
        let summary = selectors.to_string();
        let result = self.try_submit(asn, selectors, preferences).await;

        let record = AuditRecord::new(AuditCategory::PolicyChange, SOURCE, "submit_policy")
            .with_object_type("policy");
        match &result {
            Ok(policy) => {
                info!(policy_id = %policy.id, revision = policy.revision, "Policy submitted");
                audit_log!(record
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(policy.id)
                    .with_details(serde_json::json!({
                        "asn": asn.as_u32(),
                        "revision": policy.revision,
                        "selectors": summary,
                        "bandwidth": policy.preferences.bandwidth.to_string(),
                    })));
            }
            Err(e @ PeeringError::Validation { .. }) => {
                audit_log!(record
                    .with_object_id(asn)
                    .with_error(e)
                    .with_outcome(AuditOutcome::Denied));
            }
            Err(e) => {
                audit_log!(record.with_object_id(asn).with_error(e));
            }
        }

        result
    }

    async fn try_submit(
        &self,
        asn: Asn,
        selectors: SelectorSet,
        preferences: LinkPreferences,
    ) -> PeeringResult<PeeringPolicy> {
        if self.store.autonomous_system(asn).await?.is_none() {
            return Err(PeeringError::system_not_found(asn));
        }

        selectors
            .check(asn)
            .map_err(|message| PeeringError::validation(asn, message))?;

        for peer in selectors.named_ases() {
            if self.store.autonomous_system(peer).await?.is_none() {
                return Err(PeeringError::validation(
                    asn,
                    format!("selector names unregistered {}", peer),
                ));
            }
        }

        let previous = self.store.active_policy(asn).await?;
        let policy = self
            .store
            .insert_superseding(
                PolicyDraft {
                    asn,
                    selectors,
                    preferences,
                },
                previous.as_ref().map(|p| p.id),
            )
            .await?;

        self.trigger.notify(asn, TriggerCause::Submitted(policy.id));
        self.notify_named(&policy);
        if let Some(previous) = previous {
            self.notify_named(&previous);
        }

        Ok(policy)
    }

    /// Withdraws an active policy.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the policy id is unknown
    /// - `Conflict` if the policy was superseded or withdrawn already
    #[instrument(skip_all, fields(policy_id = %id))]
    pub async fn withdraw(&self, id: PolicyId) -> PeeringResult<PeeringPolicy> {
        let result = self.try_withdraw(id).await;

        let record = AuditRecord::new(AuditCategory::PolicyChange, SOURCE, "withdraw_policy")
            .with_object_type("policy")
            .with_object_id(id);
        match &result {
            Ok(policy) => {
                info!(asn = %policy.asn, revision = policy.revision, "Policy withdrawn");
                audit_log!(record
                    .with_outcome(AuditOutcome::Success)
                    .with_details(serde_json::json!({
                        "asn": policy.asn.as_u32(),
                        "revision": policy.revision,
                    })));
            }
            Err(e) => {
                audit_log!(record.with_error(e));
            }
        }

        result
    }

    async fn try_withdraw(&self, id: PolicyId) -> PeeringResult<PeeringPolicy> {
        let policy = self
            .store
            .policy(id)
            .await?
            .ok_or_else(|| PeeringError::policy_not_found(id))?;

        if !policy.is_active() {
            return Err(PeeringError::conflict(
                id,
                format!("policy is already {}", policy.status),
            ));
        }

        let withdrawn = self.store.withdraw_policy(id, policy.revision).await?;

        self.trigger
            .notify(withdrawn.asn, TriggerCause::Withdrawn(withdrawn.id));
        self.notify_named(&withdrawn);

        Ok(withdrawn)
    }

    /// Every policy `asn` ever submitted, oldest first.
    pub async fn history(&self, asn: Asn) -> PeeringResult<Vec<PeeringPolicy>> {
        if self.store.autonomous_system(asn).await?.is_none() {
            return Err(PeeringError::system_not_found(asn));
        }
        self.store.policies_for(asn).await
    }

    fn notify_named(&self, policy: &PeeringPolicy) {
        for peer in policy.selectors.named_ases() {
            self.trigger.notify(peer, TriggerCause::NamedBy(policy.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AutonomousSystem;
    use crate::policy::{PolicyStatus, Selector};
    use crate::store::InMemoryStore;
    use ixp_types::GroupId;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn asn(n: u32) -> Asn {
        Asn::new(n).unwrap()
    }

    async fn setup(systems: &[u32]) -> (PolicyModel, Arc<InMemoryStore>, Arc<ChangeTrigger>) {
        let store = Arc::new(InMemoryStore::new());
        for n in systems {
            store
                .register_system(AutonomousSystem::new(asn(*n), format!("acct-{}", n), GroupId::new(1)))
                .await
                .unwrap();
        }
        let trigger = Arc::new(ChangeTrigger::new(Duration::from_millis(50)));
        let model = PolicyModel::new(store.clone(), trigger.clone());
        (model, store, trigger)
    }

    fn accept(peers: &[u32]) -> SelectorSet {
        peers.iter().map(|n| Selector::AcceptAs(asn(*n))).collect()
    }

    #[tokio::test]
    async fn test_submit_triggers_owner_and_named() {
        let (model, _, trigger) = setup(&[1, 2, 3]).await;

        let policy = model
            .submit(asn(1), accept(&[2, 3]), LinkPreferences::default())
            .await
            .unwrap();
        assert_eq!(policy.revision, 1);
        assert_eq!(policy.status, PolicyStatus::Active);

        assert_eq!(
            trigger.take_all().ases,
            BTreeSet::from([asn(1), asn(2), asn(3)])
        );
    }

    #[tokio::test]
    async fn test_resubmit_supersedes_and_triggers_old_peers() {
        let (model, store, trigger) = setup(&[1, 2, 3]).await;

        let first = model
            .submit(asn(1), accept(&[2]), LinkPreferences::default())
            .await
            .unwrap();
        trigger.take_all();

        let second = model
            .submit(asn(1), accept(&[3]), LinkPreferences::default())
            .await
            .unwrap();
        assert_eq!(second.revision, 2);
        assert_eq!(
            store.policy(first.id).await.unwrap().unwrap().status,
            PolicyStatus::Superseded
        );
        assert_eq!(
            trigger.take_all().ases,
            BTreeSet::from([asn(1), asn(2), asn(3)])
        );
    }

    #[tokio::test]
    async fn test_submit_unregistered_owner() {
        let (model, _, _) = setup(&[2]).await;
        let err = model
            .submit(asn(1), accept(&[2]), LinkPreferences::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PeeringError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_validation_writes_nothing() {
        let (model, store, trigger) = setup(&[1, 2]).await;

        let cases = [
            SelectorSet::new(),
            accept(&[1]),
            accept(&[9]),
            SelectorSet::new()
                .with(Selector::AcceptAs(asn(2)))
                .with(Selector::DenyAs(asn(2))),
        ];
        for selectors in cases {
            let err = model
                .submit(asn(1), selectors, LinkPreferences::default())
                .await
                .unwrap_err();
            assert!(matches!(err, PeeringError::Validation { .. }), "{err}");
        }

        assert!(store.policies_for(asn(1)).await.unwrap().is_empty());
        assert!(!trigger.has_pending());
    }

    #[tokio::test]
    async fn test_withdraw() {
        let (model, _, trigger) = setup(&[1, 2]).await;
        let policy = model
            .submit(asn(1), accept(&[2]), LinkPreferences::default())
            .await
            .unwrap();
        trigger.take_all();

        let withdrawn = model.withdraw(policy.id).await.unwrap();
        assert_eq!(withdrawn.status, PolicyStatus::Withdrawn);
        assert_eq!(trigger.take_all().ases, BTreeSet::from([asn(1), asn(2)]));

        let again = model.withdraw(policy.id).await.unwrap_err();
        assert!(matches!(again, PeeringError::Conflict { .. }));

        let unknown = model.withdraw(PolicyId::new(404)).await.unwrap_err();
        assert_eq!(unknown.to_string(), "policy not found: policy#404");
    }

    #[tokio::test]
    async fn test_withdraw_superseded_conflicts() {
        let (model, _, _) = setup(&[1, 2]).await;
        let first = model
            .submit(asn(1), accept(&[2]), LinkPreferences::default())
            .await
            .unwrap();
        model
            .submit(asn(1), accept(&[2]), LinkPreferences::default())
            .await
            .unwrap();

        let err = model.withdraw(first.id).await.unwrap_err();
        assert!(err.to_string().contains("superseded"));
    }

    #[tokio::test]
    async fn test_history() {
        let (model, _, _) = setup(&[1, 2]).await;
        let first = model
            .submit(asn(1), accept(&[2]), LinkPreferences::default())
            .await
            .unwrap();
        model.withdraw(first.id).await.unwrap();
        model
            .submit(asn(1), accept(&[2]), LinkPreferences::default())
            .await
            .unwrap();

        let statuses: Vec<PolicyStatus> = model
            .history(asn(1))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.status)
            .collect();
        assert_eq!(statuses, vec![PolicyStatus::Withdrawn, PolicyStatus::Active]);
        assert!(model.history(asn(7)).await.is_err());
    }
}
