//! Transport-agnostic service surface of the peering engine.
//!
//! An API layer (HTTP, RPC, CLI) calls into [`PeeringService`]; every
//! policy mutation notifies the [`ChangeTrigger`], and the daemon (or a
//! caller) drains it into incremental reconciliation passes.

use crate::audit::{audit_log, AuditCategory, AuditOutcome, AuditRecord};
use crate::config::PeeringConfig;
use crate::differ::{Delta, Scope, TopologyDiffer};
use crate::error::{PeeringError, PeeringResult};
use crate::matcher::{Matcher, PrecedenceSemantics, SelectorSemantics};
use crate::model::{AutonomousSystem, PeeringLink};
use crate::policy::{LinkPreferences, PeeringPolicy, PolicyId, PolicyModel, SelectorSet};
use crate::reconciler::{ReconciliationReport, Reconciler};
use crate::store::{PeeringStore, Snapshot};
use crate::trigger::{ChangeTrigger, TriggerBatch};
use ixp_orch_common::retry_async;
use ixp_types::{AsPair, Asn};
use std::sync::Arc;
use tracing::{debug, info, instrument};

const SOURCE: &str = "PeeringService";

/// The peering reconciliation engine.
pub struct PeeringService {
    store: Arc<dyn PeeringStore>,
    trigger: Arc<ChangeTrigger>,
    policies: PolicyModel,
    differ: TopologyDiffer,
    reconciler: Reconciler,
}

impl PeeringService {
    pub fn new(store: Arc<dyn PeeringStore>, config: &PeeringConfig) -> Self {
        let trigger = Arc::new(ChangeTrigger::new(config.debounce()));
        let matcher = Matcher::new(Arc::new(PrecedenceSemantics), config.links.default_link_type);

        Self {
            policies: PolicyModel::new(store.clone(), trigger.clone()),
            differ: TopologyDiffer::new(matcher),
            reconciler: Reconciler::new(store.clone(), config.reconciler_config()),
            store,
            trigger,
        }
    }

    /// Replaces the selector interpretation used by the matcher.
    pub fn with_semantics(mut self, semantics: Arc<dyn SelectorSemantics>) -> Self {
        let default_link_type = self.differ.matcher().default_link_type();
        self.differ = TopologyDiffer::new(Matcher::new(semantics, default_link_type));
        self
    }

    pub fn store(&self) -> &Arc<dyn PeeringStore> {
        &self.store
    }

    pub fn trigger(&self) -> &Arc<ChangeTrigger> {
        &self.trigger
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Adds an AS to the registry. Registration is owned by an external
    /// system; this is the hook it (and seeding) uses.
    pub async fn register_system(&self, system: AutonomousSystem) -> PeeringResult<()> {
        let asn = system.asn;
        let result = self.store.register_system(system).await;

        let record = AuditRecord::new(AuditCategory::Registry, SOURCE, "register_system")
            .with_object_type("autonomous_system")
            .with_object_id(asn);
        match &result {
            Ok(()) => {
                audit_log!(record.with_outcome(AuditOutcome::Success));
            }
            Err(e) => {
                audit_log!(record.with_error(e));
            }
        }
        result
    }

    /// Submits a new active policy for `asn` and schedules its
    /// neighborhood for reconciliation.
    pub async fn submit_policy(
        &self,
        asn: Asn,
        selectors: SelectorSet,
        preferences: LinkPreferences,
    ) -> PeeringResult<PolicyId> {
        self.policies
            .submit(asn, selectors, preferences)
            .await
            .map(|policy| policy.id)
    }

    /// Withdraws an active policy and schedules the owner's neighborhood
    /// for reconciliation.
    pub async fn withdraw_policy(&self, id: PolicyId) -> PeeringResult<()> {
        self.policies.withdraw(id).await.map(|_| ())
    }

    /// Current non-removed links of `asn`, ordered by pair.
    pub async fn list_links(&self, asn: Asn) -> PeeringResult<Vec<PeeringLink>> {
        self.ensure_registered(asn).await?;
        self.store.links_for(asn).await
    }

    /// Every policy `asn` has submitted, oldest first.
    pub async fn list_policies(&self, asn: Asn) -> PeeringResult<Vec<PeeringPolicy>> {
        self.policies.history(asn).await
    }

    /// Computes the delta for `scope` without writing anything.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn plan(&self, scope: &Scope) -> PeeringResult<Delta> {
        if let Scope::Ases(ases) = scope {
            for asn in ases {
                self.ensure_registered(*asn).await?;
            }
        }

        let snapshot = self.snapshot().await?;
        let delta = self.differ.diff(&snapshot, scope);
        debug!(
            to_create = delta.to_create.len(),
            to_remove = delta.to_remove.len(),
            "Planned delta"
        );
        Ok(delta)
    }

    /// Applies a previously planned delta.
    pub async fn apply(&self, delta: Delta) -> ReconciliationReport {
        self.reconciler.apply(delta).await
    }

    /// Plans and applies `scope` in one pass.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn reconcile(&self, scope: &Scope) -> PeeringResult<ReconciliationReport> {
        let record = AuditRecord::new(AuditCategory::Reconciliation, SOURCE, "reconcile")
            .with_object_type("scope")
            .with_object_id(scope);

        let delta = match self.plan(scope).await {
            Ok(delta) => delta,
            Err(e) => {
                audit_log!(record.with_error(&e));
                return Err(e);
            }
        };

        let report = self.reconciler.apply(delta).await;
        let summary = report.summary();
        let outcome = if summary.failed > 0 {
            AuditOutcome::Failure
        } else {
            AuditOutcome::Success
        };
        audit_log!(record
            .with_outcome(outcome)
            .with_correlation_id(&report.pass_id)
            .with_details(serde_json::json!(summary)));

        Ok(report)
    }

    /// Moves a proposed link to active.
    pub async fn confirm_link(&self, pair: AsPair) -> PeeringResult<PeeringLink> {
        self.reconciler.confirm(pair).await
    }

    /// Reconciles every pending triggered AS now, ignoring the debounce
    /// window. Returns `None` if nothing was pending.
    pub async fn flush_triggers(&self) -> PeeringResult<Option<ReconciliationReport>> {
        let batch = self.trigger.take_all();
        self.reconcile_batch(batch).await
    }

    /// Reconciles the triggered ASes whose debounce window has elapsed.
    pub async fn process_ready_triggers(&self) -> PeeringResult<Option<ReconciliationReport>> {
        let batch = self.trigger.take_ready();
        self.reconcile_batch(batch).await
    }

    async fn reconcile_batch(&self, batch: TriggerBatch) -> PeeringResult<Option<ReconciliationReport>> {
        if batch.is_empty() {
            return Ok(None);
        }

        info!(
            ases = batch.ases.len(),
            events = batch.events,
            "Reconciling triggered ASes"
        );
        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Keep the ASes pending so a later pass picks them up.
                self.trigger.requeue(batch);
                return Err(e);
            }
        };
        let delta = self.differ.diff(&snapshot, &Scope::Ases(batch.ases));
        Ok(Some(self.reconciler.apply(delta).await))
    }

    async fn snapshot(&self) -> PeeringResult<Snapshot> {
        retry_async(&self.reconciler.config().retry, "snapshot", || {
            self.store.snapshot()
        })
        .await
    }

    async fn ensure_registered(&self, asn: Asn) -> PeeringResult<()> {
        match self.store.autonomous_system(asn).await? {
            Some(_) => Ok(()),
            None => Err(PeeringError::system_not_found(asn)),
        }
    }
}
