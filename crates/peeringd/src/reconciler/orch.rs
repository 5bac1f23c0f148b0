//! Reconciler: applies a topology delta to the link inventory.

use super::types::{PairOutcome, ReconciliationReport, ReconciliationTask, TaskAction};
use crate::audit::{audit_log, AuditCategory, AuditOutcome, AuditRecord};
use crate::differ::Delta;
use crate::error::{PeeringError, PeeringResult};
use crate::model::{LinkState, ObservedPolicies, PeeringLink};
use crate::store::{LinkWrite, PeeringStore};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use ixp_orch_common::{retry_async, KeyedLocks, RetryPolicy};
use ixp_types::AsPair;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const SOURCE: &str = "Reconciler";

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Retry schedule for transient storage failures
    pub retry: RetryPolicy,
    /// Upper bound on pairs processed concurrently in one pass
    pub max_parallel_pairs: usize,
    /// Write new links as proposed and wait for `confirm`
    pub two_phase: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_parallel_pairs: 16,
            two_phase: false,
        }
    }
}

/// Applies deltas one pair at a time.
///
/// Tasks for distinct pairs run concurrently; tasks for the same pair,
/// including ones from overlapping passes, serialize on the pair's lock.
/// A task is discarded if the active policy revisions of either AS moved
/// since planning. It checks once before reading the pair's link, and the
/// store checks again atomically with the write.
pub struct Reconciler {
    store: Arc<dyn PeeringStore>,
    locks: KeyedLocks<AsPair>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn PeeringStore>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn locks(&self) -> &KeyedLocks<AsPair> {
        &self.locks
    }

    /// Applies `delta` and reports one outcome per touched pair.
    ///
    /// Never fails as a whole: each pair's error is captured in its own
    /// outcome and does not affect the others.
    #[instrument(skip_all, fields(pass_id = tracing::field::Empty))]
    pub async fn apply(&self, delta: Delta) -> ReconciliationReport {
        let pass_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("pass_id", pass_id.as_str());

        let tasks = ReconciliationTask::from_delta(delta);
        let mut report = ReconciliationReport::empty(pass_id.clone());
        if tasks.is_empty() {
            return report;
        }

        debug!(tasks = tasks.len(), "Applying delta");
        let parallel = self.config.max_parallel_pairs.max(1);
        let outcomes: Vec<(AsPair, PairOutcome)> = stream::iter(tasks)
            .map(|task| self.run_task(task, &pass_id))
            .buffer_unordered(parallel)
            .collect()
            .await;

        report.outcomes.extend(outcomes);
        report.finished_at = Utc::now();

        let summary = report.summary();
        info!(
            created = summary.created,
            removed = summary.removed,
            unchanged = summary.unchanged,
            failed = summary.failed,
            skipped_stale = summary.skipped_stale,
            "Reconciliation pass complete"
        );
        report
    }

    async fn run_task(&self, task: ReconciliationTask, pass_id: &str) -> (AsPair, PairOutcome) {
        let pair = task.pair;
        let _guard = self.locks.lock(pair).await;

        let result = retry_async(&self.config.retry, "reconcile_pair", || self.execute(&task)).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(PeeringError::StaleTask { message, .. }) => {
                debug!(pair = %pair, reason = %message, "Discarding stale task");
                PairOutcome::SkippedStale
            }
            Err(e) => {
                warn!(pair = %pair, kind = task.kind(), error = %e, "Reconciliation task failed");
                PairOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        Self::audit(pair, task.kind(), &outcome, pass_id);
        (pair, outcome)
    }

    async fn execute(&self, task: &ReconciliationTask) -> PeeringResult<PairOutcome> {
        let pair = task.pair;
        self.check_fresh(pair, &task.observed).await?;
        let current = self.store.current_link(pair).await?;

        match (&task.action, current) {
            (
                TaskAction::Create {
                    attributes,
                    justification,
                    ..
                },
                current,
            ) => {
                let state = if self.config.two_phase {
                    LinkState::Proposed
                } else {
                    LinkState::Active
                };
                match current {
                    Some(link) if link.attributes == *attributes => Ok(PairOutcome::Unchanged),
                    Some(link) => {
                        let created = self
                            .store
                            .commit_link(LinkWrite::Replace {
                                pair,
                                current: link.id,
                                observed: task.observed,
                                attributes: *attributes,
                                state,
                                justification: *justification,
                            })
                            .await?;
                        Ok(PairOutcome::Created {
                            link: created,
                            replaced: Some(link.id),
                        })
                    }
                    None => {
                        let created = self
                            .store
                            .commit_link(LinkWrite::Insert {
                                pair,
                                observed: task.observed,
                                attributes: *attributes,
                                state,
                                justification: *justification,
                            })
                            .await?;
                        Ok(PairOutcome::Created {
                            link: created,
                            replaced: None,
                        })
                    }
                }
            }
            (TaskAction::Remove { .. }, None) => Ok(PairOutcome::Unchanged),
            // A live link other than the planned one conflicts in the store.
            (TaskAction::Remove { link }, Some(_)) => {
                let removed = self
                    .store
                    .commit_link(LinkWrite::Remove {
                        pair,
                        current: *link,
                        observed: task.observed,
                    })
                    .await?;
                Ok(PairOutcome::Removed { link: removed })
            }
        }
    }

    /// Fails with `StaleTask` if either side's active policy is no longer
    /// the one the task was planned against. The conditional write repeats
    /// this check under the store's lock.
    async fn check_fresh(&self, pair: AsPair, observed: &ObservedPolicies) -> PeeringResult<()> {
        let now = ObservedPolicies {
            low: self
                .store
                .active_policy(pair.low())
                .await?
                .map(|p| p.policy_ref()),
            high: self
                .store
                .active_policy(pair.high())
                .await?
                .map(|p| p.policy_ref()),
        };

        if now != *observed {
            return Err(PeeringError::stale(
                pair,
                format!("planned against {} but active is {}", observed, now),
            ));
        }
        Ok(())
    }

    /// Moves the pair's proposed link to active. An already active link is
    /// returned as is.
    #[instrument(skip(self), fields(pair = %pair))]
    pub async fn confirm(&self, pair: AsPair) -> PeeringResult<PeeringLink> {
        let _guard = self.locks.lock(pair).await;

        let link = self
            .store
            .current_link(pair)
            .await?
            .ok_or_else(|| PeeringError::link_not_found(pair))?;
        if link.state == LinkState::Active {
            return Ok(link);
        }

        let write = LinkWrite::Confirm {
            pair,
            current: link.id,
        };
        let result = retry_async(&self.config.retry, "confirm_link", || {
            self.store.commit_link(write.clone())
        })
        .await;

        let record = AuditRecord::new(AuditCategory::LinkTransition, SOURCE, "confirm")
            .with_object_type("link")
            .with_object_id(pair);
        match &result {
            Ok(active) => {
                audit_log!(record
                    .with_outcome(AuditOutcome::Success)
                    .with_details(serde_json::json!({ "link_id": active.id.as_u64() })));
            }
            Err(e) => {
                audit_log!(record.with_error(e));
            }
        }
        result
    }

    /// Drops lock entries for pairs no task is using.
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }

    fn audit(pair: AsPair, kind: &str, outcome: &PairOutcome, pass_id: &str) {
        let record = AuditRecord::new(AuditCategory::LinkTransition, SOURCE, kind)
            .with_object_type("link")
            .with_object_id(pair)
            .with_correlation_id(pass_id);

        match outcome {
            PairOutcome::Created { link, replaced } => {
                audit_log!(record
                    .with_outcome(AuditOutcome::Success)
                    .with_details(serde_json::json!({
                        "link_id": link.id.as_u64(),
                        "replaced": replaced.map(|id| id.as_u64()),
                        "state": link.state.to_string(),
                        "attributes": link.attributes.to_string(),
                    })));
            }
            PairOutcome::Removed { link } => {
                audit_log!(record
                    .with_outcome(AuditOutcome::Success)
                    .with_details(serde_json::json!({ "link_id": link.id.as_u64() })));
            }
            PairOutcome::Failed { reason } => {
                audit_log!(record.with_error(reason));
            }
            PairOutcome::SkippedStale => {
                audit_log!(record.with_outcome(AuditOutcome::InProgress).with_details(
                    serde_json::json!({ "discarded": "stale" })
                ));
            }
            PairOutcome::Unchanged => {}
        }
    }
}
