//! Reconciliation task and report types.

use crate::differ::{Delta, RemovalReason};
use crate::model::{Justification, LinkAttributes, LinkId, ObservedPolicies, PeeringLink};
use chrono::{DateTime, Utc};
use ixp_orch_common::TaskStatus;
use ixp_types::AsPair;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// What a task does to its pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Make the pair's live link carry `attributes`, replacing a link with
    /// different attributes if there is one.
    Create {
        attributes: LinkAttributes,
        justification: Justification,
        replaces: Option<LinkId>,
    },
    /// Remove the pair's live link.
    Remove { link: LinkId },
}

/// Unit of reconciliation work for one pair. Exists only while queued or
/// running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationTask {
    pub pair: AsPair,
    pub action: TaskAction,
    /// Policy revisions the task was planned against
    pub observed: ObservedPolicies,
}

impl ReconciliationTask {
    /// Groups a delta into one task per pair. A replacement's removal half
    /// folds into its create task.
    pub fn from_delta(delta: Delta) -> Vec<ReconciliationTask> {
        let mut tasks: BTreeMap<AsPair, ReconciliationTask> = BTreeMap::new();

        for planned in delta.to_create {
            let pair = planned.decision.pair;
            tasks.insert(
                pair,
                ReconciliationTask {
                    pair,
                    action: TaskAction::Create {
                        attributes: planned.decision.attributes,
                        justification: planned.justification,
                        replaces: planned.replaces.map(|link| link.id),
                    },
                    observed: planned.justification.observed(),
                },
            );
        }

        for removal in delta.to_remove {
            let pair = removal.link.pair;
            if removal.reason == RemovalReason::Replaced && tasks.contains_key(&pair) {
                continue;
            }
            tasks.entry(pair).or_insert(ReconciliationTask {
                pair,
                action: TaskAction::Remove {
                    link: removal.link.id,
                },
                observed: removal.observed,
            });
        }

        tasks.into_values().collect()
    }

    pub fn kind(&self) -> &'static str {
        match self.action {
            TaskAction::Create { replaces: None, .. } => "create",
            TaskAction::Create { replaces: Some(_), .. } => "replace",
            TaskAction::Remove { .. } => "remove",
        }
    }
}

/// Result of one pair's task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairOutcome {
    /// A new link identity was written; `replaced` is the link it removed
    Created {
        link: PeeringLink,
        replaced: Option<LinkId>,
    },
    Removed {
        link: PeeringLink,
    },
    /// The pair already matched the plan
    Unchanged,
    /// Retries exhausted or a permanent error
    Failed {
        reason: String,
    },
    /// Policy revisions moved after planning; nothing was written
    SkippedStale,
}

impl PairOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            PairOutcome::Created { .. } | PairOutcome::Removed { .. } => TaskStatus::Success,
            PairOutcome::Unchanged => TaskStatus::Unchanged,
            PairOutcome::Failed { .. } => TaskStatus::Failed,
            PairOutcome::SkippedStale => TaskStatus::Stale,
        }
    }
}

impl fmt::Display for PairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairOutcome::Created { .. } => f.write_str("created"),
            PairOutcome::Removed { .. } => f.write_str("removed"),
            PairOutcome::Unchanged => f.write_str("unchanged"),
            PairOutcome::Failed { reason } => write!(f, "failed:{}", reason),
            PairOutcome::SkippedStale => f.write_str("skipped:stale"),
        }
    }
}

/// Outcome counts of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub created: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped_stale: usize,
}

/// Per-pair outcomes of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub pass_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: BTreeMap<AsPair, PairOutcome>,
}

impl ReconciliationReport {
    /// A report for a pass that had nothing to do.
    pub fn empty(pass_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            pass_id: pass_id.into(),
            started_at: now,
            finished_at: now,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcome(&self, pair: &AsPair) -> Option<&PairOutcome> {
        self.outcomes.get(pair)
    }

    /// Pairs that failed, with their reasons.
    pub fn failures(&self) -> Vec<(AsPair, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(pair, outcome)| match outcome {
                PairOutcome::Failed { reason } => Some((*pair, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for outcome in self.outcomes.values() {
            match outcome {
                PairOutcome::Created { .. } => summary.created += 1,
                PairOutcome::Removed { .. } => summary.removed += 1,
                PairOutcome::Unchanged => summary.unchanged += 1,
                PairOutcome::Failed { .. } => summary.failed += 1,
                PairOutcome::SkippedStale => summary.skipped_stale += 1,
            }
        }
        summary
    }

    /// Outcome labels keyed by pair, e.g. `AS1-AS2 -> "created"`.
    pub fn labels(&self) -> BTreeMap<AsPair, String> {
        self.outcomes
            .iter()
            .map(|(pair, outcome)| (*pair, outcome.to_string()))
            .collect()
    }
}
