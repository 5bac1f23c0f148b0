//! Audit trail and logging setup.
//!
//! Every policy mutation and every link transition produces an
//! [`AuditRecord`], emitted through [`audit_log!`](crate::audit_log) on
//! the `audit` tracing target. Records serialize to a flat JSON object
//! so they can be shipped to a log pipeline as-is.
//!
//! | Outcome | Level |
//! |---------|-------|
//! | success | info |
//! | in_progress | debug |
//! | failure, denied | warn |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// AS registration
    Registry,
    /// Policy submit / withdraw
    PolicyChange,
    /// Link create / replace / remove / confirm
    LinkTransition,
    /// Reconciliation passes
    Reconciliation,
    /// Daemon startup and shutdown
    SystemLifecycle,
    /// Operator-driven actions (seed, manual reconcile)
    AdminAction,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::Registry => write!(f, "REGISTRY"),
            AuditCategory::PolicyChange => write!(f, "POLICY_CHANGE"),
            AuditCategory::LinkTransition => write!(f, "LINK_TRANSITION"),
            AuditCategory::Reconciliation => write!(f, "RECONCILIATION"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::AdminAction => write!(f, "ADMIN_ACTION"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    /// Rejected by validation before any write
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// One structured audit record.
///
/// Built with the `with_*` methods and then handed to `audit_log!`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component that produced the record
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,
    /// Policy id, AS, or AS pair the action touched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// "policy", "link", "autonomous_system", ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Groups the records of one reconciliation pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    /// Creates a record stamped with the current time. Outcome starts as
    /// in-progress.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
            correlation_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl ToString) -> Self {
        self.object_id = Some(id.to_string());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Records an error and marks the outcome as failure.
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn with_correlation_id(mut self, id: impl ToString) -> Self {
        self.correlation_id = Some(id.to_string());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emits an [`AuditRecord`] on the `audit` target at a level chosen by
/// its outcome.
///
/// ```ignore
/// let record = AuditRecord::new(AuditCategory::PolicyChange, "PolicyModel", "submit")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id(policy.id)
///     .with_object_type("policy");
/// audit_log!(record);
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    object_id = record.object_id.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    object_id = record.object_id.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Denied => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    object_id = record.object_id.as_deref().unwrap_or(""),
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

pub use crate::audit_log;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. With `json` set, events
/// are written as one JSON object per line.
pub fn init_logging(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}
