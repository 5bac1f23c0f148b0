//! Error types for peering operations.
//!
//! Every variant names the object it concerns (policy id, AS, or AS pair)
//! so operators can retry narrowly.

use crate::policy::PolicyId;
use ixp_orch_common::Retryable;
use ixp_types::{AsPair, Asn};
use thiserror::Error;

/// Result type alias for peering operations.
pub type PeeringResult<T> = Result<T, PeeringError>;

/// Errors that can occur in the peering engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeeringError {
    /// Unknown policy, AS, or link.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Object kind ("policy", "autonomous system", "link").
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A concurrent writer changed the object first.
    #[error("Conflict on {subject}: {message}")]
    Conflict {
        /// The policy, AS, or pair that conflicted.
        subject: String,
        /// What did not match.
        message: String,
    },

    /// Malformed selector or attribute combination. Rejected before any write.
    #[error("Invalid policy for {asn}: {message}")]
    Validation {
        /// Owning AS of the rejected policy.
        asn: Asn,
        /// Which rule was violated.
        message: String,
    },

    /// Transient storage failure.
    #[error("Storage operation '{operation}' failed for {subject}: {message}")]
    Storage {
        /// The store operation (e.g., "commit_link", "snapshot").
        operation: String,
        /// The object the operation touched.
        subject: String,
        /// Error message.
        message: String,
    },

    /// A reconciliation task was planned against policy revisions that
    /// have since changed. Never surfaced to callers.
    #[error("Stale task for {pair}: {message}")]
    StaleTask {
        /// The pair the task was for.
        pair: AsPair,
        /// Which revision moved.
        message: String,
    },

    /// Invalid daemon configuration.
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },
}

impl PeeringError {
    pub fn policy_not_found(id: PolicyId) -> Self {
        Self::NotFound {
            kind: "policy",
            id: id.to_string(),
        }
    }

    pub fn system_not_found(asn: Asn) -> Self {
        Self::NotFound {
            kind: "autonomous system",
            id: asn.to_string(),
        }
    }

    pub fn link_not_found(pair: AsPair) -> Self {
        Self::NotFound {
            kind: "link",
            id: pair.to_string(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(subject: impl ToString, message: impl Into<String>) -> Self {
        Self::Conflict {
            subject: subject.to_string(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(asn: Asn, message: impl Into<String>) -> Self {
        Self::Validation {
            asn,
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(
        operation: impl Into<String>,
        subject: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            subject: subject.to_string(),
            message: message.into(),
        }
    }

    /// Creates a stale task error.
    pub fn stale(pair: AsPair, message: impl Into<String>) -> Self {
        Self::StaleTask {
            pair,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PeeringError::Storage { .. })
    }

    /// Returns true for errors that are handled internally and never
    /// reported to callers.
    pub fn is_internal(&self) -> bool {
        matches!(self, PeeringError::StaleTask { .. })
    }
}

impl Retryable for PeeringError {
    fn is_retryable(&self) -> bool {
        PeeringError::is_retryable(self)
    }
}
