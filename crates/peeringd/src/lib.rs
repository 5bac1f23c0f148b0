//! IXP peering reconciliation engine.
//!
//! Autonomous systems declare peering policies; the engine derives the
//! desired set of peering links and keeps the link inventory converged on
//! it:
//!
//! - [`policy`]: Policy submission, supersession, and withdrawal
//! - [`matcher`]: Pairwise compatibility decision for two policies
//! - [`differ`]: Desired graph and delta against the live links
//! - [`reconciler`]: Applies a delta with per-pair locking and stale-write
//!   protection
//! - [`trigger`]: Debounced change notifications driving incremental passes
//! - [`service`]: The operation surface an API layer calls into
//! - [`daemon`]: Heartbeat loop draining the trigger
//!
//! Storage is injected through [`store::PeeringStore`]; the engine holds no
//! global state beyond per-pair locks and the pending trigger set.

pub mod audit;
pub mod config;
pub mod daemon;
pub mod differ;
pub mod error;
pub mod matcher;
pub mod model;
pub mod policy;
pub mod reconciler;
pub mod seed;
pub mod service;
pub mod store;
pub mod trigger;

pub use config::PeeringConfig;
pub use differ::{Delta, Scope, TopologyDiffer};
pub use error::{PeeringError, PeeringResult};
pub use matcher::{LinkDecision, Matcher, PrecedenceSemantics, SelectorSemantics};
pub use model::{AutonomousSystem, LinkAttributes, LinkId, LinkState, PeeringLink};
pub use policy::{
    LinkPreferences, PeeringPolicy, PolicyId, PolicyStatus, Selector, SelectorSet,
};
pub use reconciler::{PairOutcome, ReconciliationReport, Reconciler, ReconcilerConfig};
pub use service::PeeringService;
pub use store::{InMemoryStore, LinkWrite, PeeringStore, Snapshot};
pub use trigger::{ChangeTrigger, TriggerCause};
