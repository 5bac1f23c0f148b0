//! Reconciliation of the link inventory against the desired topology.

mod orch;
mod types;

pub use orch::{Reconciler, ReconcilerConfig};
pub use types::{
    PairOutcome, ReconciliationReport, ReconciliationTask, ReportSummary, TaskAction,
};
