//! PeeringOrch: drains debounced change triggers into incremental
//! reconciliation passes.

use crate::reconciler::ReportSummary;
use crate::service::PeeringService;
use async_trait::async_trait;
use ixp_orch_common::Orch;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct PeeringOrch {
    service: Arc<PeeringService>,
    passes: u64,
    last_summary: Option<ReportSummary>,
}

impl PeeringOrch {
    pub fn new(service: Arc<PeeringService>) -> Self {
        Self {
            service,
            passes: 0,
            last_summary: None,
        }
    }

    /// Reconciliation passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn last_summary(&self) -> Option<ReportSummary> {
        self.last_summary
    }
}

#[async_trait]
impl Orch for PeeringOrch {
    fn name(&self) -> &str {
        "PeeringOrch"
    }

    async fn do_task(&mut self) {
        match self.service.process_ready_triggers().await {
            Ok(Some(report)) => {
                self.passes += 1;
                let summary = report.summary();
                for (pair, reason) in report.failures() {
                    warn!(pair = %pair, reason, "Pair left unreconciled");
                }
                self.last_summary = Some(summary);
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Triggered reconciliation failed, ASes re-queued");
            }
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.service.trigger().has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.service.trigger().dump()
    }

    fn on_timer(&mut self) {
        let pruned = self.service.reconciler().prune_locks();
        if pruned > 0 {
            debug!(pruned, "Pruned idle pair locks");
        }
    }
}
