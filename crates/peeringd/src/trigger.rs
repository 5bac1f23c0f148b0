//! Change trigger.
//!
//! Policy mutations notify the trigger with every AS whose matching
//! outcome may have changed. Notifications for the same AS collapse into a
//! single pending entry; an entry becomes ready once the debounce window
//! since its first notification has passed, so a burst of edits costs one
//! incremental scan.

use crate::policy::PolicyId;
use ixp_orch_common::{Consumer, ConsumerConfig, PendingEntry};
use ixp_types::Asn;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Why an AS was scheduled for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCause {
    /// The AS submitted a policy
    Submitted(PolicyId),
    /// The AS withdrew a policy
    Withdrawn(PolicyId),
    /// Another AS's policy names this AS
    NamedBy(PolicyId),
    /// Operator request
    Manual,
}

impl fmt::Display for TriggerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerCause::Submitted(id) => write!(f, "submitted {}", id),
            TriggerCause::Withdrawn(id) => write!(f, "withdrawn {}", id),
            TriggerCause::NamedBy(id) => write!(f, "named by {}", id),
            TriggerCause::Manual => write!(f, "manual"),
        }
    }
}

/// ASes taken from the trigger in one go.
///
/// Keeps the drained entries so a batch that could not be processed can
/// be handed back with [`ChangeTrigger::requeue`].
#[derive(Debug, Clone, Default)]
pub struct TriggerBatch {
    pub ases: BTreeSet<Asn>,
    /// Notifications collapsed into this batch
    pub events: u32,
    entries: Vec<(Asn, PendingEntry<TriggerCause>)>,
}

impl TriggerBatch {
    pub fn is_empty(&self) -> bool {
        self.ases.is_empty()
    }
}

/// Debounced set of ASes awaiting an incremental reconcile.
pub struct ChangeTrigger {
    pending: Mutex<Consumer<Asn, TriggerCause>>,
    debounce: Duration,
}

impl ChangeTrigger {
    pub fn new(debounce: Duration) -> Self {
        Self {
            pending: Mutex::new(Consumer::new(ConsumerConfig::new("PEERING_TRIGGER"))),
            debounce,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Schedules `asn`. Returns true if it was not already pending.
    pub fn notify(&self, asn: Asn, cause: TriggerCause) -> bool {
        let fresh = self.pending.lock().add(asn, cause);
        trace!(asn = %asn, cause = %cause, fresh, "Change trigger");
        fresh
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().has_pending()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().pending_count()
    }

    /// Takes the ASes whose debounce window has elapsed.
    pub fn take_ready(&self) -> TriggerBatch {
        let now = Instant::now();
        let debounce = self.debounce;
        let drained = self
            .pending
            .lock()
            .drain_where(|entry| now.saturating_duration_since(entry.first_seen) >= debounce);
        Self::batch(drained)
    }

    /// Takes every pending AS regardless of the debounce window.
    pub fn take_all(&self) -> TriggerBatch {
        let mut drained = Vec::new();
        let mut pending = self.pending.lock();
        while pending.has_pending() {
            drained.extend(pending.drain());
        }
        Self::batch(drained)
    }

    /// Puts a taken batch back. Entries keep their first-seen time, so
    /// they are ready again on the next `take_ready`; notifications that
    /// arrived in the meantime are merged in.
    pub fn requeue(&self, batch: TriggerBatch) {
        if batch.entries.is_empty() {
            return;
        }
        warn!(ases = batch.ases.len(), events = batch.events, "Re-queueing change triggers");
        let mut pending = self.pending.lock();
        for (asn, entry) in batch.entries {
            pending.retry(asn, entry);
        }
    }

    pub fn dump(&self) -> Vec<String> {
        self.pending.lock().dump()
    }

    fn batch(drained: Vec<(Asn, PendingEntry<TriggerCause>)>) -> TriggerBatch {
        let mut batch = TriggerBatch::default();
        for (asn, entry) in &drained {
            if entry.hits > 1 {
                debug!(asn = %asn, collapsed = entry.hits, last = %entry.latest, "Collapsed change triggers");
            }
            batch.events = batch.events.saturating_add(entry.hits);
            batch.ases.insert(*asn);
        }
        batch.entries = drained;
        batch
    }
}

impl fmt::Debug for ChangeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTrigger")
            .field("debounce", &self.debounce)
            .field("pending", &self.pending_count())
            .finish()
    }
}
