//! The unit of work an orchestration daemon drives.

use async_trait::async_trait;

/// A component the daemon polls on every heartbeat.
///
/// The daemon calls `on_timer` each heartbeat and `do_task` only while
/// `has_pending_tasks` reports work.
#[async_trait]
pub trait Orch: Send + Sync {
    fn name(&self) -> &str;

    /// Handles whatever work is ready. Errors are the Orch's to log or
    /// re-queue; the daemon does not see them.
    async fn do_task(&mut self);

    /// Dispatch order within a heartbeat; lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// One line per pending item, for `OrchDaemon::dump`.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }

    /// Housekeeping hook, called whether or not work is pending.
    fn on_timer(&mut self) {}
}
