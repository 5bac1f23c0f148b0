//! OrchDaemon implementation.
//!
//! The OrchDaemon drives every registered Orch on a fixed heartbeat:
//! - Orch registration and priority ordering
//! - Task dispatch to Orchs with pending work
//! - Timer callbacks for housekeeping
//! - Cooperative shutdown through a cancellation token

use crate::audit::{audit_log, AuditCategory, AuditOutcome, AuditRecord};
use ixp_orch_common::Orch;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Configuration for the OrchDaemon.
#[derive(Debug, Clone)]
pub struct OrchDaemonConfig {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
}

impl Default for OrchDaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 200,
        }
    }
}

impl OrchDaemonConfig {
    /// A heartbeat matching the change trigger's debounce window.
    pub fn with_heartbeat(heartbeat: Duration) -> Self {
        Self {
            heartbeat_interval_ms: u64::try_from(heartbeat.as_millis()).unwrap_or(u64::MAX).max(1),
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// The main orchestration daemon.
pub struct OrchDaemon {
    config: OrchDaemonConfig,
    /// Registered Orchs sorted by priority
    orchs: BTreeMap<i32, Vec<Box<dyn Orch>>>,
    running: bool,
    ticks: u64,
}

impl OrchDaemon {
    pub fn new(config: OrchDaemonConfig) -> Self {
        Self {
            config,
            orchs: BTreeMap::new(),
            running: false,
            ticks: 0,
        }
    }

    /// Registers an Orch with the daemon.
    ///
    /// Orchs are ordered by priority (lower = higher priority).
    pub fn register_orch(&mut self, orch: Box<dyn Orch>) {
        let priority = orch.priority();
        let orch_name = orch.name().to_string();
        info!("Registering {} with priority {}", orch_name, priority);

        let record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "OrchDaemon",
            format!("register_orch: {}", orch_name),
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(&orch_name)
        .with_object_type("orch_module")
        .with_details(serde_json::json!({
            "priority": priority,
        }));
        audit_log!(record);

        self.orchs.entry(priority).or_default().push(orch);
    }

    pub fn orch_count(&self) -> usize {
        self.orchs.values().map(Vec::len).sum()
    }

    /// Heartbeats completed since the daemon started.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one heartbeat: timers first, then every Orch with pending work,
    /// in priority order.
    pub async fn tick(&mut self) {
        for orchs in self.orchs.values_mut() {
            for orch in orchs.iter_mut() {
                orch.on_timer();
                if orch.has_pending_tasks() {
                    debug!("Processing tasks for {}", orch.name());
                    orch.do_task().await;
                }
            }
        }
        self.ticks += 1;
    }

    /// Runs the event loop until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("Starting OrchDaemon event loop");
        self.running = true;

        let record = AuditRecord::new(
            AuditCategory::AdminAction,
            "OrchDaemon",
            "event_loop_started",
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "heartbeat_interval_ms": self.config.heartbeat_interval_ms,
            "orch_count": self.orch_count(),
        }));
        audit_log!(record);

        let heartbeat = self.config.heartbeat();
        while !shutdown.is_cancelled() {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(heartbeat) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        self.running = false;
        info!(ticks = self.ticks, "OrchDaemon event loop stopped");

        let stop_record = AuditRecord::new(
            AuditCategory::AdminAction,
            "OrchDaemon",
            "event_loop_stopped",
        )
        .with_outcome(AuditOutcome::Success);
        audit_log!(stop_record);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Dumps state for debugging.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push(format!("OrchDaemon running: {}", self.running));

        for (priority, orchs) in &self.orchs {
            for orch in orchs {
                let pending = orch.dump_pending_tasks();
                lines.push(format!(
                    "  [{:3}] {} - {} pending",
                    priority,
                    orch.name(),
                    pending.len()
                ));
                lines.extend(pending.into_iter().map(|task| format!("        {}", task)));
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct TestOrch {
        name: String,
        priority: i32,
        task_count: Arc<AtomicU32>,
        timer_count: Arc<AtomicU32>,
        has_pending: bool,
    }

    impl TestOrch {
        fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                task_count: Arc::new(AtomicU32::new(0)),
                timer_count: Arc::new(AtomicU32::new(0)),
                has_pending: false,
            }
        }

        fn with_pending(mut self) -> Self {
            self.has_pending = true;
            self
        }
    }

    #[async_trait]
    impl Orch for TestOrch {
        fn name(&self) -> &str {
            &self.name
        }

        async fn do_task(&mut self) {
            self.task_count.fetch_add(1, Ordering::SeqCst);
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn has_pending_tasks(&self) -> bool {
            self.has_pending
        }

        fn dump_pending_tasks(&self) -> Vec<String> {
            if self.has_pending {
                vec![format!("{}: work", self.name)]
            } else {
                vec![]
            }
        }

        fn on_timer(&mut self) {
            self.timer_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_config_heartbeat() {
        assert_eq!(OrchDaemonConfig::default().heartbeat(), Duration::from_millis(200));
        let config = OrchDaemonConfig::with_heartbeat(Duration::from_millis(750));
        assert_eq!(config.heartbeat_interval_ms, 750);
        assert_eq!(OrchDaemonConfig::with_heartbeat(Duration::ZERO).heartbeat_interval_ms, 1);
    }

    #[test]
    fn test_register_priority_ordering() {
        let mut daemon = OrchDaemon::new(OrchDaemonConfig::default());

        daemon.register_orch(Box::new(TestOrch::new("LowPriority", 100)));
        daemon.register_orch(Box::new(TestOrch::new("HighPriority", -10)));
        daemon.register_orch(Box::new(TestOrch::new("MediumPriority", 50)));
        daemon.register_orch(Box::new(TestOrch::new("AlsoMedium", 50)));

        let priorities: Vec<i32> = daemon.orchs.keys().copied().collect();
        assert_eq!(priorities, vec![-10, 50, 100]);
        assert_eq!(daemon.orch_count(), 4);
    }

    #[tokio::test]
    async fn test_tick_dispatches_only_pending() {
        let idle = TestOrch::new("Idle", 0);
        let busy = TestOrch::new("Busy", 1).with_pending();
        let idle_tasks = idle.task_count.clone();
        let idle_timers = idle.timer_count.clone();
        let busy_tasks = busy.task_count.clone();

        let mut daemon = OrchDaemon::new(OrchDaemonConfig::default());
        daemon.register_orch(Box::new(idle));
        daemon.register_orch(Box::new(busy));

        daemon.tick().await;
        daemon.tick().await;

        assert_eq!(idle_tasks.load(Ordering::SeqCst), 0);
        assert_eq!(idle_timers.load(Ordering::SeqCst), 2);
        assert_eq!(busy_tasks.load(Ordering::SeqCst), 2);
        assert_eq!(daemon.ticks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled() {
        let orch = TestOrch::new("Busy", 0).with_pending();
        let tasks = orch.task_count.clone();

        let mut daemon = OrchDaemon::new(OrchDaemonConfig::with_heartbeat(Duration::from_millis(100)));
        daemon.register_orch(Box::new(orch));

        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let token = token.clone();
            async move {
                daemon.run(token).await;
                daemon
            }
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        token.cancel();
        let daemon = handle.await.unwrap();

        assert!(!daemon.is_running());
        assert!(daemon.ticks() >= 3);
        assert_eq!(tasks.load(Ordering::SeqCst) as u64, daemon.ticks());
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_cancelled() {
        let mut daemon = OrchDaemon::new(OrchDaemonConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        daemon.run(token).await;
        assert_eq!(daemon.ticks(), 0);
    }

    #[test]
    fn test_dump() {
        let mut daemon = OrchDaemon::new(OrchDaemonConfig::default());
        daemon.register_orch(Box::new(TestOrch::new("Idle", 0)));
        daemon.register_orch(Box::new(TestOrch::new("Busy", 10).with_pending()));

        assert_eq!(
            daemon.dump(),
            vec![
                "OrchDaemon running: false".to_string(),
                "  [  0] Idle - 0 pending".to_string(),
                "  [ 10] Busy - 1 pending".to_string(),
                "        Busy: work".to_string(),
            ]
        );
    }
}
