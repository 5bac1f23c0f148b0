//! Task processing status.

/// Result of processing one unit of orchestration work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Work was applied
    Success,
    /// Nothing to do; state already matched
    Unchanged,
    /// Work failed permanently
    Failed,
    /// Work failed transiently and may be retried
    NeedRetry,
    /// Work was planned against state that has since changed; discarded
    Stale,
}

impl TaskStatus {
    /// Returns true if the task completed without error.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Unchanged)
    }

    /// Returns true if the task should be retried.
    pub fn should_retry(&self) -> bool {
        matches!(self, TaskStatus::NeedRetry)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Unchanged => "unchanged",
            TaskStatus::Failed => "failed",
            TaskStatus::NeedRetry => "need_retry",
            TaskStatus::Stale => "stale",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can tell whether retrying the failed operation may help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status() {
        assert!(TaskStatus::Success.is_success());
        assert!(TaskStatus::Unchanged.is_success());
        assert!(!TaskStatus::Stale.is_success());
        assert!(TaskStatus::NeedRetry.should_retry());
        assert!(!TaskStatus::Failed.should_retry());
        assert!(TaskStatus::Failed.is_failure());
        assert_eq!(TaskStatus::Stale.to_string(), "stale");
    }
}
