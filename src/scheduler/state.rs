//! Per-task status tracking.

use std::fmt;

use chrono::{DateTime, Utc};

/// Lifecycle of a periodic task.
///
/// `Idle -> Running -> Idle` on success, `Running -> Failed -> Idle` on
/// failure, and `Stopped` once the loop has exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Failed,
    Stopped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        })
    }
}

/// Status of one task, shared with whoever wants to observe it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStatus {
    pub state: TaskState,
    /// Completed cycles, successful or not.
    pub runs: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

impl TaskStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Running;
        self.last_started_at = Some(now);
    }

    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Idle;
        self.runs += 1;
        self.consecutive_failures = 0;
        self.last_finished_at = Some(now);
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: String) {
        self.state = TaskState::Failed;
        self.runs += 1;
        self.failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);
        self.last_finished_at = Some(now);
    }

    /// Returns a failed task to idle once the failure has been reported.
    pub fn recover(&mut self) {
        if self.state == TaskState::Failed {
            self.state = TaskState::Idle;
        }
    }

    pub fn mark_stopped(&mut self) {
        self.state = TaskState::Stopped;
    }
}
