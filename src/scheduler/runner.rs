//! Periodic task loops.
//!
//! Every registered task gets its own tokio task running a simple loop:
//! 1. Wait for the next tick or for shutdown, whichever comes first
//! 2. On shutdown → mark the task stopped and exit
//! 3. Run one cycle, handing it the shutdown token so it can bail out early
//! 4. On failure → record it, log it, alert the operator chat if configured
//!
//! The first tick fires one full period after the task is spawned. A slow
//! cycle delays later ticks instead of bursting to catch up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::TaskStatus;
use crate::notifier::OperatorChannel;

/// Shortest period a task may be scheduled with.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A unit of periodic work.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Stable name used in logs and alerts.
    fn name(&self) -> &'static str;

    /// Runs one cycle. The token is cancelled when shutdown begins.
    async fn run_cycle(&self, cancel: &CancellationToken) -> anyhow::Result<()>;
}

pub type SharedStatus = Arc<RwLock<TaskStatus>>;

struct TaskRunner {
    task: Arc<dyn PeriodicTask>,
    period: Duration,
    status: SharedStatus,
    alerts: Option<OperatorChannel>,
}

impl TaskRunner {
    async fn run(self, cancel: CancellationToken) {
        let name = self.task.name();
        info!(task = name, period_secs = self.period.as_secs(), "Task loop started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.run_once(&cancel).await;
        }

        self.status.write().await.mark_stopped();
        info!(task = name, "Task loop stopped");
    }

    async fn run_once(&self, cancel: &CancellationToken) {
        let name = self.task.name();
        self.status.write().await.mark_started(Utc::now());
        debug!(task = name, "Cycle started");

        match self.task.run_cycle(cancel).await {
            Ok(()) => {
                self.status.write().await.mark_succeeded(Utc::now());
            }
            Err(e) => {
                let message = format!("{e:#}");
                let consecutive = {
                    let mut status = self.status.write().await;
                    status.mark_failed(Utc::now(), message.clone());
                    status.consecutive_failures
                };

                error!(task = name, consecutive_failures = consecutive, "Cycle failed: {}", message);

                if let Some(alerts) = &self.alerts {
                    alerts
                        .alert(&format!(
                            "⚠️ {name} cycle failed ({consecutive} in a row): {message}"
                        ))
                        .await;
                }

                self.status.write().await.recover();
            }
        }
    }
}

/// Owns the periodic task loops and the shutdown token they share.
pub struct Scheduler {
    cancel: CancellationToken,
    alerts: Option<OperatorChannel>,
    tasks: Vec<(&'static str, SharedStatus, JoinHandle<()>)>,
}

impl Scheduler {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            alerts: None,
            tasks: Vec::new(),
        }
    }

    /// Sends cycle failures to an operator chat.
    #[must_use]
    pub fn with_alerts(mut self, alerts: OperatorChannel) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Starts a loop for `task` and returns its status handle.
    pub fn spawn(&mut self, task: Arc<dyn PeriodicTask>, period: Duration) -> SharedStatus {
        let name = task.name();
        let period = if period < MIN_PERIOD {
            warn!(task = name, "Period too short, using {:?}", MIN_PERIOD);
            MIN_PERIOD
        } else {
            period
        };

        let status: SharedStatus = Arc::new(RwLock::new(TaskStatus::new()));
        let runner = TaskRunner {
            task,
            period,
            status: status.clone(),
            alerts: self.alerts.clone(),
        };

        let handle = tokio::spawn(runner.run(self.cancel.clone()));
        self.tasks.push((name, status.clone(), handle));
        status
    }

    /// Status handle of the task with the given name.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<SharedStatus> {
        self.tasks
            .iter()
            .find(|(task, _, _)| *task == name)
            .map(|(_, status, _)| status.clone())
    }

    /// Requests shutdown of every loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for every loop to exit.
    pub async fn wait(self) {
        for (name, _, handle) in self.tasks {
            if let Err(e) = handle.await {
                error!(task = name, "Task loop panicked: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field(
                "tasks",
                &self.tasks.iter().map(|(name, _, _)| *name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::scheduler::TaskState;

    struct Counting {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PeriodicTask for Counting {
        fn name(&self) -> &'static str {
            if self.fail { "failing" } else { "counting" }
        }

        async fn run_cycle(&self, _cancel: &CancellationToken) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("source unavailable");
            }
            Ok(())
        }
    }

    fn counting(fail: bool) -> Arc<Counting> {
        Arc::new(Counting {
            runs: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let task = counting(false);
        let mut scheduler = Scheduler::new(CancellationToken::new());
        scheduler.spawn(task.clone(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);

        scheduler.shutdown();
        scheduler.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_loops() {
        let good = counting(false);
        let bad = counting(true);
        let mut scheduler = Scheduler::new(CancellationToken::new());
        scheduler.spawn(good.clone(), Duration::from_secs(10));
        let bad_status = scheduler.spawn(bad.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(good.runs.load(Ordering::SeqCst), 3);
        assert_eq!(bad.runs.load(Ordering::SeqCst), 3);
        {
            let status = bad_status.read().await;
            assert_eq!(status.failures, 3);
            assert_eq!(status.consecutive_failures, 3);
            assert_eq!(status.state, TaskState::Idle);
            assert_eq!(status.last_error.as_deref(), Some("source unavailable"));
        }

        scheduler.shutdown();
        let good_status = scheduler.status("counting").unwrap();
        scheduler.wait().await;
        assert_eq!(good_status.read().await.state, TaskState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cycle_after_shutdown() {
        let task = counting(false);
        let mut scheduler = Scheduler::new(CancellationToken::new());
        scheduler.spawn(task.clone(), Duration::from_secs(10));

        scheduler.shutdown();
        scheduler.wait().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(task.runs.load(Ordering::SeqCst), 0);
    }
}
