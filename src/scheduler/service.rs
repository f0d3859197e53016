//! Scheduler loop and guarded runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, NaiveTime};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::error::{LockError, PipelineError};
use crate::lock::SingleFlightLock;
use crate::logging::ERROR_TARGET;
use crate::pipeline::{PipelineOrchestrator, RunReport};
use crate::runner::Runnable;

use super::cleanup::RetentionCleaner;
use super::trigger::DailyTrigger;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Outcome of one guarded run attempt.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Another run held the lock; nothing was done.
    Skipped,
    /// The orchestrator ran to completion.
    Completed(RunReport),
}

impl TickOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            TickOutcome::Skipped => None,
            TickOutcome::Completed(report) => Some(report),
        }
    }
}

/// Fires the orchestrator once a day under the single-flight lock.
pub struct Scheduler {
    orchestrator: PipelineOrchestrator,
    lock: SingleFlightLock,
    cleanup: Option<Arc<dyn Runnable>>,
    run_time: NaiveTime,
    poll_interval: Duration,
    timezone: String,
}

impl Scheduler {
    /// Creates a scheduler without a cleanup collaborator.
    pub fn new(
        orchestrator: PipelineOrchestrator,
        lock: SingleFlightLock,
        run_time: NaiveTime,
    ) -> Self {
        Self {
            orchestrator,
            lock,
            cleanup: None,
            run_time,
            poll_interval: Duration::from_secs(30),
            timezone: "UTC".to_string(),
        }
    }

    /// Wires orchestrator, lock, retention cleanup and timing from the
    /// configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, SchedulerError> {
        let run_time = config.run_time()?;
        Ok(Self::new(
            PipelineOrchestrator::from_config(config)?,
            SingleFlightLock::new(config.lock_path()),
            run_time,
        )
        .with_cleanup(RetentionCleaner::from_config(config))
        .with_poll_interval(config.poll_interval())
        .with_timezone(config.scheduler.timezone.clone()))
    }

    /// Builder method to set the cleanup collaborator run after every run.
    pub fn with_cleanup(mut self, cleanup: impl Runnable + 'static) -> Self {
        self.cleanup = Some(Arc::new(cleanup));
        self
    }

    /// Builder method to drop the cleanup collaborator.
    pub fn without_cleanup(mut self) -> Self {
        self.cleanup = None;
        self
    }

    /// Builder method to set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder method to set the documented timezone label.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn lock(&self) -> &SingleFlightLock {
        &self.lock
    }

    pub fn run_time(&self) -> NaiveTime {
        self.run_time
    }

    /// Runs the orchestrator once if the lock is free.
    ///
    /// The lock is released on every exit path, including when the returned
    /// future is dropped. Cleanup runs after the release and never fails the
    /// tick.
    pub async fn run_guarded(&self) -> Result<TickOutcome, SchedulerError> {
        let guard = match self.lock.acquire_guard()? {
            Some(guard) => guard,
            None => {
                warn!("Pipeline already running. Skipping execution.");
                return Ok(TickOutcome::Skipped);
            }
        };

        info!("Starting scheduled pipeline execution");
        let started = Instant::now();

        let report = self.orchestrator.run().await;

        if let Err(e) = guard.release() {
            error!(target: ERROR_TARGET, "Failed to release pipeline lock: {}", e);
        }

        self.run_cleanup().await;

        info!(
            "Scheduled execution finished with status {} in {:.2}s",
            report.status,
            started.elapsed().as_secs_f64()
        );

        Ok(TickOutcome::Completed(report))
    }

    /// Fires a guarded run if `trigger` is due at `now`.
    ///
    /// Returns `None` when nothing was due.
    pub async fn tick(
        &self,
        trigger: &mut DailyTrigger,
        now: NaiveDateTime,
    ) -> Result<Option<TickOutcome>, SchedulerError> {
        if !trigger.is_due(now) {
            return Ok(None);
        }
        trigger.advance(now);
        self.run_guarded().await.map(Some)
    }

    /// Runs until `cancel` fires.
    ///
    /// Cancellation during a run drops the run, which releases the lock; the
    /// step unit currently executing is not interrupted.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        let mut trigger = DailyTrigger::new(self.run_time, Local::now().naive_local());

        info!(
            "Scheduler started. Daily run at {} (timezone {} documented, system local time used)",
            self.run_time.format("%H:%M"),
            self.timezone
        );
        info!("Next run at {}", trigger.next_run());

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = interval.tick() => {}
            }

            let now = Local::now().naive_local();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = self.tick(&mut trigger, now) => Some(outcome),
            };

            match outcome {
                None => {
                    warn!("Shutdown requested during a run; lock released");
                    break;
                }
                Some(Ok(Some(_))) => info!("Next run at {}", trigger.next_run()),
                Some(Ok(None)) => {}
                Some(Err(e)) => error!(target: ERROR_TARGET, "Scheduled run failed: {}", e),
            }
        }

        Ok(())
    }

    async fn run_cleanup(&self) {
        let Some(cleanup) = &self.cleanup else {
            return;
        };

        match cleanup.invoke().await {
            Ok(output) if output.is_success() => {
                info!("Cleanup finished: {}", output.stdout.trim());
            }
            Ok(output) => warn!(
                "Cleanup exited with status {}: {}",
                output.exit_code,
                output.stderr.trim()
            ),
            Err(e) => warn!("Cleanup failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunStatus;
    use crate::runner::{FnUnit, RetryPolicy, Step, StepRunner, UnitOutput};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn scheduler_in(dir: &TempDir, steps: Vec<Step>) -> Scheduler {
        let orchestrator = PipelineOrchestrator::new(
            steps,
            StepRunner::new(RetryPolicy::new(2, vec![Duration::from_millis(1)])),
            dir.path().join("report.json"),
        )
        .expect("unique steps");
        Scheduler::new(
            orchestrator,
            SingleFlightLock::new(dir.path().join("pipeline.lock")),
            NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        )
    }

    fn ok_step(name: &str) -> Step {
        Step::new(
            name,
            FnUnit::new(name, || async { Ok(UnitOutput::success("ok")) }),
        )
    }

    fn counting_cleanup(counter: Arc<AtomicU32>) -> FnUnit {
        FnUnit::new("cleanup", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(UnitOutput::success("cleaned"))
            }
        })
    }

    #[tokio::test]
    async fn test_guarded_run_releases_lock_and_cleans_up() {
        let dir = TempDir::new().expect("temp dir");
        let cleanups = Arc::new(AtomicU32::new(0));
        let scheduler = scheduler_in(&dir, vec![ok_step("extract")])
            .with_cleanup(counting_cleanup(Arc::clone(&cleanups)));

        let outcome = scheduler.run_guarded().await.expect("run");

        let report = outcome.report().expect("completed");
        assert_eq!(report.status, RunStatus::Success);
        assert!(!scheduler.lock().is_held());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_run_still_releases_lock() {
        let dir = TempDir::new().expect("temp dir");
        let failing = Step::new(
            "load",
            FnUnit::new("load", || async { Ok(UnitOutput::failure(1, "db down")) }),
        );
        let cleanups = Arc::new(AtomicU32::new(0));
        let scheduler = scheduler_in(&dir, vec![failing])
            .with_cleanup(counting_cleanup(Arc::clone(&cleanups)));

        let outcome = scheduler.run_guarded().await.expect("run");
        assert_eq!(outcome.report().expect("completed").status, RunStatus::Failed);
        assert!(!scheduler.lock().is_held());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        // The next run is not blocked
        assert!(matches!(
            scheduler.run_guarded().await.expect("run"),
            TickOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn test_skips_when_lock_held() {
        let dir = TempDir::new().expect("temp dir");
        let cleanups = Arc::new(AtomicU32::new(0));
        let scheduler = scheduler_in(&dir, vec![ok_step("extract")])
            .with_cleanup(counting_cleanup(Arc::clone(&cleanups)));

        let other = SingleFlightLock::new(scheduler.lock().path());
        assert!(other.try_acquire().expect("acquire"));
        let holder = other.holder().expect("holder");

        let outcome = scheduler.run_guarded().await.expect("run");
        assert!(matches!(outcome, TickOutcome::Skipped));
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("report.json").exists());
        assert_eq!(other.holder().expect("holder"), holder);
    }

    #[tokio::test]
    async fn test_tick_runs_only_when_due() {
        let dir = TempDir::new().expect("temp dir");
        let scheduler = scheduler_in(&dir, vec![ok_step("extract")]);

        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        let mut trigger = DailyTrigger::new(scheduler.run_time(), start);

        let early = scheduler
            .tick(&mut trigger, start + chrono::Duration::minutes(30))
            .await
            .expect("tick");
        assert!(early.is_none());

        let due = start + chrono::Duration::minutes(60);
        let fired = scheduler.tick(&mut trigger, due).await.expect("tick");
        assert!(matches!(fired, Some(TickOutcome::Completed(_))));

        let again = scheduler
            .tick(&mut trigger, due + chrono::Duration::seconds(30))
            .await
            .expect("tick");
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dir = TempDir::new().expect("temp dir");
        let scheduler = scheduler_in(&dir, vec![ok_step("extract")])
            .with_poll_interval(Duration::from_millis(10));

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), scheduler.run(cancel)).await;
        assert!(matches!(result, Ok(Ok(()))));
        assert!(!scheduler.lock().is_held());
    }

    #[tokio::test]
    async fn test_cancel_during_run_releases_lock() {
        let dir = TempDir::new().expect("temp dir");
        let slow = Step::new(
            "slow",
            FnUnit::new("slow", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(UnitOutput::success("late"))
            }),
        );
        let scheduler = scheduler_in(&dir, vec![slow]);

        let cancel = CancellationToken::new();
        let lock = scheduler.lock().clone();
        let result = tokio::select! {
            outcome = scheduler.run_guarded() => Some(outcome),
            _ = async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                assert!(lock.is_held());
                cancel.cancel();
            } => None,
        };

        assert!(result.is_none());
        assert!(cancel.is_cancelled());
        assert!(!scheduler.lock().is_held());
    }

    #[test]
    fn test_from_config_rejects_bad_run_time() {
        let config = PipelineConfig::new().with_daily_run_time("noon");
        assert!(matches!(
            Scheduler::from_config(&config),
            Err(SchedulerError::Config(_))
        ));
    }
}
