//! Automation Controller
//!
//! Toggleable wrapper around the scheduled prediction cycle.
//!
//! ```text
//!            enable()                      every interval
//! Disabled ──────────► Enabled ──► job "final_prediction_job" ──► tick()
//!     ▲                   │                                        │
//!     └───── disable() ───┘                     try_lock guard ◄───┘
//!                                                (skip if busy)
//! ```
//!
//! Scheduled ticks, the synchronous `run_now()` path and the forward-only
//! `run_forward_now()` share one cycle guard, so two runs never write the
//! bus at the same time. The guard is owned by the task doing the work: a
//! caller that stops waiting does not release it early. Cycle errors stop
//! at this boundary: they are logged and kept as the last failure, and the
//! job keeps firing.

pub mod scheduler;

pub use scheduler::{IntervalScheduler, Job, JobScheduler, SchedulerError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::types::{CycleReport, QualityPredictions, ToggleState};

/// Something that runs one full prediction cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport, PipelineError>;

    /// Ingest and run the forward half only.
    async fn run_forward(&self) -> Result<QualityPredictions, PipelineError>;
}

/// What happened on one scheduled firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    Failed,
    /// A cycle was already in flight.
    Skipped,
}

/// Operator-facing snapshot of the controller.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationStatus {
    pub enabled: bool,
    pub job_name: String,
    pub interval_secs: u64,
    pub scheduled_jobs: Vec<String>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub ticks_skipped: u64,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct CycleLedger {
    completed: u64,
    failed: u64,
    skipped: u64,
    last_report: Option<CycleReport>,
    last_error: Option<(String, DateTime<Utc>)>,
}

pub struct AutomationController {
    enabled: AtomicBool,
    scheduler: Arc<dyn JobScheduler>,
    runner: Arc<dyn CycleRunner>,
    interval: Duration,
    job_name: String,
    /// Held for a whole cycle.
    cycle_guard: Arc<tokio::sync::Mutex<()>>,
    /// Serializes enable/disable.
    toggle_lock: Mutex<()>,
    ledger: Arc<Mutex<CycleLedger>>,
}

impl AutomationController {
    pub fn new(
        scheduler: Arc<dyn JobScheduler>,
        runner: Arc<dyn CycleRunner>,
        interval: Duration,
        job_name: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            enabled: AtomicBool::new(false),
            scheduler,
            runner,
            interval,
            job_name: job_name.into(),
            cycle_guard: Arc::new(tokio::sync::Mutex::new(())),
            toggle_lock: Mutex::new(()),
            ledger: Arc::new(Mutex::new(CycleLedger::default())),
        })
    }

    pub fn get_state(&self) -> ToggleState {
        ToggleState {
            enabled: self.enabled.load(Ordering::SeqCst),
        }
    }

    /// Start the scheduler if needed and install the cycle job.
    ///
    /// Idempotent: the job is added with replace-existing semantics, so
    /// repeated calls leave exactly one job.
    pub fn enable(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let _toggle = self.toggle_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.scheduler.is_running() {
            self.scheduler.start();
        }

        // Weak so the scheduler's job does not keep the controller alive.
        let controller = Arc::downgrade(self);
        let job: Job = Arc::new(move || {
            let controller = controller.clone();
            Box::pin(async move {
                if let Some(controller) = controller.upgrade() {
                    controller.tick().await;
                }
            })
        });

        self.scheduler
            .add_job(&self.job_name, self.interval, job, true)?;
        self.enabled.store(true, Ordering::SeqCst);
        info!(
            job_name = %self.job_name,
            interval_secs = self.interval.as_secs(),
            "Automation enabled"
        );
        Ok(())
    }

    /// Remove the cycle job. Disabling twice (or before any enable) is fine.
    pub fn disable(&self) {
        let _toggle = self.toggle_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.enabled.store(false, Ordering::SeqCst);
        match self.scheduler.remove_job(&self.job_name) {
            Ok(()) => info!(job_name = %self.job_name, "Automation disabled"),
            Err(SchedulerError::JobNotFound(_)) => {
                warn!(job_name = %self.job_name, "Automation disabled, no job was scheduled");
            }
            Err(e) => warn!(job_name = %self.job_name, error = %e, "Failed to remove job"),
        }
    }

    /// Operator toggle.
    pub fn set_enabled(self: &Arc<Self>, enabled: bool) -> Result<ToggleState, SchedulerError> {
        if enabled {
            self.enable()?;
        } else {
            self.disable();
        }
        Ok(self.get_state())
    }

    /// One scheduled firing. Skips if a cycle is already running.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(guard) = Arc::clone(&self.cycle_guard).try_lock_owned() else {
            self.ledger().skipped += 1;
            warn!(job_name = %self.job_name, "Previous cycle still running, skipping tick");
            return TickOutcome::Skipped;
        };
        match self.spawn_cycle(guard).await {
            Ok(_) => TickOutcome::Completed,
            Err(_) => TickOutcome::Failed,
        }
    }

    /// Run a cycle now, waiting for any in-flight cycle to finish first.
    pub async fn run_now(&self) -> Result<CycleReport, PipelineError> {
        let guard = Arc::clone(&self.cycle_guard).lock_owned().await;
        self.spawn_cycle(guard).await
    }

    /// Forward-only run for the dashboard, serialized with full cycles.
    pub async fn run_forward_now(&self) -> Result<QualityPredictions, PipelineError> {
        let guard = Arc::clone(&self.cycle_guard).lock_owned().await;
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let result = runner.run_forward().await;
            drop(guard);
            result
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
    }

    /// The cycle runs on its own task and keeps `guard` until it ends, even
    /// if the caller is dropped mid-cycle.
    async fn spawn_cycle(
        &self,
        guard: OwnedMutexGuard<()>,
    ) -> Result<CycleReport, PipelineError> {
        let runner = Arc::clone(&self.runner);
        let ledger = Arc::clone(&self.ledger);
        tokio::spawn(async move {
            let result = runner.run_cycle().await;
            record(&ledger, &result);
            drop(guard);
            result
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
    }

    pub fn latest(&self) -> AutomationStatus {
        let ledger = self.ledger();
        AutomationStatus {
            enabled: self.enabled.load(Ordering::SeqCst),
            job_name: self.job_name.clone(),
            interval_secs: self.interval.as_secs(),
            scheduled_jobs: self.scheduler.job_ids(),
            cycles_completed: ledger.completed,
            cycles_failed: ledger.failed,
            ticks_skipped: ledger.skipped,
            last_report: ledger.last_report.clone(),
            last_error: ledger.last_error.as_ref().map(|(m, _)| m.clone()),
            last_error_at: ledger.last_error.as_ref().map(|(_, at)| *at),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Stop the scheduler and mark automation disabled.
    pub fn shutdown(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.scheduler.shutdown();
    }

    fn ledger(&self) -> MutexGuard<'_, CycleLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record(ledger: &Mutex<CycleLedger>, result: &Result<CycleReport, PipelineError>) {
    let mut ledger = ledger.lock().unwrap_or_else(PoisonError::into_inner);
    match result {
        Ok(report) => {
            ledger.completed += 1;
            ledger.last_report = Some(report.clone());
            info!(
                elongation = report.predictions.elongation,
                uts = report.predictions.uts,
                conductivity = report.predictions.conductivity,
                recommended = report.prediction.len(),
                "Prediction cycle complete"
            );
        }
        Err(e) => {
            ledger.failed += 1;
            ledger.last_error = Some((e.to_string(), Utc::now()));
            error!(code = e.code(), error = %e, "Prediction cycle failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QualityPredictions;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn report() -> CycleReport {
        CycleReport {
            predictions: QualityPredictions {
                elongation: 12.3,
                uts: 210.5,
                conductivity: 58.9,
            },
            differences: BTreeMap::new(),
            original: BTreeMap::new(),
            prediction: BTreeMap::new(),
            completed_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct FakeRunner {
        calls: AtomicUsize,
        forward_calls: AtomicUsize,
        fail: bool,
        started: Notify,
        release: Option<Notify>,
    }

    #[async_trait]
    impl CycleRunner for FakeRunner {
        async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            if let Some(release) = &self.release {
                release.notified().await;
            }
            if self.fail {
                Err(PipelineError::Ingestion("source offline".to_string()))
            } else {
                Ok(report())
            }
        }

        async fn run_forward(&self) -> Result<QualityPredictions, PipelineError> {
            self.forward_calls.fetch_add(1, Ordering::SeqCst);
            Ok(report().predictions)
        }
    }

    fn controller(runner: Arc<FakeRunner>) -> Arc<AutomationController> {
        AutomationController::new(
            Arc::new(IntervalScheduler::new()),
            runner,
            Duration::from_secs(10),
            "final_prediction_job",
        )
    }

    #[tokio::test]
    async fn test_enable_twice_leaves_one_job() {
        let c = controller(Arc::new(FakeRunner::default()));
        c.enable().unwrap();
        c.enable().unwrap();
        assert!(c.get_state().enabled);
        assert_eq!(c.latest().scheduled_jobs, vec!["final_prediction_job".to_string()]);
    }

    #[tokio::test]
    async fn test_disable_without_enable_is_ok() {
        let c = controller(Arc::new(FakeRunner::default()));
        c.disable();
        c.disable();
        assert!(!c.get_state().enabled);
        assert!(c.latest().scheduled_jobs.is_empty());
    }

    #[tokio::test]
    async fn test_set_enabled_round_trip() {
        let c = controller(Arc::new(FakeRunner::default()));
        assert!(c.set_enabled(true).unwrap().enabled);
        assert!(!c.set_enabled(false).unwrap().enabled);
        assert!(c.latest().scheduled_jobs.is_empty());
    }

    #[tokio::test]
    async fn test_tick_skips_while_cycle_in_flight() {
        let runner = Arc::new(FakeRunner {
            release: Some(Notify::new()),
            ..FakeRunner::default()
        });
        let c = controller(Arc::clone(&runner));

        let in_flight = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.run_now().await })
        };
        runner.started.notified().await;

        assert_eq!(c.tick().await, TickOutcome::Skipped);
        assert_eq!(c.latest().ticks_skipped, 1);

        runner.release.as_ref().unwrap().notify_one();
        assert!(in_flight.await.unwrap().is_ok());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.latest().cycles_completed, 1);
    }

    #[tokio::test]
    async fn test_dropped_run_now_keeps_guard_until_cycle_ends() {
        let runner = Arc::new(FakeRunner {
            release: Some(Notify::new()),
            ..FakeRunner::default()
        });
        let c = controller(Arc::clone(&runner));
        let release = runner.release.as_ref().unwrap();

        let abandoned = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.run_now().await })
        };
        runner.started.notified().await;
        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());

        // The abandoned cycle is still running and still owns the guard
        assert_eq!(c.tick().await, TickOutcome::Skipped);
        let next = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.run_now().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

        release.notify_one();
        runner.started.notified().await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
        release.notify_one();
        assert!(next.await.unwrap().is_ok());
        assert_eq!(c.latest().cycles_completed, 2);
    }

    #[tokio::test]
    async fn test_forward_run_waits_for_cycle() {
        let runner = Arc::new(FakeRunner {
            release: Some(Notify::new()),
            ..FakeRunner::default()
        });
        let c = controller(Arc::clone(&runner));

        let cycle = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.run_now().await })
        };
        runner.started.notified().await;

        let forward = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.run_forward_now().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!forward.is_finished());
        assert_eq!(runner.forward_calls.load(Ordering::SeqCst), 0);

        runner.release.as_ref().unwrap().notify_one();
        assert!(cycle.await.unwrap().is_ok());
        assert_eq!(forward.await.unwrap().unwrap().uts, 210.5);
        assert_eq!(runner.forward_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_is_recorded() {
        let runner = Arc::new(FakeRunner {
            fail: true,
            ..FakeRunner::default()
        });
        let c = controller(runner);
        assert_eq!(c.tick().await, TickOutcome::Failed);
        let status = c.latest();
        assert_eq!(status.cycles_failed, 1);
        assert!(status.last_error.unwrap().contains("source offline"));
        assert!(status.last_report.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_keeps_firing_after_failures() {
        let runner = Arc::new(FakeRunner {
            fail: true,
            ..FakeRunner::default()
        });
        let c = controller(Arc::clone(&runner));
        c.enable().unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(c.latest().cycles_failed, 3);
        assert!(c.get_state().enabled);

        c.disable();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    }
}
