//! Interval job scheduler.
//!
//! One tokio task per named job, each with its own cancellation token. The
//! first firing happens one period after the job is added.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Work executed on every firing.
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Job already exists: {0}")]
    JobExists(String),

    #[error("No job found with id {0}")]
    JobNotFound(String),

    #[error("Invalid interval for job {0}: must be non-zero")]
    InvalidInterval(String),
}

/// Scheduling capability injected into the automation controller.
pub trait JobScheduler: Send + Sync {
    fn start(&self);

    fn is_running(&self) -> bool;

    /// Install `job` under `id`, firing every `every`.
    ///
    /// With `replace_existing` an existing job of the same id is stopped
    /// and replaced; without it the call fails with `JobExists`.
    fn add_job(
        &self,
        id: &str,
        every: Duration,
        job: Job,
        replace_existing: bool,
    ) -> Result<(), SchedulerError>;

    fn remove_job(&self, id: &str) -> Result<(), SchedulerError>;

    fn job_ids(&self) -> Vec<String>;

    /// Stop every job and refuse new ones until `start()`.
    fn shutdown(&self);
}

/// Tokio-backed [`JobScheduler`].
pub struct IntervalScheduler {
    running: AtomicBool,
    jobs: Mutex<HashMap<String, CancellationToken>>,
    /// Parent of every job token; cancelling it stops all jobs.
    root: CancellationToken,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::with_parent(CancellationToken::new())
    }

    /// Jobs stop when `parent` is cancelled (process shutdown).
    pub fn with_parent(parent: CancellationToken) -> Self {
        Self {
            running: AtomicBool::new(false),
            jobs: Mutex::new(HashMap::new()),
            root: parent.child_token(),
        }
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler for IntervalScheduler {
    fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Scheduler started");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.root.is_cancelled()
    }

    fn add_job(
        &self,
        id: &str,
        every: Duration,
        job: Job,
        replace_existing: bool,
    ) -> Result<(), SchedulerError> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }
        if every.is_zero() {
            return Err(SchedulerError::InvalidInterval(id.to_string()));
        }

        let token = self.root.child_token();
        {
            let mut jobs = self.jobs();
            if let Some(existing) = jobs.get(id) {
                if !replace_existing {
                    return Err(SchedulerError::JobExists(id.to_string()));
                }
                existing.cancel();
                debug!(job_id = %id, "Replacing existing job");
            }
            jobs.insert(id.to_string(), token.clone());
        }

        let job_id = id.to_string();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!(job_id = %job_id, "Job fired");
                        job().await;
                    }
                }
            }
            debug!(job_id = %job_id, "Job stopped");
        });

        info!(job_id = %id, interval_secs = every.as_secs_f64(), "Job scheduled");
        Ok(())
    }

    fn remove_job(&self, id: &str) -> Result<(), SchedulerError> {
        match self.jobs().remove(id) {
            Some(token) => {
                token.cancel();
                info!(job_id = %id, "Job removed");
                Ok(())
            }
            None => Err(SchedulerError::JobNotFound(id.to_string())),
        }
    }

    fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn shutdown(&self) {
        for (_, token) in self.jobs().drain() {
            token.cancel();
        }
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Scheduler shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(counter: Arc<AtomicUsize>) -> Job {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_add_requires_start() {
        let scheduler = IntervalScheduler::new();
        let job = counting_job(Arc::new(AtomicUsize::new(0)));
        assert_eq!(
            scheduler.add_job("j", Duration::from_secs(1), job, true),
            Err(SchedulerError::NotRunning)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_every_period() {
        let scheduler = IntervalScheduler::new();
        scheduler.start();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_job("j", Duration::from_secs(10), counting_job(Arc::clone(&counter)), true)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.remove_job("j").unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_replace_existing_keeps_one_job() {
        let scheduler = IntervalScheduler::new();
        scheduler.start();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            scheduler
                .add_job("j", Duration::from_secs(10), counting_job(Arc::clone(&counter)), true)
                .unwrap();
        }
        assert_eq!(scheduler.job_ids(), vec!["j".to_string()]);
        assert_eq!(
            scheduler.add_job("j", Duration::from_secs(10), counting_job(counter), false),
            Err(SchedulerError::JobExists("j".to_string()))
        );
    }

    #[tokio::test]
    async fn test_remove_unknown_job() {
        let scheduler = IntervalScheduler::new();
        assert_eq!(
            scheduler.remove_job("missing"),
            Err(SchedulerError::JobNotFound("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_parent_cancel_stops_scheduler() {
        let parent = CancellationToken::new();
        let scheduler = IntervalScheduler::with_parent(parent.clone());
        scheduler.start();
        assert!(scheduler.is_running());
        parent.cancel();
        assert!(!scheduler.is_running());
    }
}
