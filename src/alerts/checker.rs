//! Background job scheduler
//!
//! Wakes at a fixed resolution, picks the enabled jobs whose interval has
//! elapsed and runs them one after another. A run is awaited to completion
//! before the next wake, so two ticks never overlap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};

use super::config::Job;
use super::notifier::Notifier;
use super::policy::Evaluation;
use crate::storage::{MeasurementReader, StoreError};

/// Default wake resolution of the scheduler loop
pub const DEFAULT_RESOLUTION: Duration = Duration::from_secs(1);

/// Result of one job run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub evaluation: Evaluation,
    /// Verdicts that reached the broker
    pub sent: usize,
}

/// Background job scheduler
pub struct AlertChecker {
    /// Registered jobs
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    /// Source of measurement windows
    reader: Arc<dyn MeasurementReader>,
    /// Verdict delivery
    notifier: Arc<Notifier>,
    /// Last run instant per job ID
    last_runs: Arc<Mutex<HashMap<String, Instant>>>,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl AlertChecker {
    /// Create a new scheduler
    pub fn new(reader: Arc<dyn MeasurementReader>, notifier: Arc<Notifier>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            reader,
            notifier,
            last_runs: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx: None,
        }
    }

    /// Register a job
    pub fn register(&self, job: Job) {
        let mut jobs = self.jobs.write();
        jobs.insert(job.id.clone(), job);
    }

    /// Unregister a job
    pub fn unregister(&self, id: &str) -> Option<Job> {
        let mut jobs = self.jobs.write();
        jobs.remove(id)
    }

    /// Get a job by ID
    pub fn get(&self, id: &str) -> Option<Job> {
        let jobs = self.jobs.read();
        jobs.get(id).cloned()
    }

    /// List all jobs
    pub fn list(&self) -> Vec<Job> {
        let jobs = self.jobs.read();
        jobs.values().cloned().collect()
    }

    /// Enable/disable a job
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(id) {
            job.enabled = enabled;
            true
        } else {
            false
        }
    }

    /// Start the scheduler loop
    pub fn start(&mut self, resolution: Duration) -> tokio::task::JoinHandle<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let jobs = Arc::clone(&self.jobs);
        let reader = Arc::clone(&self.reader);
        let notifier = Arc::clone(&self.notifier);
        let last_runs = Arc::clone(&self.last_runs);

        tokio::spawn(async move {
            tracing::info!(resolution = ?resolution, "Scheduler started");

            let mut ticker = interval(resolution);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut last_runs = last_runs.lock().await;
                        Self::run_due(&jobs, reader.as_ref(), &notifier, &mut last_runs).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the scheduler loop
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Run one scheduler wake: every enabled job whose interval has elapsed.
    /// Returns the IDs that ran.
    pub async fn run_pending(&self) -> Vec<String> {
        let mut last_runs = self.last_runs.lock().await;
        Self::run_due(&self.jobs, self.reader.as_ref(), &self.notifier, &mut last_runs).await
    }

    /// Run a registered job immediately, regardless of its schedule
    pub async fn run_now(&self, id: &str) -> Option<Result<RunReport, CheckError>> {
        let job = self.get(id)?;
        let result = Self::run_job(&job, self.reader.as_ref(), &self.notifier).await;
        Self::record(&self.jobs, &job.id, &result);
        Some(result)
    }

    async fn run_due(
        jobs: &Arc<RwLock<HashMap<String, Job>>>,
        reader: &dyn MeasurementReader,
        notifier: &Notifier,
        last_runs: &mut HashMap<String, Instant>,
    ) -> Vec<String> {
        // Get jobs that are due
        let mut due: Vec<Job> = {
            let jobs = jobs.read();
            jobs.values()
                .filter(|j| {
                    if !j.enabled {
                        return false;
                    }
                    last_runs
                        .get(&j.id)
                        .map(|t| t.elapsed() >= j.interval)
                        .unwrap_or(true)
                })
                .cloned()
                .collect()
        };
        due.sort_by(|a, b| a.id.cmp(&b.id));

        let mut ran = Vec::with_capacity(due.len());
        for job in due {
            last_runs.insert(job.id.clone(), Instant::now());

            let result = Self::run_job(&job, reader, notifier).await;
            Self::record(jobs, &job.id, &result);
            ran.push(job.id);
        }
        ran
    }

    /// Fetch, evaluate and publish for one job
    async fn run_job(
        job: &Job,
        reader: &dyn MeasurementReader,
        notifier: &Notifier,
    ) -> Result<RunReport, CheckError> {
        tracing::info!(job_id = %job.id, policy = job.policy.name(), "Running evaluation");

        let window = job.policy.window();
        let lookback =
            chrono::Duration::from_std(window).map_err(|_| CheckError::InvalidWindow(window))?;
        let since = Utc::now()
            .checked_sub_signed(lookback)
            .ok_or(CheckError::InvalidWindow(window))?;

        let rows = reader.fetch_window(job.policy.measurement(), since).await?;
        let evaluation = job.policy.evaluate(&rows);

        let sent = match notifier.notify(&job.id, &evaluation.verdicts).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    error = %e,
                    "Failed to send notifications"
                );
                evaluation.verdicts.len().saturating_sub(e.failures())
            }
        };

        tracing::info!(
            job_id = %job.id,
            rows = rows.len(),
            checked = evaluation.groups_checked,
            skipped = evaluation.groups_skipped,
            alerts = evaluation.alerts(),
            sent,
            "Evaluation complete"
        );

        Ok(RunReport { evaluation, sent })
    }

    /// Update job state after a run
    fn record(
        jobs: &Arc<RwLock<HashMap<String, Job>>>,
        job_id: &str,
        result: &Result<RunReport, CheckError>,
    ) {
        let mut jobs = jobs.write();
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };

        let now = Utc::now().timestamp_millis();
        job.state.last_checked = Some(now);

        match result {
            Ok(report) => {
                job.state.last_error = None;
                job.state.consecutive_failures = 0;
                job.state.verdicts_sent = report.sent as u32;
                if report.sent > 0 {
                    job.state.last_published = Some(now);
                }
            }
            Err(e) => {
                job.state.last_error = Some(e.to_string());
                job.state.consecutive_failures += 1;
                job.state.verdicts_sent = 0;
                tracing::error!(
                    job_id = %job_id,
                    error = %e,
                    "Evaluation failed"
                );
            }
        }
    }
}

/// Job run errors
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Window {0:?} is out of range")]
    InvalidWindow(Duration),
}
