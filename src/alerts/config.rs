//! Scheduled job definitions

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::policy::{BoundsPolicy, Policy, VariationPolicy};

/// Default interval between two runs of a job
pub const DEFAULT_JOB_INTERVAL: Duration = Duration::from_secs(60);

/// Evaluation job run by the scheduler
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Policy evaluated on each run
    pub policy: Policy,
    /// Run interval
    #[serde(default = "default_interval", with = "duration_serde")]
    pub interval: Duration,
    /// Whether the job is scheduled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Current state
    #[serde(skip)]
    pub state: JobState,
}

fn default_interval() -> Duration {
    DEFAULT_JOB_INTERVAL
}

fn default_enabled() -> bool {
    true
}

impl Job {
    /// Create a new enabled job running every minute
    pub fn new(id: impl Into<String>, name: impl Into<String>, policy: Policy) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            policy,
            interval: DEFAULT_JOB_INTERVAL,
            enabled: true,
            state: JobState::default(),
        }
    }

    /// Variation check on the default measurement
    pub fn variation(policy: VariationPolicy) -> Self {
        Self::new("variation", "Measurement variation", Policy::Variation(policy))
    }

    /// Bounds check over every measurement; disabled unless enabled explicitly
    pub fn bounds(policy: BoundsPolicy) -> Self {
        Self::new("bounds", "Measurement bounds", Policy::Bounds(policy)).with_enabled(false)
    }

    /// Set run interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set enabled state
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Runtime state of a job, kept in memory only
#[derive(Debug, Clone, Default)]
pub struct JobState {
    /// Last run timestamp (unix millis)
    pub last_checked: Option<i64>,
    /// Last run that published at least one verdict (unix millis)
    pub last_published: Option<i64>,
    /// Verdicts published by the last run
    pub verdicts_sent: u32,
    /// Runs in a row that ended with an error
    pub consecutive_failures: u32,
    /// Last error message
    pub last_error: Option<String>,
}

/// Load job definitions from a JSON file holding an array of jobs.
///
/// Omitted fields take the builder defaults: enabled, every minute, and the
/// policy's default window, measurement and threshold.
pub fn load_jobs(path: impl AsRef<Path>) -> Result<Vec<Job>, JobsFileError> {
    let bytes = std::fs::read(path.as_ref())?;
    let jobs: Vec<Job> = serde_json::from_slice(&bytes)?;

    let mut seen = HashSet::new();
    for job in &jobs {
        if !seen.insert(job.id.as_str()) {
            return Err(JobsFileError::DuplicateId(job.id.clone()));
        }
        if job.interval.is_zero() {
            return Err(JobsFileError::ZeroInterval(job.id.clone()));
        }
    }

    tracing::info!(
        path = %path.as_ref().display(),
        jobs = jobs.len(),
        "Loaded job definitions"
    );
    Ok(jobs)
}

/// Jobs file errors
#[derive(Debug, thiserror::Error)]
pub enum JobsFileError {
    #[error("Jobs file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Jobs file parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate job ID '{0}'")]
    DuplicateId(String),

    #[error("Job '{0}' has a zero interval")]
    ZeroInterval(String),
}

/// `{"secs": 60, "nanos": 0}` duration fields
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    struct DurationHelper {
        secs: u64,
        #[serde(default)]
        nanos: u32,
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let helper = DurationHelper::deserialize(deserializer)?;
        Ok(Duration::new(helper.secs, helper.nanos))
    }
}
