//! Process configuration read from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::alerts::checker::DEFAULT_RESOLUTION;
use crate::alerts::config::DEFAULT_JOB_INTERVAL;
use crate::alerts::policy::{
    DEFAULT_VARIATION_MEASUREMENT, DEFAULT_VARIATION_THRESHOLD, DEFAULT_WINDOW,
};
use crate::alerts::{load_jobs, BoundsPolicy, Job, JobsFileError, VariationPolicy};
use crate::broker::BrokerConfig;

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub broker: BrokerConfig,
    /// Scheduler wake resolution
    pub tick_resolution: Duration,
    /// Interval of each job
    pub job_interval: Duration,
    /// Lookback window of each job
    pub window: Duration,
    pub variation_measurement: String,
    pub variation_threshold: f64,
    pub variation_enabled: bool,
    pub bounds_enabled: bool,
    /// JSON job definitions replacing the two built-in jobs
    pub jobs_path: Option<PathBuf>,
    /// JSON fixture loaded into the in-memory store
    pub snapshot_path: Option<PathBuf>,
    /// PostgreSQL URL, used when built with the `postgres` feature
    pub database_url: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            tick_resolution: DEFAULT_RESOLUTION,
            job_interval: DEFAULT_JOB_INTERVAL,
            window: DEFAULT_WINDOW,
            variation_measurement: DEFAULT_VARIATION_MEASUREMENT.to_string(),
            variation_threshold: DEFAULT_VARIATION_THRESHOLD,
            variation_enabled: true,
            bounds_enabled: false,
            jobs_path: None,
            snapshot_path: None,
            database_url: None,
        }
    }
}

impl MonitorConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            broker: BrokerConfig::from_env(),
            tick_resolution: Duration::from_secs(
                env_or("MONITOR_TICK_SECS", defaults.tick_resolution.as_secs()).max(1),
            ),
            job_interval: Duration::from_secs(env_or(
                "MONITOR_JOB_INTERVAL_SECS",
                defaults.job_interval.as_secs(),
            )),
            window: Duration::from_secs(env_or("MONITOR_WINDOW_SECS", defaults.window.as_secs())),
            variation_measurement: std::env::var("MONITOR_VARIATION_MEASUREMENT")
                .unwrap_or(defaults.variation_measurement),
            variation_threshold: env_or("MONITOR_VARIATION_THRESHOLD", defaults.variation_threshold),
            variation_enabled: env_flag("MONITOR_VARIATION_ENABLED", defaults.variation_enabled),
            bounds_enabled: env_flag("MONITOR_BOUNDS_ENABLED", defaults.bounds_enabled),
            jobs_path: std::env::var("MONITOR_JOBS_PATH").ok().map(PathBuf::from),
            snapshot_path: std::env::var("MONITOR_SNAPSHOT_PATH").ok().map(PathBuf::from),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }

    /// Jobs to schedule: the jobs file when one is configured, otherwise
    /// [`MonitorConfig::jobs`]
    pub fn load_jobs(&self) -> Result<Vec<Job>, JobsFileError> {
        match &self.jobs_path {
            Some(path) => load_jobs(path),
            None => Ok(self.jobs()),
        }
    }

    /// Both built-in jobs, enabled according to the configuration
    pub fn jobs(&self) -> Vec<Job> {
        let variation = Job::variation(VariationPolicy {
            measurement: self.variation_measurement.clone(),
            threshold: self.variation_threshold,
            window: self.window,
        })
        .with_interval(self.job_interval)
        .with_enabled(self.variation_enabled);

        let bounds = Job::bounds(BoundsPolicy {
            window: self.window,
        })
        .with_interval(self.job_interval)
        .with_enabled(self.bounds_enabled);

        vec![variation, bounds]
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(std::env::var(key).ok().as_deref(), default)
}

/// Read a boolean flag (`true`/`1`/`yes`/`on`, case-insensitive)
pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    parse_flag(std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T: FromStr>(value: Option<&str>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Policy;

    #[test]
    fn test_parse_or() {
        assert_eq!(parse_or(Some("8883"), 1883u16), 8883);
        assert_eq!(parse_or(Some(" 2.5 "), 1.0f64), 2.5);
        assert_eq!(parse_or(Some("not-a-port"), 1883u16), 1883);
        assert_eq!(parse_or::<u16>(None, 1883), 1883);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("True"), false));
        assert!(parse_flag(Some("1"), false));
        assert!(!parse_flag(Some("off"), true));
        assert!(parse_flag(Some("maybe"), true));
        assert!(!parse_flag(None, false));
    }

    #[test]
    fn test_load_jobs_without_file_uses_builtin_jobs() {
        let jobs = MonitorConfig::default().load_jobs().unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["variation", "bounds"]);
    }

    #[test]
    fn test_load_jobs_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"id": "humidity-bounds", "policy": {"type": "Bounds"}}]"#)
            .unwrap();

        let config = MonitorConfig {
            jobs_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let jobs = config.load_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "humidity-bounds");
        assert!(jobs[0].enabled);
    }

    #[test]
    fn test_default_jobs() {
        let jobs = MonitorConfig::default().jobs();
        assert_eq!(jobs.len(), 2);

        let variation = &jobs[0];
        assert!(variation.enabled);
        assert_eq!(variation.interval, Duration::from_secs(60));
        match &variation.policy {
            Policy::Variation(p) => {
                assert_eq!(p.measurement, "temperature");
                assert_eq!(p.threshold, 1.0);
                assert_eq!(p.window, Duration::from_secs(3600));
            }
            other => panic!("unexpected policy {:?}", other),
        }

        let bounds = &jobs[1];
        assert!(!bounds.enabled);
        assert_eq!(bounds.policy.name(), "bounds");
    }
}
