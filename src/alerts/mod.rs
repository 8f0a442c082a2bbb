//! Alert evaluation and scheduling
//!
//! Jobs read a trailing window of readings, reduce it, evaluate a policy and
//! publish the resulting verdicts on per-station topics.

pub mod aggregate;
pub mod checker;
pub mod config;
pub mod notifier;
pub mod policy;
pub mod topic;

pub use aggregate::{mean, variation, EvaluationWindow, WindowAccumulator};
pub use checker::{AlertChecker, CheckError, RunReport};
pub use config::{load_jobs, Job, JobState, JobsFileError};
pub use notifier::{Notifier, NotifierError};
pub use policy::{BoundsPolicy, Evaluation, Policy, VariationPolicy, Verdict, VerdictKind};
pub use topic::{build_topic, Route};
