//! Sensor Monitor: periodic alerting over a measurement store
//!
//! Every minute the monitor reads a trailing window of sensor readings,
//! reduces it, evaluates threshold policies and publishes alert or clear
//! messages to an MQTT topic derived from the station's owner and location
//! (`country/state/city/user/in`).
//!
//! # Policies
//!
//! - **Bounds**: mean of each (station, measurement) group against the
//!   measurement's min/max. Alerts only; normal groups stay silent.
//! - **Variation**: `|last - first|` of one measurement against a fixed
//!   threshold. Always publishes, ALERT or NORMAL.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sensor_monitor::alerts::{AlertChecker, Job, Notifier, VariationPolicy};
//! use sensor_monitor::broker::{BrokerConfig, BrokerPublisher, MqttSession};
//! use sensor_monitor::storage::MemoryStore;
//!
//! # async fn run() {
//! let (session, events) = MqttSession::channel();
//! let publisher = Arc::new(BrokerPublisher::new(BrokerConfig::from_env(), session));
//! publisher.connect().await;
//! Arc::clone(&publisher).watch(events);
//!
//! let mut checker = AlertChecker::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(Notifier::new(publisher)),
//! );
//! checker.register(Job::variation(VariationPolicy::default()));
//! checker.start(std::time::Duration::from_secs(1)).await.unwrap();
//! # }
//! ```

pub mod alerts;
pub mod broker;
pub mod config;
pub mod data;
pub mod storage;

// Re-export commonly used types
pub use alerts::{AlertChecker, Job, Policy, Verdict, VerdictKind};
pub use broker::{BrokerConfig, BrokerError, BrokerPublisher, ConnectionState};
pub use config::MonitorConfig;
pub use data::{Location, MeasurementDefinition, Reading, Station, WindowRow};
pub use storage::{MeasurementReader, MemoryStore, StoreError};
