//! Sensor Monitor
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - MQTT_HOST / MQTT_PORT: Broker address (default: localhost:1883)
//! - MQTT_USER_PUB / MQTT_PASSWORD_PUB: Broker credentials; the user is also the client id
//! - MQTT_USE_TLS: Connect over TLS (default: false)
//! - MQTT_TLS_INSECURE: Skip certificate validation under TLS (default: true)
//! - CA_CRT_PATH: CA bundle used when certificates are validated
//! - MONITOR_TICK_SECS: Scheduler wake resolution (default: 1)
//! - MONITOR_JOB_INTERVAL_SECS: Interval of each job (default: 60)
//! - MONITOR_WINDOW_SECS: Lookback window (default: 3600)
//! - MONITOR_VARIATION_MEASUREMENT / MONITOR_VARIATION_THRESHOLD: Variation check (default: temperature / 1)
//! - MONITOR_VARIATION_ENABLED / MONITOR_BOUNDS_ENABLED: Scheduled jobs (default: true / false)
//! - MONITOR_JOBS_PATH: JSON job definitions replacing the built-in jobs
//! - MONITOR_SNAPSHOT_PATH: JSON fixture for the in-memory store
//! - DATABASE_URL: PostgreSQL source (requires the `postgres` feature)
//! - RUST_LOG: Log level (default: info)

use std::sync::Arc;

use sensor_monitor::alerts::{AlertChecker, Notifier};
use sensor_monitor::broker::{BrokerPublisher, MqttSession};
use sensor_monitor::storage::{MeasurementReader, MemoryStore, StoreError};
use sensor_monitor::MonitorConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensor_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env();

    tracing::info!("Sensor monitor configuration:");
    tracing::info!("  Broker: {}", config.broker.address());
    tracing::info!("  TLS: {}", config.broker.tls.is_some());
    tracing::info!("  Tick resolution: {:?}", config.tick_resolution);
    tracing::info!("  Job interval: {:?}", config.job_interval);
    tracing::info!("  Window: {:?}", config.window);
    tracing::info!(
        "  Variation: {} (threshold {}, enabled {})",
        config.variation_measurement,
        config.variation_threshold,
        config.variation_enabled
    );
    tracing::info!("  Bounds: enabled {}", config.bounds_enabled);

    let jobs = config.load_jobs()?;
    let reader = build_reader(&config).await?;

    // Broker connection; a failed first connect is retried by the supervisor
    let (session, events) = MqttSession::channel();
    let publisher = Arc::new(BrokerPublisher::new(config.broker.clone(), session));
    publisher.connect().await;
    let supervisor = Arc::clone(&publisher).watch(events);

    let mut checker = AlertChecker::new(reader, Arc::new(Notifier::new(publisher)));
    for job in jobs {
        tracing::info!(job_id = %job.id, enabled = job.enabled, "Registering job");
        checker.register(job);
    }

    let scheduler = checker.start(config.tick_resolution);
    tracing::info!("Monitor service started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping scheduler...");

    checker.stop().await;
    scheduler.await?;
    supervisor.abort();

    tracing::info!("Sensor monitor stopped");
    Ok(())
}

async fn build_reader(config: &MonitorConfig) -> Result<Arc<dyn MeasurementReader>, StoreError> {
    if let Some(reader) = database_reader(config).await? {
        return Ok(reader);
    }

    match &config.snapshot_path {
        Some(path) => Ok(Arc::new(MemoryStore::load_snapshot(path)?)),
        None => {
            tracing::warn!("No measurement source configured, using an empty in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(feature = "postgres")]
async fn database_reader(
    config: &MonitorConfig,
) -> Result<Option<Arc<dyn MeasurementReader>>, StoreError> {
    use sensor_monitor::storage::PgReader;

    match &config.database_url {
        Some(url) => {
            tracing::info!("  Source: PostgreSQL");
            let reader: Arc<dyn MeasurementReader> = Arc::new(PgReader::connect(url).await?);
            Ok(Some(reader))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "postgres"))]
async fn database_reader(
    config: &MonitorConfig,
) -> Result<Option<Arc<dyn MeasurementReader>>, StoreError> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the postgres feature is not enabled");
    }
    Ok(None)
}
