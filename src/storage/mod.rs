//! Read access to stored measurements
//!
//! The monitor never writes readings. It asks a [`MeasurementReader`] for the
//! rows of a trailing window and works on the returned projection.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data::WindowRow;

pub use memory::{MemoryStore, Snapshot};
#[cfg(feature = "postgres")]
pub use postgres::PgReader;

/// Query capability over the measurement store
#[async_trait]
pub trait MeasurementReader: Send + Sync {
    /// Fetch every reading with `timestamp >= since` up to now, ordered by
    /// timestamp ascending and joined with station and measurement metadata.
    ///
    /// `measurement` scopes the window to one kind; `None` returns all kinds.
    /// An empty window is `Ok(vec![])`.
    async fn fetch_window(
        &self,
        measurement: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<WindowRow>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Window start {0} is in the future")]
    FutureWindow(DateTime<Utc>),

    #[error("Measurement '{0}' is not defined")]
    UnknownMeasurement(String),

    #[error("Snapshot IO error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    #[error("Snapshot parse error: {0}")]
    SnapshotParse(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// Reject windows that start after `now`
pub(crate) fn check_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), StoreError> {
    if since > now {
        return Err(StoreError::FutureWindow(since));
    }
    Ok(())
}
