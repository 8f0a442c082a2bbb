//! In-memory measurement store
//!
//! Holds stations, measurement definitions and readings behind a single lock.
//! Used by tests and by the binary when it runs against a JSON fixture
//! instead of a database.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{check_since, MeasurementReader, StoreError};
use crate::data::{MeasurementDefinition, Reading, Station, WindowRow};

/// Serialized store contents
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub stations: Vec<Station>,
    #[serde(default)]
    pub measurements: Vec<MeasurementDefinition>,
    #[serde(default)]
    pub readings: Vec<Reading>,
}

#[derive(Debug, Default)]
struct Inner {
    stations: HashMap<i64, Station>,
    measurements: HashMap<String, MeasurementDefinition>,
    readings: Vec<Reading>,
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from snapshot contents
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        for station in snapshot.stations {
            store.upsert_station(station);
        }
        for definition in snapshot.measurements {
            store.define_measurement(definition);
        }
        for reading in snapshot.readings {
            store.insert_reading(reading);
        }
        store
    }

    /// Load a JSON snapshot file
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;

        tracing::info!(
            path = %path.as_ref().display(),
            stations = snapshot.stations.len(),
            measurements = snapshot.measurements.len(),
            readings = snapshot.readings.len(),
            "Loaded measurement snapshot"
        );

        Ok(Self::from_snapshot(snapshot))
    }

    /// Insert or replace a station
    pub fn upsert_station(&self, station: Station) {
        self.inner.write().stations.insert(station.id, station);
    }

    /// Insert or replace a measurement definition
    pub fn define_measurement(&self, definition: MeasurementDefinition) {
        self.inner
            .write()
            .measurements
            .insert(definition.name.clone(), definition);
    }

    /// Append a reading
    pub fn insert_reading(&self, reading: Reading) {
        self.inner.write().readings.push(reading);
    }

    /// Number of stored readings
    pub fn len(&self) -> usize {
        self.inner.read().readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn window(
        &self,
        measurement: Option<&str>,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WindowRow>, StoreError> {
        check_since(since, now)?;

        let inner = self.inner.read();
        let mut readings: Vec<&Reading> = inner
            .readings
            .iter()
            .filter(|r| r.timestamp >= since && r.timestamp <= now)
            .filter(|r| measurement.map_or(true, |m| r.measurement == m))
            .collect();
        readings.sort_by_key(|r| r.timestamp);

        readings
            .into_iter()
            .map(|reading| {
                let definition = inner
                    .measurements
                    .get(&reading.measurement)
                    .cloned()
                    .ok_or_else(|| StoreError::UnknownMeasurement(reading.measurement.clone()))?;
                let station = inner.stations.get(&reading.station_id);

                Ok(WindowRow {
                    timestamp: reading.timestamp,
                    value: reading.value,
                    station_id: reading.station_id,
                    measurement: definition,
                    owner_user: station.and_then(|s| s.owner_user.clone()),
                    location: station.and_then(|s| s.location.clone()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl MeasurementReader for MemoryStore {
    async fn fetch_window(
        &self,
        measurement: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<WindowRow>, StoreError> {
        self.window(measurement, since, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Location;
    use chrono::Duration;
    use std::io::Write;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_station(Station::new(
            1,
            "user1",
            Location::new("MED", "ANT", "CO"),
        ));
        store.define_measurement(MeasurementDefinition::new("temperature").with_bounds(10.0, 40.0));
        store.define_measurement(MeasurementDefinition::new("humidity"));
        store
    }

    #[test]
    fn test_window_is_ordered_and_scoped() {
        let store = seeded();
        let now = Utc::now();

        store.insert_reading(Reading::new(1, "temperature", now - Duration::minutes(5), 22.0));
        store.insert_reading(Reading::new(1, "temperature", now - Duration::minutes(20), 20.0));
        store.insert_reading(Reading::new(1, "humidity", now - Duration::minutes(10), 60.0));
        store.insert_reading(Reading::new(1, "temperature", now - Duration::hours(3), 5.0));

        let rows = store
            .window(Some("temperature"), now - Duration::hours(1), now)
            .unwrap();
        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![20.0, 22.0]);
        assert_eq!(rows[0].owner_user.as_deref(), Some("user1"));
        assert_eq!(rows[0].measurement.max_value, Some(40.0));

        let all = store.window(None, now - Duration::hours(1), now).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_empty_window_is_not_an_error() {
        let store = seeded();
        let now = Utc::now();
        let rows = store
            .window(Some("temperature"), now - Duration::hours(1), now)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_future_window_rejected() {
        let store = seeded();
        let now = Utc::now();
        let result = store.window(None, now + Duration::minutes(1), now);
        assert!(matches!(result, Err(StoreError::FutureWindow(_))));
    }

    #[test]
    fn test_unknown_station_yields_missing_metadata() {
        let store = seeded();
        let now = Utc::now();
        store.insert_reading(Reading::new(99, "temperature", now - Duration::minutes(1), 21.0));

        let rows = store.window(None, now - Duration::hours(1), now).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].owner_user.is_none());
        assert!(rows[0].location.is_none());
    }

    #[test]
    fn test_undefined_measurement_is_an_error() {
        let store = seeded();
        let now = Utc::now();
        store.insert_reading(Reading::new(1, "pressure", now - Duration::minutes(1), 1013.0));

        let result = store.window(None, now - Duration::hours(1), now);
        assert!(matches!(result, Err(StoreError::UnknownMeasurement(name)) if name == "pressure"));
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let ts = (Utc::now() - Duration::minutes(2)).to_rfc3339();
        let json = format!(
            r#"{{
                "stations": [{{"id": 1, "owner_user": "user1",
                    "location": {{"city": "MED", "state": "ANT", "country": "CO"}}}}],
                "measurements": [{{"name": "temperature", "min_value": 10.0, "max_value": 40.0}}],
                "readings": [{{"station_id": 1, "measurement": "temperature",
                    "timestamp": "{ts}", "value": 21.5}}]
            }}"#
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let store = MemoryStore::load_snapshot(file.path()).unwrap();
        assert_eq!(store.len(), 1);

        let rows = store
            .fetch_window(Some("temperature"), Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 21.5);
        assert_eq!(rows[0].location.as_ref().unwrap().country, "CO");
    }

    #[test]
    fn test_load_snapshot_missing_file() {
        let result = MemoryStore::load_snapshot("/nonexistent/snapshot.json");
        assert!(matches!(result, Err(StoreError::SnapshotIo(_))));
    }
}
