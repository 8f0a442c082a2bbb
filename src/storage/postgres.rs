//! PostgreSQL reader over the `receiver_*` ingestion tables
//!
//! Enable with the `postgres` feature. Expects the schema written by the
//! ingestion service: `receiver_data` rows pointing at a station and a
//! measurement, stations pointing at an `auth_user` owner and a location
//! made of city/state/country rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{check_since, MeasurementReader, StoreError};
use crate::data::{Location, MeasurementDefinition, WindowRow};

/// Joined projection of one reading. Location parts are left-joined so an
/// incomplete station still comes back, with `NULL` metadata.
const WINDOW_QUERY: &str = "\
    SELECT d.base_time AS timestamp, d.avg_value AS value, \
           s.id::bigint AS station_id, \
           m.name AS measurement, m.min_value, m.max_value, \
           u.username AS owner_user, \
           ci.name AS city, st.name AS state, co.name AS country \
    FROM receiver_data d \
    JOIN receiver_measurement m ON m.id = d.measurement_id \
    JOIN receiver_station s ON s.id = d.station_id \
    LEFT JOIN auth_user u ON u.id = s.user_id \
    LEFT JOIN receiver_location l ON l.id = s.location_id \
    LEFT JOIN receiver_city ci ON ci.id = l.city_id \
    LEFT JOIN receiver_state st ON st.id = l.state_id \
    LEFT JOIN receiver_country co ON co.id = l.country_id \
    WHERE d.base_time >= $1 AND d.base_time <= $2 \
      AND ($3::text IS NULL OR m.name = $3) \
    ORDER BY d.base_time ASC";

#[derive(Debug, sqlx::FromRow)]
struct WindowRecord {
    timestamp: DateTime<Utc>,
    value: f64,
    station_id: i64,
    measurement: String,
    min_value: Option<f64>,
    max_value: Option<f64>,
    owner_user: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl From<WindowRecord> for WindowRow {
    fn from(record: WindowRecord) -> Self {
        let location = match (record.city, record.state, record.country) {
            (Some(city), Some(state), Some(country)) => Some(Location {
                city,
                state,
                country,
            }),
            _ => None,
        };

        WindowRow {
            timestamp: record.timestamp,
            value: record.value,
            station_id: record.station_id,
            measurement: MeasurementDefinition {
                name: record.measurement,
                min_value: record.min_value,
                max_value: record.max_value,
            },
            owner_user: record.owner_user,
            location,
        }
    }
}

/// Reader backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgReader {
    pool: PgPool,
}

impl PgReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool; the monitor issues one query per tick
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MeasurementReader for PgReader {
    async fn fetch_window(
        &self,
        measurement: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<WindowRow>, StoreError> {
        let now = Utc::now();
        check_since(since, now)?;

        let records = sqlx::query_as::<_, WindowRecord>(WINDOW_QUERY)
            .bind(since)
            .bind(now)
            .bind(measurement)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(records.into_iter().map(WindowRow::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_with_partial_location_drops_location() {
        let record = WindowRecord {
            timestamp: Utc::now(),
            value: 21.0,
            station_id: 3,
            measurement: "temperature".to_string(),
            min_value: None,
            max_value: Some(30.0),
            owner_user: Some("user1".to_string()),
            city: Some("MED".to_string()),
            state: None,
            country: Some("CO".to_string()),
        };

        let row = WindowRow::from(record);
        assert!(row.location.is_none());
        assert_eq!(row.owner_user.as_deref(), Some("user1"));
        assert_eq!(row.measurement.max_value, Some(30.0));
    }
}
