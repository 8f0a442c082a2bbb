//! Records read from the measurement store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physical placement of a station, used only for topic routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub state: String,
    pub country: String,
}

impl Location {
    pub fn new(
        city: impl Into<String>,
        state: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
            country: country.into(),
        }
    }
}

/// Source of readings, owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: i64,
    /// Owning user; absent when the station was never fully set up
    #[serde(default)]
    pub owner_user: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Station {
    pub fn new(id: i64, owner_user: impl Into<String>, location: Location) -> Self {
        Self {
            id,
            owner_user: Some(owner_user.into()),
            location: Some(location),
        }
    }
}

/// Measurement kind with its configured bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementDefinition {
    pub name: String,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
}

impl MeasurementDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_value: None,
            max_value: None,
        }
    }

    pub fn with_bounds(mut self, min_value: f64, max_value: f64) -> Self {
        self.min_value = Some(min_value);
        self.max_value = Some(max_value);
        self
    }

    /// Lower bound, 0 when unset
    pub fn min_or_zero(&self) -> f64 {
        self.min_value.unwrap_or(0.0)
    }

    /// Upper bound, 0 when unset
    pub fn max_or_zero(&self) -> f64 {
        self.max_value.unwrap_or(0.0)
    }
}

/// A single stored reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: i64,
    pub measurement: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Reading {
    pub fn new(
        station_id: i64,
        measurement: impl Into<String>,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Self {
        Self {
            station_id,
            measurement: measurement.into(),
            timestamp,
            value,
        }
    }
}

/// Reading joined with its station and measurement metadata.
///
/// This is the flat projection every reader returns. Owner and location are
/// optional because the related records may be missing for a station that
/// was only partially configured.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRow {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub station_id: i64,
    pub measurement: MeasurementDefinition,
    pub owner_user: Option<String>,
    pub location: Option<Location>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_bounds_default_to_zero() {
        let def = MeasurementDefinition::new("humidity");
        assert_eq!(def.min_or_zero(), 0.0);
        assert_eq!(def.max_or_zero(), 0.0);

        let def = def.with_bounds(10.0, 40.0);
        assert_eq!(def.min_or_zero(), 10.0);
        assert_eq!(def.max_or_zero(), 40.0);
    }

    #[test]
    fn test_station_deserialize_without_metadata() {
        let station: Station = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(station.id, 7);
        assert!(station.owner_user.is_none());
        assert!(station.location.is_none());
    }
}
