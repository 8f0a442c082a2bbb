//! Threshold evaluation policies
//!
//! A [`Policy`] turns one window of rows into zero or more [`Verdict`]s.
//! Evaluation is a pure function of the rows: the same window always yields
//! the same verdicts.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::aggregate::WindowAccumulator;
use super::config::duration_serde;
use super::topic::Route;
use crate::data::WindowRow;

/// Default lookback for both policies
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Measurement watched by the variation policy unless configured otherwise
pub const DEFAULT_VARIATION_MEASUREMENT: &str = "temperature";

/// Maximum tolerated `|last - first|`, in the unit of the measurement
pub const DEFAULT_VARIATION_THRESHOLD: f64 = 1.0;

/// Outcome kind of a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictKind {
    Alert,
    Normal,
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictKind::Alert => write!(f, "ALERT"),
            VerdictKind::Normal => write!(f, "NORMAL"),
        }
    }
}

/// Message ready to publish
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub message: String,
    pub topic: String,
    /// Measurement the verdict is about
    pub variable: String,
}

/// Result of evaluating one window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub verdicts: Vec<Verdict>,
    /// Groups (station/measurement pairs or stations) looked at
    pub groups_checked: usize,
    /// Groups dropped because their station has no owner or location
    pub groups_skipped: usize,
}

impl Evaluation {
    pub fn alerts(&self) -> usize {
        self.verdicts
            .iter()
            .filter(|v| v.kind == VerdictKind::Alert)
            .count()
    }
}

/// Float rendering used in published messages: `10.0`, `0.3`, `1e+16`, `1e-05`
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let scientific = format!("{:e}", value);
        let Some((mantissa, exponent)) = scientific.split_once('e') else {
            return scientific;
        };
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Configured bound as published; an unset bound renders as a bare `0`
fn format_bound(bound: Option<f64>) -> String {
    bound.map_or_else(|| "0".to_string(), format_number)
}

/// Mean of each (station, measurement) group against the measurement bounds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoundsPolicy {
    #[serde(with = "duration_serde")]
    pub window: Duration,
}

impl Default for BoundsPolicy {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl BoundsPolicy {
    /// Alert when the mean leaves `[min, max]`. Normal groups stay silent.
    ///
    /// Unset bounds count as 0, so a group with no configured maximum alerts
    /// on any positive mean.
    pub fn evaluate(&self, rows: &[WindowRow]) -> Evaluation {
        let mut groups: BTreeMap<(i64, &str), (WindowAccumulator, &WindowRow)> = BTreeMap::new();
        for row in rows {
            let entry = groups
                .entry((row.station_id, row.measurement.name.as_str()))
                .or_insert_with(|| (WindowAccumulator::new(), row));
            entry.0.accumulate(row.value);
            entry.1 = row;
        }

        let mut evaluation = Evaluation::default();
        for ((station_id, variable), (acc, latest)) in groups {
            evaluation.groups_checked += 1;

            let Some(check_value) = acc.mean() else {
                continue;
            };
            let min_value = latest.measurement.min_or_zero();
            let max_value = latest.measurement.max_or_zero();

            if check_value <= max_value && check_value >= min_value {
                continue;
            }

            let Some(route) = Route::from_row(latest) else {
                tracing::warn!(
                    station_id,
                    variable,
                    "Station has no owner or location, skipping alert"
                );
                evaluation.groups_skipped += 1;
                continue;
            };

            evaluation.verdicts.push(Verdict {
                kind: VerdictKind::Alert,
                message: format!(
                    "ALERT {} {} {}",
                    variable,
                    format_bound(latest.measurement.min_value),
                    format_bound(latest.measurement.max_value)
                ),
                topic: route.topic(),
                variable: variable.to_string(),
            });
        }

        evaluation
    }
}

/// Change between the first and last reading of one measurement
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VariationPolicy {
    pub measurement: String,
    pub threshold: f64,
    #[serde(with = "duration_serde")]
    pub window: Duration,
}

impl Default for VariationPolicy {
    fn default() -> Self {
        Self {
            measurement: DEFAULT_VARIATION_MEASUREMENT.to_string(),
            threshold: DEFAULT_VARIATION_THRESHOLD,
            window: DEFAULT_WINDOW,
        }
    }
}

impl VariationPolicy {
    /// One verdict per station: ALERT above the threshold, NORMAL otherwise.
    ///
    /// The variable name and the topic come from the station's most recent
    /// row. An empty window produces nothing.
    pub fn evaluate(&self, rows: &[WindowRow]) -> Evaluation {
        let mut stations: BTreeMap<i64, Vec<&WindowRow>> = BTreeMap::new();
        for row in rows.iter().filter(|r| r.measurement.name == self.measurement) {
            stations.entry(row.station_id).or_default().push(row);
        }

        let mut evaluation = Evaluation::default();
        if stations.is_empty() {
            tracing::info!(
                measurement = %self.measurement,
                "Insufficient data to analyze variation"
            );
            return evaluation;
        }

        for (station_id, mut station_rows) in stations {
            evaluation.groups_checked += 1;
            station_rows.sort_by_key(|r| r.timestamp);

            let acc: WindowAccumulator = station_rows.iter().map(|r| r.value).collect();
            let (Some(variation), Some(latest)) = (acc.variation(), station_rows.last()) else {
                continue;
            };

            let Some(route) = Route::from_row(latest) else {
                tracing::warn!(
                    station_id,
                    measurement = %self.measurement,
                    "Station has no owner or location, skipping variation check"
                );
                evaluation.groups_skipped += 1;
                continue;
            };

            let variable = &latest.measurement.name;
            tracing::debug!(
                station_id,
                variable = %variable,
                variation,
                "Variation over window"
            );

            let (kind, message) = if variation > self.threshold {
                (
                    VerdictKind::Alert,
                    format!(
                        "ALERT: Variación de {} ha excedido el límite de fluctuación de {} °C. Variación actual: {}°C",
                        variable,
                        format_number(self.threshold),
                        format_number(variation)
                    ),
                )
            } else {
                (
                    VerdictKind::Normal,
                    format!(
                        "NORMAL: Variación de {} se ha reestablecido. Variación actual: {}°C",
                        variable,
                        format_number(variation)
                    ),
                )
            };

            evaluation.verdicts.push(Verdict {
                kind,
                message,
                topic: route.topic(),
                variable: variable.clone(),
            });
        }

        evaluation
    }
}

/// Evaluation policy selected per job
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Policy {
    Bounds(BoundsPolicy),
    Variation(VariationPolicy),
}

impl Policy {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Policy::Bounds(_) => "bounds",
            Policy::Variation(_) => "variation",
        }
    }

    /// Trailing window the policy reads
    pub fn window(&self) -> Duration {
        match self {
            Policy::Bounds(p) => p.window,
            Policy::Variation(p) => p.window,
        }
    }

    /// Measurement kind to fetch, `None` for all kinds
    pub fn measurement(&self) -> Option<&str> {
        match self {
            Policy::Bounds(_) => None,
            Policy::Variation(p) => Some(&p.measurement),
        }
    }

    pub fn evaluate(&self, rows: &[WindowRow]) -> Evaluation {
        match self {
            Policy::Bounds(p) => p.evaluate(rows),
            Policy::Variation(p) => p.evaluate(rows),
        }
    }
}
