//! Trend analyzer: trailing rolling statistics and slope per monitored parameter.
//!
//! Input readings are expected to belong to one site and to be ordered by time,
//! as produced by [`crate::merge::merge_tables`].

use crate::{error::SentryError, stats};
use chrono::NaiveDateTime;
use rosentry_schemas::{
    reading::{Parameter, Reading},
    units::UnitSystem,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeStatus {
    Computed,
    /// Fewer than `2 * window_size - 1` points; the zero slope carries no meaning.
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSnapshot {
    pub current_value: f64,
    pub rolling_mean: f64,
    pub rolling_std: f64,
    /// Per-step change of the rolling mean across one window.
    pub slope: f64,
    pub slope_status: SlopeStatus,
    pub points: usize,
}

impl TrendSnapshot {
    pub fn has_slope(&self) -> bool {
        self.slope_status == SlopeStatus::Computed
    }
}

pub fn calculate_trends(
    readings: &[Reading],
    window_size: usize,
    parameters: &[Parameter],
    units: &UnitSystem,
) -> Result<BTreeMap<Parameter, TrendSnapshot>, SentryError> {
    check_window(window_size)?;

    let mut trends = BTreeMap::new();
    for parameter in parameters {
        let values: Vec<f64> = readings
            .iter()
            .filter_map(|r| r.value(*parameter, units))
            .collect();
        if values.is_empty() {
            tracing::debug!(%parameter, "parameter absent from input, skipping trend");
            continue;
        }
        trends.insert(*parameter, snapshot(&values, window_size));
    }
    Ok(trends)
}

fn check_window(window_size: usize) -> Result<(), SentryError> {
    if window_size == 0 {
        return Err(SentryError::Config("window_size must be at least 1".to_string()));
    }
    Ok(())
}

/// Mean of the full window ending at `end` (inclusive), if one exists.
fn window_mean(values: &[f64], window: usize, end: usize) -> Option<f64> {
    if end + 1 < window {
        return None;
    }
    stats::mean(&values[end + 1 - window..=end])
}

fn snapshot(values: &[f64], window: usize) -> TrendSnapshot {
    let n = values.len();
    let tail = &values[n.saturating_sub(window)..];
    let current_value = values[n - 1];

    let slope = if n >= window.saturating_mul(2) - 1 {
        window_mean(values, window, n - 1)
            .zip(window_mean(values, window, n - window))
            .map(|(last, earlier)| (last - earlier) / window as f64)
    } else {
        None
    };

    TrendSnapshot {
        current_value,
        rolling_mean: stats::mean(tail).unwrap_or(current_value),
        rolling_std: stats::sample_std(tail),
        slope: slope.unwrap_or(0.0),
        slope_status: if slope.is_some() {
            SlopeStatus::Computed
        } else {
            SlopeStatus::InsufficientData
        },
        points: n,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub rolling_mean: Option<f64>,
    pub rolling_std: Option<f64>,
}

/// Rolling mean and std at every reading carrying `parameter`, for charting.
/// Points before the first full window have no statistics.
pub fn rolling_series(
    readings: &[Reading],
    parameter: Parameter,
    window_size: usize,
    units: &UnitSystem,
) -> Result<Vec<RollingPoint>, SentryError> {
    check_window(window_size)?;

    let points: Vec<(NaiveDateTime, f64)> = readings
        .iter()
        .filter_map(|r| r.value(parameter, units).map(|v| (r.timestamp, v)))
        .collect();
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();

    Ok(points
        .iter()
        .enumerate()
        .map(|(i, (timestamp, value))| {
            let full = i + 1 >= window_size;
            RollingPoint {
                timestamp: *timestamp,
                value: *value,
                rolling_mean: window_mean(&values, window_size, i),
                rolling_std: full.then(|| stats::sample_std(&values[i + 1 - window_size..=i])),
            }
        })
        .collect())
}
