use crate::{error::SentryError, stats};
use chrono::NaiveDateTime;
use rosentry_schemas::{
    reading::{Parameter, Reading},
    thresholds::{EfficiencyConfig, ThresholdSet},
    units::UnitSystem,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSnapshot {
    pub site_name: String,
    pub avg_recovery: f64,
    pub avg_pressure: f64,
    pub avg_flow: f64,
    pub efficiency_score: f64,
    pub last_updated: NaiveDateTime,
    pub date_range: (NaiveDateTime, NaiveDateTime),
    pub reading_count: usize,
    pub units: UnitSystem,
}

/// Headline metrics for `site_name` over every reading of that site in `readings`.
/// The caller is expected to have applied any time filter already.
pub fn calculate_kpis(
    readings: &[Reading],
    site_name: &str,
    config: &EfficiencyConfig,
) -> Result<KpiSnapshot, SentryError> {
    validate_efficiency_config(config)?;

    let site: Vec<&Reading> = readings.iter().filter(|r| r.site_name == site_name).collect();
    let (Some(first), Some(last)) = (
        site.iter().map(|r| r.timestamp).min(),
        site.iter().map(|r| r.timestamp).max(),
    ) else {
        return Err(SentryError::NoData(format!(
            "no readings for site '{}'",
            site_name
        )));
    };

    let units = &config.units;
    let mean_of = |parameter: Parameter| {
        let values: Vec<f64> = site.iter().filter_map(|r| r.value(parameter, units)).collect();
        stats::mean(&values).unwrap_or_default()
    };
    let avg_recovery = mean_of(Parameter::RecoveryRate);
    let avg_pressure = mean_of(Parameter::Pressure);
    let avg_flow = mean_of(Parameter::FlowFeed);

    Ok(KpiSnapshot {
        site_name: site_name.to_string(),
        avg_recovery,
        avg_pressure,
        avg_flow,
        efficiency_score: efficiency_score(avg_recovery, avg_pressure, config),
        last_updated: last,
        date_range: (first, last),
        reading_count: site.len(),
        units: *units,
    })
}

/// Weighted composite of normalized recovery and pressure, clamped to `[0, 100]`.
///
/// The score is linear in both inputs, so scoring the averages equals averaging
/// per-reading scores before the clamp.
pub fn efficiency_score(avg_recovery: f64, avg_pressure: f64, config: &EfficiencyConfig) -> f64 {
    let norm_recovery =
        (avg_recovery - config.recovery_low) / (config.recovery_high - config.recovery_low);
    let norm_pressure = 1.0 - (avg_pressure - config.pressure_center) / config.pressure_span;
    let composite = config.recovery_weight * norm_recovery + config.pressure_weight * norm_pressure;
    if composite.is_nan() {
        return 0.0;
    }
    100.0 * composite.clamp(0.0, 1.0)
}

pub fn validate_efficiency_config(config: &EfficiencyConfig) -> Result<(), SentryError> {
    if !(config.recovery_high > config.recovery_low) {
        return Err(SentryError::Config(format!(
            "recovery_high ({}) must exceed recovery_low ({})",
            config.recovery_high, config.recovery_low
        )));
    }
    if !(config.pressure_span > 0.0) {
        return Err(SentryError::Config(format!(
            "pressure_span must be positive, got {}",
            config.pressure_span
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Normal,
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterHealth {
    pub parameter: Parameter,
    pub value: f64,
    pub level: HealthLevel,
}

/// Classifies the latest reading of a site against the operating bands, for status cards.
pub fn assess_latest(
    readings: &[Reading],
    site_name: &str,
    thresholds: &ThresholdSet,
    units: &UnitSystem,
) -> Result<Vec<ParameterHealth>, SentryError> {
    let latest = readings
        .iter()
        .filter(|r| r.site_name == site_name)
        .max_by_key(|r| r.timestamp)
        .ok_or_else(|| SentryError::NoData(format!("no readings for site '{}'", site_name)))?;

    Ok(thresholds
        .iter()
        .filter_map(|(parameter, band)| {
            let value = latest.value(*parameter, units)?;
            let level = if value < band.low {
                HealthLevel::Low
            } else if value > band.high {
                HealthLevel::High
            } else {
                HealthLevel::Normal
            };
            Some(ParameterHealth {
                parameter: *parameter,
                value,
                level,
            })
        })
        .collect())
}
