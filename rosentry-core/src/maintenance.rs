//! Maintenance predictor: turns trend snapshots into alerts, a status tier and a
//! recommended next-maintenance date.
//!
//! Each evaluation is independent. The current time is an input, so identical
//! readings, configuration and `now` always give an identical assessment.

use crate::{error::SentryError, trend};
use chrono::{Duration, NaiveDateTime};
use rosentry_schemas::{
    reading::{Parameter, Reading},
    thresholds::MaintenanceConfig,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    BelowRange,
    AboveRange,
    RapidIncrease,
    RapidDecrease,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceAlert {
    pub parameter: Parameter,
    pub severity: Severity,
    pub kind: AlertKind,
    pub message: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Normal,
    Attention,
    Warning,
    Critical,
}

impl MaintenanceStatus {
    /// Status tier and days until the next maintenance for a severity score.
    pub fn from_score(score: u32) -> (Self, i64) {
        match score {
            s if s >= 5 => (MaintenanceStatus::Critical, 7),
            s if s >= 3 => (MaintenanceStatus::Warning, 14),
            s if s > 0 => (MaintenanceStatus::Attention, 21),
            _ => (MaintenanceStatus::Normal, 30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceStatus::Normal => "normal",
            MaintenanceStatus::Attention => "attention",
            MaintenanceStatus::Warning => "warning",
            MaintenanceStatus::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceAssessment {
    pub site_id: u32,
    pub site_name: String,
    pub status: MaintenanceStatus,
    pub score: u32,
    pub alerts: Vec<MaintenanceAlert>,
    pub evaluated_at: NaiveDateTime,
    pub next_maintenance: NaiveDateTime,
    /// Parameters whose slope could not be computed; their trend check was skipped.
    pub insufficient_trend_data: Vec<Parameter>,
}

/// Evaluates the ordered readings of one site. Readings of several sites are
/// rejected; use [`predict_for_sites`] for those.
pub fn predict_maintenance_needs(
    readings: &[Reading],
    config: &MaintenanceConfig,
    now: NaiveDateTime,
) -> Result<MaintenanceAssessment, SentryError> {
    let latest = readings
        .iter()
        .max_by_key(|r| r.timestamp)
        .ok_or_else(|| SentryError::NoData("no readings to evaluate".to_string()))?;
    if readings.iter().any(|r| r.site_id != latest.site_id) {
        return Err(SentryError::InconsistentSite {
            site_id: latest.site_id,
            field: "site_id",
        });
    }

    let trends = trend::calculate_trends(
        readings,
        config.window_size,
        &config.thresholds.parameters(),
        &config.units,
    )?;

    let mut alerts = Vec::new();
    let mut insufficient_trend_data = Vec::new();
    for (parameter, snapshot) in &trends {
        let Some(band) = config.thresholds.get(*parameter) else {
            continue;
        };
        let name = parameter.as_str();
        let current = snapshot.current_value;

        if current < band.low {
            alerts.push(MaintenanceAlert {
                parameter: *parameter,
                severity: Severity::High,
                kind: AlertKind::BelowRange,
                message: format!("Low {}: {:.1}", name, current),
                recommendation: format!("Check {} sensors and control systems", name),
            });
        } else if current > band.high {
            alerts.push(MaintenanceAlert {
                parameter: *parameter,
                severity: Severity::High,
                kind: AlertKind::AboveRange,
                message: format!("High {}: {:.1}", name, current),
                recommendation: format!(
                    "Verify {} control systems and membrane condition",
                    name
                ),
            });
        }

        if !snapshot.has_slope() {
            insufficient_trend_data.push(*parameter);
        } else if snapshot.slope.abs() > band.trend_threshold {
            let (kind, direction) = if snapshot.slope > 0.0 {
                (AlertKind::RapidIncrease, "increasing")
            } else {
                (AlertKind::RapidDecrease, "decreasing")
            };
            alerts.push(MaintenanceAlert {
                parameter: *parameter,
                severity: Severity::Medium,
                kind,
                message: format!("{} is {} rapidly", parameter.label(), direction),
                recommendation: format!(
                    "Monitor {} trend and schedule preventive maintenance",
                    name
                ),
            });
        }
    }

    let score: u32 = alerts.iter().map(|a| a.severity.weight()).sum();
    let (status, days) = MaintenanceStatus::from_score(score);

    tracing::debug!(
        site_id = latest.site_id,
        alerts = alerts.len(),
        score,
        status = status.as_str(),
        "maintenance evaluated"
    );

    Ok(MaintenanceAssessment {
        site_id: latest.site_id,
        site_name: latest.site_name.clone(),
        status,
        score,
        alerts,
        evaluated_at: now,
        next_maintenance: now + Duration::days(days),
        insufficient_trend_data,
    })
}

/// One assessment per site in `readings`, ordered by site id.
pub fn predict_for_sites(
    readings: &[Reading],
    config: &MaintenanceConfig,
    now: NaiveDateTime,
) -> Result<Vec<MaintenanceAssessment>, SentryError> {
    if readings.is_empty() {
        return Err(SentryError::NoData("no readings to evaluate".to_string()));
    }
    let mut by_site: BTreeMap<u32, Vec<Reading>> = BTreeMap::new();
    for reading in readings {
        by_site.entry(reading.site_id).or_default().push(reading.clone());
    }
    by_site
        .values_mut()
        .map(|site| {
            site.sort_by_key(|r| r.timestamp);
            predict_maintenance_needs(site, config, now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{base_time, reading};
    use rosentry_schemas::thresholds::{ParameterThreshold, ThresholdSet};

    fn flat_site(hours: i64) -> Vec<Reading> {
        (0..hours).map(|h| reading(1, h, 65.0)).collect()
    }

    fn now() -> NaiveDateTime {
        base_time() + Duration::days(10)
    }

    #[test]
    fn in_range_flat_site_is_normal() {
        let assessment =
            predict_maintenance_needs(&flat_site(12), &MaintenanceConfig::default(), now())
                .unwrap();
        assert!(assessment.alerts.is_empty());
        assert_eq!(assessment.status, MaintenanceStatus::Normal);
        assert_eq!(assessment.next_maintenance, now() + Duration::days(30));
        assert!(assessment.insufficient_trend_data.is_empty());
    }

    #[test]
    fn single_high_pressure_reading_is_a_warning() {
        let mut readings = flat_site(12);
        for r in &mut readings {
            r.pressure = 90.0;
        }
        let assessment =
            predict_maintenance_needs(&readings, &MaintenanceConfig::default(), now()).unwrap();

        assert_eq!(assessment.alerts.len(), 1);
        let alert = &assessment.alerts[0];
        assert_eq!(alert.parameter, Parameter::Pressure);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.kind, AlertKind::AboveRange);
        assert_eq!(alert.message, "High pressure: 90.0");
        assert_eq!(assessment.score, 3);
        assert_eq!(assessment.status, MaintenanceStatus::Warning);
        assert_eq!(assessment.next_maintenance, now() + Duration::days(14));
    }

    #[test]
    fn score_boundaries_map_to_tiers() {
        assert_eq!(MaintenanceStatus::from_score(0), (MaintenanceStatus::Normal, 30));
        assert_eq!(MaintenanceStatus::from_score(1), (MaintenanceStatus::Attention, 21));
        assert_eq!(MaintenanceStatus::from_score(2), (MaintenanceStatus::Attention, 21));
        assert_eq!(MaintenanceStatus::from_score(3), (MaintenanceStatus::Warning, 14));
        assert_eq!(MaintenanceStatus::from_score(4), (MaintenanceStatus::Warning, 14));
        assert_eq!(MaintenanceStatus::from_score(5), (MaintenanceStatus::Critical, 7));
        assert_eq!(MaintenanceStatus::from_score(11), (MaintenanceStatus::Critical, 7));
    }

    #[test]
    fn lone_trend_alert_scores_two_and_needs_attention() {
        // Rising 1 bar per step stays inside 55..75 but exceeds the 0.5 trend threshold.
        let readings: Vec<Reading> = (0..10).map(|h| reading(1, h, 60.0 + h as f64)).collect();
        let assessment =
            predict_maintenance_needs(&readings, &MaintenanceConfig::default(), now()).unwrap();
        assert_eq!(assessment.alerts.len(), 1);
        assert_eq!(assessment.alerts[0].severity, Severity::Medium);
        assert_eq!(assessment.alerts[0].kind, AlertKind::RapidIncrease);
        assert_eq!(assessment.alerts[0].message, "Pressure is increasing rapidly");
        assert_eq!(assessment.score, 2);
        assert_eq!(assessment.status, MaintenanceStatus::Attention);
        assert_eq!(assessment.next_maintenance, now() + Duration::days(21));
    }

    #[test]
    fn threshold_and_trend_alerts_stack_to_critical() {
        let readings: Vec<Reading> = (0..10).map(|h| reading(1, h, 50.0 - h as f64)).collect();
        let assessment =
            predict_maintenance_needs(&readings, &MaintenanceConfig::default(), now()).unwrap();
        let kinds: Vec<AlertKind> = assessment.alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::BelowRange, AlertKind::RapidDecrease]);
        assert_eq!(assessment.score, 5);
        assert_eq!(assessment.status, MaintenanceStatus::Critical);
        assert_eq!(assessment.next_maintenance, now() + Duration::days(7));
    }

    #[test]
    fn short_history_reports_insufficient_trend_data() {
        let assessment =
            predict_maintenance_needs(&flat_site(3), &MaintenanceConfig::default(), now()).unwrap();
        assert_eq!(assessment.status, MaintenanceStatus::Normal);
        assert_eq!(
            assessment.insufficient_trend_data,
            MaintenanceConfig::default().thresholds.parameters()
        );
    }

    #[test]
    fn thresholds_are_injected_per_deployment() {
        let config = MaintenanceConfig {
            thresholds: ThresholdSet(BTreeMap::from([(
                Parameter::Pressure,
                ParameterThreshold {
                    low: 480.0,
                    high: 520.0,
                    trend_threshold: 5.0,
                },
            )])),
            units: rosentry_schemas::units::UnitSystem {
                pressure: rosentry_schemas::units::PressureUnit::Psi,
                ..Default::default()
            },
            ..MaintenanceConfig::default()
        };
        // 65 bar is roughly 943 psi.
        let assessment = predict_maintenance_needs(&flat_site(12), &config, now()).unwrap();
        assert_eq!(assessment.alerts.len(), 1);
        assert!(assessment.alerts[0].message.starts_with("High pressure: 942."));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let readings: Vec<Reading> = (0..10).map(|h| reading(1, h, 70.0 + h as f64)).collect();
        let config = MaintenanceConfig::default();
        let a = predict_maintenance_needs(&readings, &config, now()).unwrap();
        let b = predict_maintenance_needs(&readings, &config, now()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input_is_no_data() {
        assert!(matches!(
            predict_maintenance_needs(&[], &MaintenanceConfig::default(), now()),
            Err(SentryError::NoData(_))
        ));
    }

    #[test]
    fn interleaved_sites_are_rejected() {
        let readings = vec![reading(1, 0, 65.0), reading(2, 1, 65.0), reading(1, 2, 65.0)];
        let err = predict_maintenance_needs(&readings, &MaintenanceConfig::default(), now())
            .unwrap_err();
        assert!(matches!(
            err,
            SentryError::InconsistentSite {
                site_id: 1,
                field: "site_id"
            }
        ));
    }

    #[test]
    fn per_site_assessments_are_independent() {
        let mut readings = flat_site(12);
        readings.extend((0..12).map(|h| reading(2, h, 90.0)));
        let assessments =
            predict_for_sites(&readings, &MaintenanceConfig::default(), now()).unwrap();
        assert_eq!(assessments.len(), 2);
        assert_eq!(assessments[0].status, MaintenanceStatus::Normal);
        assert_eq!(assessments[1].site_id, 2);
        assert_eq!(assessments[1].status, MaintenanceStatus::Warning);
    }
}
