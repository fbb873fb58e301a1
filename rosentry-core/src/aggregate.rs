//! Site aggregator: one summary row per site, plus ranking and side-by-side comparison.

use crate::{error::SentryError, stats};
use chrono::NaiveDateTime;
use rosentry_schemas::{
    reading::{Parameter, Reading},
    units::UnitSystem,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub site_id: u32,
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pressure: f64,
    pub flow_feed: f64,
    pub flow_product: f64,
    pub flow_waste: f64,
    pub conductivity: Option<f64>,
    pub temperature: Option<f64>,
    pub recovery_rate: f64,
    pub last_updated: NaiveDateTime,
    pub reading_count: usize,
    pub units: UnitSystem,
}

impl SiteSummary {
    pub fn value(&self, parameter: Parameter) -> Option<f64> {
        match parameter {
            Parameter::Pressure => Some(self.pressure),
            Parameter::FlowFeed => Some(self.flow_feed),
            Parameter::FlowProduct => Some(self.flow_product),
            Parameter::FlowWaste => Some(self.flow_waste),
            Parameter::Conductivity => self.conductivity,
            Parameter::Temperature => self.temperature,
            Parameter::RecoveryRate => Some(self.recovery_rate),
        }
    }
}

/// Groups readings by site and averages every metric in `units`.
///
/// The name and coordinates of a site must be identical across its readings;
/// a site whose recorded location moved is rejected rather than summarized.
pub fn aggregate_sites(
    readings: &[Reading],
    units: &UnitSystem,
) -> Result<Vec<SiteSummary>, SentryError> {
    if readings.is_empty() {
        return Err(SentryError::NoData("no readings to aggregate".to_string()));
    }

    let mut groups: BTreeMap<u32, Vec<&Reading>> = BTreeMap::new();
    for reading in readings {
        groups.entry(reading.site_id).or_default().push(reading);
    }

    let mut summaries = Vec::with_capacity(groups.len());
    for (site_id, rows) in groups {
        let first = rows[0];
        for row in &rows[1..] {
            if row.site_name != first.site_name {
                return Err(SentryError::InconsistentSite {
                    site_id,
                    field: "site_name",
                });
            }
            if row.latitude != first.latitude {
                return Err(SentryError::InconsistentSite {
                    site_id,
                    field: "latitude",
                });
            }
            if row.longitude != first.longitude {
                return Err(SentryError::InconsistentSite {
                    site_id,
                    field: "longitude",
                });
            }
        }

        let mean_of = |parameter: Parameter| {
            let values: Vec<f64> = rows.iter().filter_map(|r| r.value(parameter, units)).collect();
            stats::mean(&values)
        };
        let required = |parameter: Parameter| mean_of(parameter).unwrap_or_default();

        summaries.push(SiteSummary {
            site_id,
            site_name: first.site_name.clone(),
            latitude: first.latitude,
            longitude: first.longitude,
            pressure: required(Parameter::Pressure),
            flow_feed: required(Parameter::FlowFeed),
            flow_product: required(Parameter::FlowProduct),
            flow_waste: required(Parameter::FlowWaste),
            conductivity: mean_of(Parameter::Conductivity),
            temperature: mean_of(Parameter::Temperature),
            recovery_rate: required(Parameter::RecoveryRate),
            last_updated: rows.iter().map(|r| r.timestamp).max().unwrap_or(first.timestamp),
            reading_count: rows.len(),
            units: *units,
        });
    }

    tracing::debug!(sites = summaries.len(), "aggregated site summaries");
    Ok(summaries)
}

/// Sites ordered best-first by `parameter`; sites lacking it go last. Ties keep site id order.
pub fn rank_sites(summaries: &[SiteSummary], parameter: Parameter) -> Vec<&SiteSummary> {
    let mut ranked: Vec<&SiteSummary> = summaries.iter().collect();
    ranked.sort_by(|a, b| match (a.value(parameter), b.value(parameter)) {
        (Some(x), Some(y)) => y.total_cmp(&x).then(a.site_id.cmp(&b.site_id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.site_id.cmp(&b.site_id),
    });
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteComparison {
    pub site_id: u32,
    pub site_name: String,
    /// Each value as a percentage of the largest value among the compared sites.
    pub relative: BTreeMap<Parameter, f64>,
}

pub fn compare_sites(summaries: &[SiteSummary], parameters: &[Parameter]) -> Vec<SiteComparison> {
    let max_by: BTreeMap<Parameter, f64> = parameters
        .iter()
        .map(|p| {
            let max = summaries
                .iter()
                .filter_map(|s| s.value(*p))
                .fold(f64::NEG_INFINITY, f64::max);
            (*p, max)
        })
        .collect();

    summaries
        .iter()
        .map(|summary| {
            let relative = parameters
                .iter()
                .filter_map(|p| {
                    let value = summary.value(*p)?;
                    let max = max_by[p];
                    let pct = if max == 0.0 { 0.0 } else { value / max * 100.0 };
                    Some((*p, pct))
                })
                .collect();
            SiteComparison {
                site_id: summary.site_id,
                site_name: summary.site_name.clone(),
                relative,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::reading;
    use rosentry_schemas::units::{FlowUnit, PressureUnit};

    #[test]
    fn pressure_is_the_arithmetic_mean() {
        let readings = vec![reading(1, 0, 60.0), reading(1, 1, 70.0), reading(1, 2, 62.0)];
        let summaries = aggregate_sites(&readings, &UnitSystem::default()).unwrap();
        assert_eq!(summaries.len(), 1);
        assert!((summaries[0].pressure - 64.0).abs() < 1e-9);
        assert_eq!(summaries[0].reading_count, 3);
        assert_eq!(summaries[0].last_updated, readings[2].timestamp);
    }

    #[test]
    fn two_readings_average_not_last_value() {
        let readings = vec![reading(4, 0, 50.0), reading(4, 1, 80.0)];
        let summaries = aggregate_sites(&readings, &UnitSystem::default()).unwrap();
        assert_eq!(summaries[0].pressure, 65.0);
    }

    #[test]
    fn one_row_per_site_in_id_order() {
        let readings = vec![reading(3, 0, 60.0), reading(1, 0, 60.0), reading(3, 1, 60.0)];
        let summaries = aggregate_sites(&readings, &UnitSystem::default()).unwrap();
        let ids: Vec<u32> = summaries.iter().map(|s| s.site_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(summaries[0].latitude, 21.0);
    }

    #[test]
    fn mixed_units_are_converted_before_averaging() {
        let mut psi = reading(1, 1, 14.503_773_8 * 70.0);
        psi.pressure_unit = PressureUnit::Psi;
        psi.flow_feed = 100.0 / 0.227_124_7 * 1.15;
        psi.flow_unit = FlowUnit::Gpm;
        let readings = vec![reading(1, 0, 60.0), psi];
        let summaries = aggregate_sites(&readings, &UnitSystem::default()).unwrap();
        assert!((summaries[0].pressure - 65.0).abs() < 1e-6);
        assert!((summaries[0].flow_feed - 115.0).abs() < 1e-6);
    }

    #[test]
    fn moved_coordinates_are_rejected() {
        let mut moved = reading(2, 1, 60.0);
        moved.latitude += 0.5;
        let err = aggregate_sites(&[reading(2, 0, 60.0), moved], &UnitSystem::default()).unwrap_err();
        assert!(matches!(
            err,
            SentryError::InconsistentSite {
                site_id: 2,
                field: "latitude"
            }
        ));
    }

    #[test]
    fn optional_metrics_average_present_values_only() {
        let mut gap = reading(1, 1, 60.0);
        gap.conductivity = None;
        let mut other = reading(1, 2, 60.0);
        other.conductivity = Some(465.0);
        let summaries =
            aggregate_sites(&[reading(1, 0, 60.0), gap, other], &UnitSystem::default()).unwrap();
        assert_eq!(summaries[0].conductivity, Some(460.0));
    }

    #[test]
    fn empty_input_is_no_data() {
        assert!(matches!(
            aggregate_sites(&[], &UnitSystem::default()),
            Err(SentryError::NoData(_))
        ));
    }

    #[test]
    fn ranking_and_comparison() {
        let mut high = reading(2, 0, 60.0);
        high.recovery_rate = 80.0;
        let mut missing = reading(3, 0, 60.0);
        missing.temperature = None;
        let summaries =
            aggregate_sites(&[reading(1, 0, 60.0), high, missing], &UnitSystem::default())
                .unwrap();

        let ranked: Vec<u32> = rank_sites(&summaries, Parameter::RecoveryRate)
            .iter()
            .map(|s| s.site_id)
            .collect();
        assert_eq!(ranked, vec![2, 1, 3]);
        let by_temp: Vec<u32> = rank_sites(&summaries, Parameter::Temperature)
            .iter()
            .map(|s| s.site_id)
            .collect();
        assert_eq!(by_temp, vec![1, 2, 3]);

        let comparison = compare_sites(&summaries, &[Parameter::RecoveryRate, Parameter::Temperature]);
        assert_eq!(comparison[1].relative[&Parameter::RecoveryRate], 100.0);
        assert!((comparison[0].relative[&Parameter::RecoveryRate] - 93.75).abs() < 1e-9);
        assert!(!comparison[2].relative.contains_key(&Parameter::Temperature));
    }
}
