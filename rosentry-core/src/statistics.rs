//! Descriptive statistics per site: distribution of each metric, pairwise
//! correlation between metrics, and performance against a baseline.

use crate::{error::SentryError, stats};
use rosentry_schemas::{
    reading::{Parameter, Reading},
    units::UnitSystem,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStatistics {
    pub site_id: u32,
    pub site_name: String,
    pub parameter: Parameter,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 for a single value.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub site_id: u32,
    pub site_name: String,
    pub parameters: Vec<Parameter>,
    /// `coefficients[i][j]` correlates `parameters[i]` with `parameters[j]`.
    /// `None` where fewer than two rows carry both values or one side is constant.
    pub coefficients: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: Parameter, b: Parameter) -> Option<f64> {
        let i = self.parameters.iter().position(|p| *p == a)?;
        let j = self.parameters.iter().position(|p| *p == b)?;
        self.coefficients[i][j]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub parameter: Parameter,
    pub baseline: f64,
    pub mean: f64,
    pub std: f64,
    /// Coefficient of variation, `std / mean`.
    pub cv: Option<f64>,
    /// Mean of `value / baseline`.
    pub efficiency: f64,
    /// `1 - mean(rolling std) / mean` over full windows only.
    pub stability: Option<f64>,
    pub stability_window: usize,
}

fn group_by_site(readings: &[Reading]) -> BTreeMap<u32, Vec<&Reading>> {
    let mut groups: BTreeMap<u32, Vec<&Reading>> = BTreeMap::new();
    for reading in readings {
        groups.entry(reading.site_id).or_default().push(reading);
    }
    groups
}

/// Count, mean, std, min and max of each parameter per site, in `units`.
/// Parameters a site never reports are left out for that site.
pub fn metric_statistics(
    readings: &[Reading],
    parameters: &[Parameter],
    units: &UnitSystem,
) -> Result<Vec<MetricStatistics>, SentryError> {
    if readings.is_empty() {
        return Err(SentryError::NoData("no readings to describe".to_string()));
    }

    let mut out = Vec::new();
    for (site_id, rows) in group_by_site(readings) {
        for parameter in parameters {
            let values: Vec<f64> = rows.iter().filter_map(|r| r.value(*parameter, units)).collect();
            let Some(mean) = stats::mean(&values) else {
                continue;
            };
            out.push(MetricStatistics {
                site_id,
                site_name: rows[0].site_name.clone(),
                parameter: *parameter,
                count: values.len(),
                mean,
                std: stats::sample_std(&values),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            });
        }
    }
    Ok(out)
}

/// One Pearson matrix per site over `parameters`, using the rows where both
/// values of a pair are present.
pub fn correlation_matrix(
    readings: &[Reading],
    parameters: &[Parameter],
    units: &UnitSystem,
) -> Result<Vec<CorrelationMatrix>, SentryError> {
    if parameters.len() < 2 {
        return Err(SentryError::Config(
            "correlation needs at least two parameters".to_string(),
        ));
    }
    if readings.is_empty() {
        return Err(SentryError::NoData("no readings to correlate".to_string()));
    }

    let mut out = Vec::new();
    for (site_id, rows) in group_by_site(readings) {
        let columns: Vec<Vec<Option<f64>>> = parameters
            .iter()
            .map(|p| rows.iter().map(|r| r.value(*p, units)).collect())
            .collect();

        let mut coefficients = vec![vec![None; parameters.len()]; parameters.len()];
        for i in 0..parameters.len() {
            for j in i..parameters.len() {
                let (x, y): (Vec<f64>, Vec<f64>) = columns[i]
                    .iter()
                    .zip(&columns[j])
                    .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                    .unzip();
                let r = stats::pearson(&x, &y);
                // A varying series correlates exactly with itself.
                let r = if i == j { r.map(|_| 1.0) } else { r };
                coefficients[i][j] = r;
                coefficients[j][i] = r;
            }
        }

        out.push(CorrelationMatrix {
            site_id,
            site_name: rows[0].site_name.clone(),
            parameters: parameters.to_vec(),
            coefficients,
        });
    }
    Ok(out)
}

/// Performance of one parameter at a single site against `baseline`.
///
/// Stability averages the sample std of every full `stability_window` of
/// consecutive readings; it is `None` while no full window exists.
pub fn performance_metrics(
    readings: &[Reading],
    parameter: Parameter,
    baseline: f64,
    stability_window: usize,
    units: &UnitSystem,
) -> Result<PerformanceMetrics, SentryError> {
    if stability_window == 0 {
        return Err(SentryError::Config(
            "stability window must be at least 1".to_string(),
        ));
    }
    if !baseline.is_finite() || baseline <= 0.0 {
        return Err(SentryError::Config(format!(
            "baseline must be a positive number, got {}",
            baseline
        )));
    }
    let first = readings
        .first()
        .ok_or_else(|| SentryError::NoData("no readings to evaluate".to_string()))?;
    if let Some(other) = readings.iter().find(|r| r.site_id != first.site_id) {
        return Err(SentryError::InconsistentSite {
            site_id: other.site_id,
            field: "site_id",
        });
    }

    let mut ordered: Vec<&Reading> = readings.iter().collect();
    ordered.sort_by_key(|r| r.timestamp);
    let values: Vec<f64> = ordered.iter().filter_map(|r| r.value(parameter, units)).collect();
    let mean = stats::mean(&values).ok_or_else(|| {
        SentryError::NoData(format!("no {} values for site '{}'", parameter, first.site_name))
    })?;
    let std = stats::sample_std(&values);

    let stability = if stability_window >= 2 && values.len() >= stability_window && mean != 0.0 {
        let rolling: Vec<f64> = values.windows(stability_window).map(stats::sample_std).collect();
        stats::mean(&rolling).map(|m| 1.0 - m / mean)
    } else {
        None
    };

    Ok(PerformanceMetrics {
        parameter,
        baseline,
        mean,
        std,
        cv: (mean != 0.0).then(|| std / mean),
        efficiency: mean / baseline,
        stability,
        stability_window,
    })
}
