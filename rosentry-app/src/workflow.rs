use crate::config::PipelineConfig;
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rosentry_core::{
    aggregate::{self, SiteSummary},
    export::TableWriter,
    kpi::{self, HealthLevel, KpiSnapshot, ParameterHealth},
    maintenance::{self, MaintenanceAssessment},
    merge::{self, TimePreset, TimeRange},
    normalize,
    statistics::{self, CorrelationMatrix, MetricStatistics, PerformanceMetrics},
    table::RawTable,
    trend::{self, TrendSnapshot},
};
use rosentry_schemas::reading::{Parameter, Reading};
use serde::Serialize;
use std::{collections::BTreeMap, fs, path::Path, thread, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// The time window requested on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeRequest {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub preset: Option<TimePreset>,
}

impl RangeRequest {
    /// Presets are anchored at the newest reading, not the wall clock, so a stale
    /// feed still shows its last window.
    fn resolve(&self, readings: &[Reading]) -> Option<TimeRange> {
        match self.preset {
            Some(preset) => merge::latest_timestamp(readings).map(|t| TimeRange::preset(preset, t)),
            None if self.start.is_some() || self.end.is_some() => Some(TimeRange {
                start: self.start,
                end: self.end,
            }),
            None => None,
        }
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]` or `YYYY-MM-DDTHH:MM[:SS]`.
pub fn parse_bound(raw: &str) -> Result<NaiveDateTime, String> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("'{}' is not a date or date-time", raw))
}

/// Reads, normalizes and merges every configured source, then applies the range.
pub fn load_readings(config: &PipelineConfig, range: &RangeRequest) -> Result<Vec<Reading>> {
    let mut tables = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let table = RawTable::from_path(&source.path)
            .with_context(|| format!("Failed to read source '{}'", source.spec.name))?;
        let readings = normalize::normalize(&table, &source.spec, &config.registry)
            .with_context(|| format!("Failed to normalize source '{}'", source.spec.name))?;
        tracing::info!(
            source = %source.spec.name,
            role = ?source.role,
            rows = readings.len(),
            "source loaded"
        );
        tables.push(readings);
    }

    let merged = merge::merge_tables(tables, None)?;
    match range.resolve(&merged) {
        Some(window) => Ok(merge::merge_tables(vec![merged], Some(&window))?),
        None => Ok(merged),
    }
}

fn site_readings(readings: &[Reading], site_name: &str) -> Result<Vec<Reading>> {
    let site: Vec<Reading> = readings
        .iter()
        .filter(|r| r.site_name == site_name)
        .cloned()
        .collect();
    if site.is_empty() {
        return Err(anyhow!("no readings for site '{}'", site_name));
    }
    Ok(site)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run_summary(config: &PipelineConfig, readings: &[Reading], format: OutputFormat) -> Result<()> {
    let summaries = aggregate::aggregate_sites(readings, &config.units)?;
    match format {
        OutputFormat::Json => print_json(&summaries),
        OutputFormat::Text => {
            print!("{}", render_summary(&summaries));
            Ok(())
        }
    }
}

fn render_summary(summaries: &[SiteSummary]) -> String {
    let mut out = String::new();
    out.push_str("\n--- [Site Summary] ---\n");
    for s in aggregate::rank_sites(summaries, Parameter::RecoveryRate) {
        out.push_str(&format!(
            "{:>3}  {:<20} recovery {:>6.2} %  pressure {:>8.2} {}  feed {:>8.2} {}  ({} readings, last {})\n",
            s.site_id,
            s.site_name,
            s.recovery_rate,
            s.pressure,
            s.units.pressure,
            s.flow_feed,
            s.units.flow,
            s.reading_count,
            s.last_updated
        ));
    }
    out
}

#[derive(Serialize)]
struct KpiReport {
    kpis: KpiSnapshot,
    latest: Vec<ParameterHealth>,
}

/// KPIs in the efficiency units; latest-reading health against the maintenance
/// bands, in the units those bands are written in.
fn kpi_report(config: &PipelineConfig, readings: &[Reading], site_name: &str) -> Result<KpiReport> {
    let kpis = kpi::calculate_kpis(readings, site_name, &config.efficiency)?;
    let latest = kpi::assess_latest(
        readings,
        site_name,
        &config.maintenance.thresholds,
        &config.maintenance.units,
    )?;
    Ok(KpiReport { kpis, latest })
}

pub fn run_kpi(
    config: &PipelineConfig,
    readings: &[Reading],
    site_name: &str,
    format: OutputFormat,
) -> Result<()> {
    let report = kpi_report(config, readings, site_name)?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            let k = &report.kpis;
            println!("\n--- [KPIs] {} ---", k.site_name);
            println!("  Readings:          {} ({} to {})", k.reading_count, k.date_range.0, k.date_range.1);
            println!("  Avg Recovery:      {:.2} %", k.avg_recovery);
            println!("  Avg Pressure:      {:.2} {}", k.avg_pressure, k.units.pressure);
            println!("  Avg Feed Flow:     {:.2} {}", k.avg_flow, k.units.flow);
            println!("  Efficiency Score:  {:.1} / 100", k.efficiency_score);
            println!("  Latest reading:");
            for health in &report.latest {
                let flag = match health.level {
                    HealthLevel::Normal => "ok",
                    HealthLevel::Low => "LOW",
                    HealthLevel::High => "HIGH",
                };
                println!("    - {:<14} {:>10.2}  {}", health.parameter.label(), health.value, flag);
            }
            Ok(())
        }
    }
}

pub fn run_trends(
    config: &PipelineConfig,
    readings: &[Reading],
    site_name: &str,
    window: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let site = site_readings(readings, site_name)?;
    let window = window.unwrap_or(config.maintenance.window_size);
    let trends: BTreeMap<Parameter, TrendSnapshot> =
        trend::calculate_trends(&site, window, &Parameter::ALL, &config.maintenance.units)?;

    match format {
        OutputFormat::Json => print_json(&trends),
        OutputFormat::Text => {
            println!("\n--- [Trends] {} (window {}) ---", site_name, window);
            for (parameter, t) in &trends {
                let slope = if t.has_slope() {
                    format!("{:+.3}", t.slope)
                } else {
                    "n/a".to_string()
                };
                println!(
                    "  {:<14} current {:>10.2}  mean {:>10.2}  std {:>8.3}  slope {}",
                    parameter.label(),
                    t.current_value,
                    t.rolling_mean,
                    t.rolling_std,
                    slope
                );
            }
            Ok(())
        }
    }
}

/// What the `stats` command should compute.
#[derive(Debug, Clone)]
pub struct StatsRequest {
    pub site: Option<String>,
    pub parameters: Vec<Parameter>,
    /// Performance of this parameter against a baseline, for `site`.
    pub baseline: Option<(Parameter, f64)>,
    pub stability_window: usize,
}

#[derive(Serialize)]
struct StatsReport {
    statistics: Vec<MetricStatistics>,
    /// Empty when fewer than two parameters were requested.
    correlations: Vec<CorrelationMatrix>,
    performance: Option<PerformanceMetrics>,
}

fn stats_report(
    config: &PipelineConfig,
    readings: &[Reading],
    request: &StatsRequest,
) -> Result<StatsReport> {
    let selected = match &request.site {
        Some(name) => site_readings(readings, name)?,
        None => readings.to_vec(),
    };
    let parameters = if request.parameters.is_empty() {
        Parameter::ALL.to_vec()
    } else {
        request.parameters.clone()
    };

    let statistics = statistics::metric_statistics(&selected, &parameters, &config.units)?;
    let correlations = if parameters.len() >= 2 {
        statistics::correlation_matrix(&selected, &parameters, &config.units)?
    } else {
        Vec::new()
    };
    let performance = match request.baseline {
        Some((parameter, baseline)) => {
            if request.site.is_none() {
                return Err(anyhow!("a baseline needs --site"));
            }
            Some(statistics::performance_metrics(
                &selected,
                parameter,
                baseline,
                request.stability_window,
                &config.units,
            )?)
        }
        None => None,
    };
    Ok(StatsReport {
        statistics,
        correlations,
        performance,
    })
}

pub fn run_stats(
    config: &PipelineConfig,
    readings: &[Reading],
    request: &StatsRequest,
    format: OutputFormat,
) -> Result<()> {
    let report = stats_report(config, readings, request)?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print!("{}", render_stats(&report));
            Ok(())
        }
    }
}

fn render_stats(report: &StatsReport) -> String {
    let fmt_r = |r: Option<f64>| r.map_or_else(|| "n/a".to_string(), |v| format!("{:+.3}", v));

    let mut out = String::from("\n--- [Statistics] ---\n");
    for s in &report.statistics {
        out.push_str(&format!(
            "{:>3}  {:<20} {:<14} n {:>5}  mean {:>10.2}  std {:>8.3}  min {:>10.2}  max {:>10.2}\n",
            s.site_id,
            s.site_name,
            s.parameter.label(),
            s.count,
            s.mean,
            s.std,
            s.min,
            s.max
        ));
    }
    for matrix in &report.correlations {
        out.push_str(&format!("\n--- [Correlation] {} ---\n", matrix.site_name));
        out.push_str(&format!("{:<14}", ""));
        for p in &matrix.parameters {
            out.push_str(&format!(" {:>14}", p.as_str()));
        }
        out.push('\n');
        for (p, row) in matrix.parameters.iter().zip(&matrix.coefficients) {
            out.push_str(&format!("{:<14}", p.as_str()));
            for r in row {
                out.push_str(&format!(" {:>14}", fmt_r(*r)));
            }
            out.push('\n');
        }
    }
    if let Some(m) = &report.performance {
        out.push_str(&format!(
            "\n--- [Performance] {} vs baseline {} ---\n",
            m.parameter.label(),
            m.baseline
        ));
        out.push_str(&format!("  Mean:        {:.3}\n", m.mean));
        out.push_str(&format!("  Std:         {:.3}\n", m.std));
        out.push_str(&format!("  CV:          {}\n", m.cv.map_or("n/a".to_string(), |v| format!("{:.4}", v))));
        out.push_str(&format!("  Efficiency:  {:.4}\n", m.efficiency));
        out.push_str(&format!(
            "  Stability:   {} (window {})\n",
            m.stability.map_or("n/a".to_string(), |v| format!("{:.4}", v)),
            m.stability_window
        ));
    }
    out
}

pub fn run_maintenance(
    config: &PipelineConfig,
    readings: &[Reading],
    site_name: Option<&str>,
    now: NaiveDateTime,
    format: OutputFormat,
) -> Result<()> {
    let assessments = match site_name {
        Some(name) => vec![maintenance::predict_maintenance_needs(
            &site_readings(readings, name)?,
            &config.maintenance,
            now,
        )?],
        None => maintenance::predict_for_sites(readings, &config.maintenance, now)?,
    };
    match format {
        OutputFormat::Json => print_json(&assessments),
        OutputFormat::Text => {
            print!("{}", render_maintenance(&assessments));
            Ok(())
        }
    }
}

fn render_maintenance(assessments: &[MaintenanceAssessment]) -> String {
    let mut out = String::from("\n--- [Maintenance] ---\n");
    for a in assessments {
        out.push_str(&format!(
            "{} (site {}): {} (score {}), next maintenance {}\n",
            a.site_name,
            a.site_id,
            a.status.as_str().to_uppercase(),
            a.score,
            a.next_maintenance.format("%Y-%m-%d")
        ));
        for alert in &a.alerts {
            out.push_str(&format!(
                "  - [{:?}] {}. {}\n",
                alert.severity, alert.message, alert.recommendation
            ));
        }
        if !a.insufficient_trend_data.is_empty() {
            let names: Vec<&str> = a.insufficient_trend_data.iter().map(|p| p.as_str()).collect();
            out.push_str(&format!("  trend not evaluated: {}\n", names.join(", ")));
        }
    }
    out
}

pub fn run_export(
    config: &PipelineConfig,
    readings: &[Reading],
    out_dir: &Path,
    at: NaiveDateTime,
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let (mut writer, readings_path) = TableWriter::create_timestamped(out_dir, "readings", at)?;
    writer.write_readings(readings)?;

    let summaries = aggregate::aggregate_sites(readings, &config.units)?;
    let (mut writer, summary_path) = TableWriter::create_timestamped(out_dir, "site_summary", at)?;
    writer.write_summaries(&summaries)?;

    for summary in &summaries {
        let site = site_readings(readings, &summary.site_name)?;
        let prefix = format!("trends_site{}", summary.site_id);
        let (mut writer, _) = TableWriter::create_timestamped(out_dir, &prefix, at)?;
        for parameter in config.maintenance.thresholds.parameters() {
            let series = trend::rolling_series(
                &site,
                parameter,
                config.maintenance.window_size,
                &config.maintenance.units,
            )?;
            writer.write_rolling_series(parameter, &series)?;
        }
    }

    println!(
        "Exported {} readings to {:?} and {} site summaries to {:?}",
        readings.len(),
        readings_path,
        summaries.len(),
        summary_path
    );
    Ok(())
}

/// Re-reads every source each cycle and prints summary plus maintenance. A failed
/// cycle keeps showing the last good output.
pub fn run_watch(
    config: &PipelineConfig,
    range: &RangeRequest,
    interval: Duration,
    cycles: Option<u64>,
) -> Result<()> {
    let mut last_good: Option<String> = None;
    let mut cycle = 0u64;
    loop {
        cycle += 1;
        let now = chrono::Local::now().naive_local();
        match watch_cycle(config, range, now) {
            Ok(report) => {
                print!("{}", report);
                last_good = Some(report);
            }
            Err(e) => {
                tracing::warn!(cycle, error = %format!("{:#}", e), "refresh failed, keeping last known good output");
                match &last_good {
                    Some(report) => print!("(stale)\n{}", report),
                    None => println!("No data available yet."),
                }
            }
        }
        if cycles.is_some_and(|limit| cycle >= limit) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}

fn watch_cycle(config: &PipelineConfig, range: &RangeRequest, now: NaiveDateTime) -> Result<String> {
    let readings = load_readings(config, range)?;
    let summaries = aggregate::aggregate_sites(&readings, &config.units)?;
    let assessments = maintenance::predict_for_sites(&readings, &config.maintenance, now)?;
    Ok(format!(
        "\n=== {} ===\n{}{}",
        now.format("%Y-%m-%d %H:%M:%S"),
        render_summary(&summaries),
        render_maintenance(&assessments)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosentry_schemas::units::{FlowUnit, PressureUnit};

    #[test]
    fn bounds_accept_dates_and_date_times() {
        let day = parse_bound("2024-06-01").unwrap();
        assert_eq!(day.to_string(), "2024-06-01 00:00:00");
        assert_eq!(
            parse_bound("2024-06-01T08:30").unwrap().to_string(),
            "2024-06-01 08:30:00"
        );
        assert!(parse_bound("01/06/2024").is_err());
    }

    #[test]
    fn latest_health_uses_the_maintenance_units() {
        let yaml = r#"
schema_version: "1"
sources:
  - { name: a, path: a.csv }
maintenance:
  units: { pressure: psi }
  thresholds:
    pressure: { low: 800, high: 1100, trend_threshold: 7.5 }
"#;
        let config = PipelineConfig::from_yaml(yaml, Path::new(".")).unwrap();
        let reading = Reading {
            timestamp: parse_bound("2024-06-01 08:00").unwrap(),
            site_id: 1,
            site_name: "Jebel Ali".to_string(),
            latitude: 25.01,
            longitude: 55.06,
            pressure: 65.0,
            pressure_unit: PressureUnit::Bar,
            flow_feed: 115.0,
            flow_product: 86.0,
            flow_waste: 29.0,
            flow_unit: FlowUnit::M3PerHour,
            conductivity: None,
            temperature: None,
            recovery_rate: 75.0,
        };

        let report = kpi_report(&config, &[reading], "Jebel Ali").unwrap();
        // 65 bar is about 943 psi: inside the psi band, far below it if read as bar.
        assert_eq!(report.latest.len(), 1);
        assert_eq!(report.latest[0].level, HealthLevel::Normal);
        assert!((report.latest[0].value - 942.745).abs() < 1e-2);
        assert_eq!(report.kpis.avg_pressure, 65.0);
    }

    fn stats_config() -> PipelineConfig {
        PipelineConfig::from_yaml(
            "schema_version: \"1\"\nsources:\n  - { name: a, path: a.csv }\n",
            Path::new("."),
        )
        .unwrap()
    }

    fn site_reading(site_id: u32, hour: u32, pressure: f64) -> Reading {
        Reading {
            timestamp: parse_bound(&format!("2024-06-01 {:02}:00", hour)).unwrap(),
            site_id,
            site_name: format!("Site {}", site_id),
            latitude: 25.0,
            longitude: 55.0 + site_id as f64,
            pressure,
            pressure_unit: PressureUnit::Bar,
            flow_feed: 100.0 + pressure,
            flow_product: 80.0,
            flow_waste: 20.0 + pressure,
            flow_unit: FlowUnit::M3PerHour,
            conductivity: Some(450.0),
            temperature: None,
            recovery_rate: 75.0,
        }
    }

    #[test]
    fn stats_for_one_site_with_baseline() {
        let readings = vec![
            site_reading(1, 0, 60.0),
            site_reading(1, 1, 62.0),
            site_reading(1, 2, 64.0),
            site_reading(2, 0, 40.0),
        ];
        let request = StatsRequest {
            site: Some("Site 1".to_string()),
            parameters: vec![Parameter::Pressure, Parameter::FlowFeed],
            baseline: Some((Parameter::Pressure, 62.0)),
            stability_window: 2,
        };

        let report = stats_report(&stats_config(), &readings, &request).unwrap();
        assert_eq!(report.statistics.len(), 2);
        assert!(report.statistics.iter().all(|s| s.site_id == 1 && s.count == 3));
        assert_eq!(report.correlations.len(), 1);
        let r = report.correlations[0]
            .get(Parameter::Pressure, Parameter::FlowFeed)
            .unwrap();
        assert!((r - 1.0).abs() < 1e-9);
        let performance = report.performance.as_ref().unwrap();
        assert!((performance.efficiency - 1.0).abs() < 1e-12);

        let text = render_stats(&report);
        assert!(text.contains("[Correlation] Site 1"));
        assert!(text.contains("Stability:"));
    }

    #[test]
    fn stats_across_sites_skip_correlation_for_one_parameter() {
        let readings = vec![site_reading(1, 0, 60.0), site_reading(2, 0, 40.0)];
        let mut request = StatsRequest {
            site: None,
            parameters: vec![Parameter::Pressure],
            baseline: None,
            stability_window: 24,
        };
        let report = stats_report(&stats_config(), &readings, &request).unwrap();
        assert_eq!(report.statistics.len(), 2);
        assert!(report.correlations.is_empty());
        assert!(report.performance.is_none());

        request.baseline = Some((Parameter::Pressure, 60.0));
        assert!(stats_report(&stats_config(), &readings, &request).is_err());
    }

    #[test]
    fn explicit_bounds_become_an_open_range() {
        let request = RangeRequest {
            start: Some(parse_bound("2024-06-01").unwrap()),
            ..RangeRequest::default()
        };
        let range = request.resolve(&[]).unwrap();
        assert!(range.end.is_none());
        assert!(RangeRequest::default().resolve(&[]).is_none());
    }
}
