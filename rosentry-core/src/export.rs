//! CSV export of readings, site summaries and rolling series.
//!
//! Readings are written in the canonical column layout, so an exported file can be
//! read back through [`crate::normalize::normalize`] with a canonical source spec.

use crate::{aggregate::SiteSummary, error::SentryError, trend::RollingPoint};
use chrono::NaiveDateTime;
use csv::Writer;
use rosentry_schemas::{
    reading::{Parameter, Reading},
    units::{FlowUnit, PressureUnit},
};
use serde::Serialize;
use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    site_id: u32,
    site_name: &'a str,
    latitude: f64,
    longitude: f64,
    pressure: f64,
    pressure_unit: PressureUnit,
    flow_feed: f64,
    flow_product: f64,
    flow_waste: f64,
    flow_unit: FlowUnit,
    conductivity: Option<f64>,
    temperature: Option<f64>,
    recovery_rate: f64,
    last_updated: NaiveDateTime,
    reading_count: usize,
}

#[derive(Debug, Serialize)]
struct RollingRow {
    timestamp: NaiveDateTime,
    parameter: Parameter,
    value: f64,
    rolling_mean: Option<f64>,
    rolling_std: Option<f64>,
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.csv`
pub fn timestamped_file_name(prefix: &str, at: NaiveDateTime) -> String {
    format!("{}_{}.csv", prefix, at.format("%Y%m%d_%H%M%S"))
}

pub struct TableWriter<W: io::Write> {
    writer: Writer<W>,
    target: String,
}

impl TableWriter<fs::File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SentryError> {
        let path = path.as_ref();
        let target = path.display().to_string();
        let file = fs::File::create(path).map_err(|e| SentryError::FileIO(target.clone(), e))?;
        Ok(Self::from_writer(&target, file))
    }

    /// Creates `<dir>/<prefix>_<timestamp>.csv` and returns the writer with its path.
    pub fn create_timestamped(
        dir: impl AsRef<Path>,
        prefix: &str,
        at: NaiveDateTime,
    ) -> Result<(Self, PathBuf), SentryError> {
        let path = dir.as_ref().join(timestamped_file_name(prefix, at));
        let writer = Self::create(&path)?;
        Ok((writer, path))
    }
}

impl<W: io::Write> TableWriter<W> {
    pub fn from_writer(target: &str, inner: W) -> Self {
        Self {
            writer: Writer::from_writer(inner),
            target: target.to_string(),
        }
    }

    fn csv_error(&self, e: csv::Error) -> SentryError {
        SentryError::CsvError(self.target.clone(), e)
    }

    fn finish(&mut self, rows: usize, what: &str) -> Result<(), SentryError> {
        self.writer
            .flush()
            .map_err(|e| SentryError::FileIO(self.target.clone(), e))?;
        tracing::debug!(target_file = %self.target, rows, "wrote {}", what);
        Ok(())
    }

    pub fn write_readings(&mut self, readings: &[Reading]) -> Result<(), SentryError> {
        for reading in readings {
            self.writer.serialize(reading).map_err(|e| self.csv_error(e))?;
        }
        self.finish(readings.len(), "readings")
    }

    pub fn write_summaries(&mut self, summaries: &[SiteSummary]) -> Result<(), SentryError> {
        for s in summaries {
            let row = SummaryRow {
                site_id: s.site_id,
                site_name: &s.site_name,
                latitude: s.latitude,
                longitude: s.longitude,
                pressure: s.pressure,
                pressure_unit: s.units.pressure,
                flow_feed: s.flow_feed,
                flow_product: s.flow_product,
                flow_waste: s.flow_waste,
                flow_unit: s.units.flow,
                conductivity: s.conductivity,
                temperature: s.temperature,
                recovery_rate: s.recovery_rate,
                last_updated: s.last_updated,
                reading_count: s.reading_count,
            };
            self.writer.serialize(row).map_err(|e| self.csv_error(e))?;
        }
        self.finish(summaries.len(), "site summaries")
    }

    pub fn write_rolling_series(
        &mut self,
        parameter: Parameter,
        series: &[RollingPoint],
    ) -> Result<(), SentryError> {
        for point in series {
            let row = RollingRow {
                timestamp: point.timestamp,
                parameter,
                value: point.value,
                rolling_mean: point.rolling_mean,
                rolling_std: point.rolling_std,
            };
            self.writer.serialize(row).map_err(|e| self.csv_error(e))?;
        }
        self.finish(series.len(), "rolling series")
    }

    pub fn into_inner(self) -> Result<W, SentryError> {
        let target = self.target;
        self.writer
            .into_inner()
            .map_err(|e| SentryError::FileIO(target, e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::aggregate_sites,
        testing::{base_time, reading},
        trend::rolling_series,
    };
    use rosentry_schemas::units::UnitSystem;

    fn written(f: impl FnOnce(&mut TableWriter<Vec<u8>>)) -> String {
        let mut writer = TableWriter::from_writer("memory", Vec::new());
        f(&mut writer);
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn file_names_carry_a_sortable_timestamp() {
        let at = base_time() + chrono::Duration::seconds(3 * 3600 + 4 * 60 + 5);
        assert_eq!(
            timestamped_file_name("site_summary", at),
            "site_summary_20240601_030405.csv"
        );
    }

    #[test]
    fn readings_use_canonical_headers() {
        let mut r = reading(1, 0, 60.0);
        r.conductivity = None;
        let out = written(|w| w.write_readings(&[r]).unwrap());
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp,site_id,site_name,latitude,longitude,pressure,pressure_unit,\
             flow_feed,flow_product,flow_waste,flow_unit,conductivity,temperature,recovery_rate"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2024-06-01T00:00:00,1,Site 1,21.0,51.0,60.0,bar,115.0,86.25,28.75,m3_per_hour,,25.0,75.0"
        );
    }

    #[test]
    fn summaries_flatten_units_into_columns() {
        let summaries =
            aggregate_sites(&[reading(1, 0, 60.0), reading(2, 0, 70.0)], &UnitSystem::default())
                .unwrap();
        let out = written(|w| w.write_summaries(&summaries).unwrap());
        assert_eq!(out.lines().count(), 3);
        assert!(out.lines().next().unwrap().contains("pressure_unit"));
        assert!(out.contains(",bar,"));
    }

    #[test]
    fn rolling_series_rows_leave_warmup_stats_blank() {
        let readings: Vec<Reading> = (0..3).map(|h| reading(1, h, 60.0 + h as f64)).collect();
        let series =
            rolling_series(&readings, Parameter::Pressure, 2, &UnitSystem::default()).unwrap();
        let out = written(|w| w.write_rolling_series(Parameter::Pressure, &series).unwrap());
        let rows: Vec<&str> = out.lines().collect();
        assert_eq!(rows[0], "timestamp,parameter,value,rolling_mean,rolling_std");
        assert_eq!(rows[1], "2024-06-01T00:00:00,pressure,60.0,,");
        assert!(rows[2].starts_with("2024-06-01T01:00:00,pressure,61.0,60.5,"));
    }

    #[test]
    fn create_timestamped_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, path) =
            TableWriter::create_timestamped(dir.path(), "readings", base_time()).unwrap();
        writer.write_readings(&[reading(1, 0, 60.0)]).unwrap();
        drop(writer);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "readings_20240601_000000.csv"
        );
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn unwritable_path_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no_such_dir").join("out.csv");
        assert!(matches!(
            TableWriter::create(missing),
            Err(SentryError::FileIO(_, _))
        ));
    }
}
