//! Data merger: concatenates normalized tables, deduplicates, orders and filters them.

use crate::error::SentryError;
use chrono::{Duration, NaiveDateTime};
use rosentry_schemas::reading::Reading;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inclusive time bounds. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Trailing windows offered by the dashboards' range selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePreset {
    LastDay,
    LastWeek,
    LastMonth,
    LastQuarter,
}

impl TimePreset {
    pub fn duration(&self) -> Duration {
        match self {
            TimePreset::LastDay => Duration::days(1),
            TimePreset::LastWeek => Duration::days(7),
            TimePreset::LastMonth => Duration::days(30),
            TimePreset::LastQuarter => Duration::days(90),
        }
    }
}

impl TimeRange {
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// The window of `preset` length ending at `anchor`.
    pub fn preset(preset: TimePreset, anchor: NaiveDateTime) -> Self {
        Self::between(anchor - preset.duration(), anchor)
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

/// Merges tables in the order given.
///
/// Rows sharing `(timestamp, site_id)` collapse to the last one seen, so a live
/// feed passed after the historical table overrides it. The result is sorted by
/// timestamp, then site id. If `range` filters every row away this is
/// [`SentryError::NoData`]; without a range an empty input yields an empty table.
pub fn merge_tables(
    tables: Vec<Vec<Reading>>,
    range: Option<&TimeRange>,
) -> Result<Vec<Reading>, SentryError> {
    let total: usize = tables.iter().map(Vec::len).sum();
    let mut merged: Vec<Reading> = Vec::with_capacity(total);
    let mut positions: HashMap<(NaiveDateTime, u32), usize> = HashMap::with_capacity(total);

    for reading in tables.into_iter().flatten() {
        match positions.get(&(reading.timestamp, reading.site_id)) {
            Some(&pos) => merged[pos] = reading,
            None => {
                positions.insert((reading.timestamp, reading.site_id), merged.len());
                merged.push(reading);
            }
        }
    }
    let duplicates = total - merged.len();

    merged.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.site_id.cmp(&b.site_id))
    });

    if let Some(range) = range {
        merged.retain(|r| range.contains(r.timestamp));
        if merged.is_empty() {
            return Err(SentryError::NoData(format!(
                "no readings between {} and {}",
                range.start.map_or("the beginning".to_string(), |s| s.to_string()),
                range.end.map_or("the end".to_string(), |e| e.to_string()),
            )));
        }
    }

    tracing::debug!(rows = merged.len(), duplicates, "merged tables");
    Ok(merged)
}

/// Latest timestamp across `readings`, used to anchor relative presets.
pub fn latest_timestamp(readings: &[Reading]) -> Option<NaiveDateTime> {
    readings.iter().map(|r| r.timestamp).max()
}
