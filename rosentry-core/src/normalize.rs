//! Schema normalizer: maps one raw table onto the canonical [`Reading`] layout
//! according to the [`SourceSpec`] declared for it.
//!
//! Missing numeric cells are filled with the median of the same column in the same
//! raw table, before any merging. Timestamps and site identity are never imputed.

use crate::{error::SentryError, stats, table::RawTable};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rosentry_schemas::{
    reading::{clamp_recovery, derive_recovery_rate, Reading},
    site::SiteRegistry,
    source::{CanonicalField, SourceSpec, TimestampLayout},
    units::{FlowUnit, PressureUnit},
};
use std::collections::{HashMap, HashSet};

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];
const MONTH_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
    "%m.%d.%Y %H:%M:%S",
    "%m.%d.%Y %H:%M",
];
const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const MONTH_FIRST_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Normalizes `table` into canonical readings, in input row order.
///
/// A table holding only a header yields no readings once its columns resolve.
pub fn normalize(
    table: &RawTable,
    spec: &SourceSpec,
    registry: &SiteRegistry,
) -> Result<Vec<Reading>, SentryError> {
    let columns = ColumnResolver { table, spec };
    let clock = TimestampParser::new(&columns)?;

    let pressure_unit_col = columns.resolve(CanonicalField::PressureUnit)?;
    let flow_unit_col = columns.resolve(CanonicalField::FlowUnit)?;
    let mut pressure_units = Vec::with_capacity(table.len());
    let mut flow_units = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        pressure_units.push(columns.unit_cell(
            pressure_unit_col,
            row,
            spec.pressure_unit,
            PressureUnit::parse,
            "pressure unit",
        )?);
        flow_units.push(columns.unit_cell(
            flow_unit_col,
            row,
            spec.flow_unit,
            FlowUnit::parse,
            "flow unit",
        )?);
    }
    // Per-row factors into the source's declared units, so medians never mix units.
    let pressure_scale: Vec<f64> = pressure_units
        .iter()
        .map(|u| u.convert(1.0, spec.pressure_unit))
        .collect();
    let flow_scale: Vec<f64> = flow_units
        .iter()
        .map(|u| u.convert(1.0, spec.flow_unit))
        .collect();

    let pressure = columns.required_numeric(CanonicalField::Pressure, Some(&pressure_scale))?;
    let flow_feed = columns.required_numeric(CanonicalField::FlowFeed, Some(&flow_scale))?;
    let flow_product = columns.required_numeric(CanonicalField::FlowProduct, Some(&flow_scale))?;
    let flow_waste = columns.optional_numeric(CanonicalField::FlowWaste, Some(&flow_scale))?;
    let conductivity = columns.optional_numeric(CanonicalField::Conductivity, None)?;
    let temperature = columns.optional_numeric(CanonicalField::Temperature, None)?;
    let recovery_col = columns.resolve(CanonicalField::RecoveryRate)?;

    let identities = resolve_sites(&columns, registry)?;
    let coordinates = resolve_coordinates(&columns, &identities, registry)?;

    let mut derived_recovery = 0usize;
    let mut readings = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let timestamp = clock.parse_row(row)?;
        let (site_id, site_name) = identities[row].clone();
        let (latitude, longitude) = coordinates[row];

        let pressure_unit = pressure_units[row];
        let flow_unit = flow_units[row];

        let feed = flow_feed[row];
        let product = flow_product[row];
        let waste = match &flow_waste {
            Some(values) => values[row],
            None => (feed - product).max(0.0),
        };

        let provided_recovery = recovery_col.and_then(|c| parse_number(table.cell(row, c)));
        let recovery_rate = match provided_recovery {
            Some(value) => clamp_recovery(value),
            None => {
                derived_recovery += 1;
                derive_recovery_rate(feed, product)
            }
        };

        readings.push(Reading {
            timestamp,
            site_id,
            site_name,
            latitude,
            longitude,
            pressure: pressure[row],
            pressure_unit,
            flow_feed: feed,
            flow_product: product,
            flow_waste: waste,
            flow_unit,
            conductivity: conductivity.as_ref().map(|v| v[row]),
            temperature: temperature.as_ref().map(|v| v[row]),
            recovery_rate,
        });
    }

    tracing::debug!(
        source = %spec.name,
        rows = readings.len(),
        derived_recovery,
        "normalized source table"
    );
    Ok(readings)
}

struct ColumnResolver<'a> {
    table: &'a RawTable,
    spec: &'a SourceSpec,
}

impl<'a> ColumnResolver<'a> {
    fn error(&self, reason: impl Into<String>) -> SentryError {
        SentryError::schema(&self.spec.name, reason)
    }

    /// Index of the column backing `field`. A declared column that is missing from
    /// the table is an error; an undeclared canonical column may simply be absent.
    fn resolve(&self, field: CanonicalField) -> Result<Option<usize>, SentryError> {
        match self.spec.columns.declared(field) {
            Some(declared) => match self.table.column_index(declared) {
                Some(idx) => Ok(Some(idx)),
                None => Err(self.error(format!(
                    "declared column '{}' for '{}' is not in the table",
                    declared,
                    field.canonical_name()
                ))),
            },
            None => Ok(self.table.column_index(field.canonical_name())),
        }
    }

    /// `scale` holds per-row factors into a common unit for unit-bearing columns.
    fn required_numeric(
        &self,
        field: CanonicalField,
        scale: Option<&[f64]>,
    ) -> Result<Vec<f64>, SentryError> {
        let column = self.spec.columns.column_for(field).to_string();
        let idx = self
            .resolve(field)?
            .ok_or_else(|| self.error(format!("required column '{}' is absent", column)))?;
        if self.table.is_empty() {
            return Ok(Vec::new());
        }
        self.median_filled(idx, &column, scale).ok_or_else(|| {
            self.error(format!("required column '{}' has no numeric values", column))
        })
    }

    fn optional_numeric(
        &self,
        field: CanonicalField,
        scale: Option<&[f64]>,
    ) -> Result<Option<Vec<f64>>, SentryError> {
        let Some(idx) = self.resolve(field)? else {
            return Ok(None);
        };
        if self.table.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let column = self.spec.columns.column_for(field);
        let filled = self.median_filled(idx, column, scale);
        if filled.is_none() {
            tracing::warn!(
                source = %self.spec.name,
                column,
                "optional column has no numeric values, treating it as absent"
            );
        }
        Ok(filled)
    }

    /// Parses a numeric column, filling blank or unparseable cells with the column
    /// median. With a `scale`, the median is taken in the common unit and converted
    /// back into each filled row's own unit. `None` when the column holds no numeric
    /// value at all.
    fn median_filled(&self, idx: usize, column: &str, scale: Option<&[f64]>) -> Option<Vec<f64>> {
        let factor = |row: usize| scale.map_or(1.0, |s| s[row]);
        let parsed: Vec<Option<f64>> = (0..self.table.len())
            .map(|row| parse_number(self.table.cell(row, idx)))
            .collect();
        let present: Vec<f64> = parsed
            .iter()
            .enumerate()
            .filter_map(|(row, v)| v.map(|v| v * factor(row)))
            .collect();
        let median = stats::median(&present)?;

        let missing = parsed.len() - present.len();
        if missing > 0 {
            tracing::info!(
                source = %self.spec.name,
                column,
                missing,
                median,
                "filled missing values with column median"
            );
        }
        Some(
            parsed
                .into_iter()
                .enumerate()
                .map(|(row, v)| v.unwrap_or_else(|| median / factor(row)))
                .collect(),
        )
    }

    fn unit_cell<U: Copy>(
        &self,
        column: Option<usize>,
        row: usize,
        default: U,
        parse: fn(&str) -> Option<U>,
        what: &str,
    ) -> Result<U, SentryError> {
        match column.and_then(|c| self.table.cell(row, c)) {
            Some(raw) => parse(raw).ok_or_else(|| {
                self.error(format!("row {}: unknown {} '{}'", row + 1, what, raw))
            }),
            None => Ok(default),
        }
    }
}

fn parse_number(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|c| c.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

enum ResolvedClock {
    Combined {
        column: usize,
        format: Option<String>,
    },
    Split {
        date_column: usize,
        time_column: usize,
        date_format: Option<String>,
        time_format: Option<String>,
    },
}

/// A parsed point in time: either naive local, or already shifted to UTC because
/// the cell carried its own offset.
enum ParsedTime {
    Local(NaiveDateTime),
    Utc(NaiveDateTime),
}

struct TimestampParser<'a> {
    columns: &'a ColumnResolver<'a>,
    clock: ResolvedClock,
    /// Seconds east of UTC for naive values, from the source's declared offset.
    offset_secs: Option<i64>,
}

impl<'a> TimestampParser<'a> {
    fn new(columns: &'a ColumnResolver<'a>) -> Result<Self, SentryError> {
        let find = |name: &str| {
            columns.table.column_index(name).ok_or_else(|| {
                columns.error(format!("no recognizable timestamp column '{}'", name))
            })
        };
        let clock = match &columns.spec.timestamp {
            TimestampLayout::Combined { column, format } => ResolvedClock::Combined {
                column: find(column)?,
                format: format.clone(),
            },
            TimestampLayout::Split {
                date_column,
                time_column,
                date_format,
                time_format,
            } => ResolvedClock::Split {
                date_column: find(date_column)?,
                time_column: find(time_column)?,
                date_format: date_format.clone(),
                time_format: time_format.clone(),
            },
        };
        let offset_secs = match &columns.spec.utc_offset {
            Some(raw) => Some(
                parse_utc_offset(raw)
                    .ok_or_else(|| columns.error(format!("invalid utc_offset '{}'", raw)))?,
            ),
            None => None,
        };
        Ok(Self {
            columns,
            clock,
            offset_secs,
        })
    }

    fn parse_row(&self, row: usize) -> Result<NaiveDateTime, SentryError> {
        let table = self.columns.table;
        let day_first = self.columns.spec.day_first;
        let (raw, parsed) = match &self.clock {
            ResolvedClock::Combined { column, format } => {
                let raw = table.cell(row, *column).unwrap_or_default().to_string();
                let parsed = parse_datetime(&raw, format.as_deref(), day_first);
                (raw, parsed)
            }
            ResolvedClock::Split {
                date_column,
                time_column,
                date_format,
                time_format,
            } => {
                let date = table.cell(row, *date_column).unwrap_or_default();
                let time = table.cell(row, *time_column).unwrap_or_default();
                let parsed = parse_date(date, date_format.as_deref(), day_first)
                    .zip(parse_time(time, time_format.as_deref()))
                    .map(|(d, t)| ParsedTime::Local(d.and_time(t)));
                (format!("{} {}", date, time), parsed)
            }
        };

        match parsed {
            Some(ParsedTime::Utc(ts)) => Ok(ts),
            Some(ParsedTime::Local(ts)) => Ok(match self.offset_secs {
                Some(secs) => ts - Duration::seconds(secs),
                None => ts,
            }),
            None => Err(self.columns.error(format!(
                "row {}: unparseable timestamp '{}'",
                row + 1,
                raw.trim()
            ))),
        }
    }
}

fn parse_datetime(raw: &str, format: Option<&str>, day_first: bool) -> Option<ParsedTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(fmt) = format {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(ParsedTime::Utc(dt.naive_utc()));
        }
        return NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(raw, fmt)
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
            .map(ParsedTime::Local);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(ParsedTime::Utc(dt.naive_utc()));
    }
    let ordered = if day_first {
        DAY_FIRST_DATETIME_FORMATS
    } else {
        MONTH_FIRST_DATETIME_FORMATS
    };
    ISO_DATETIME_FORMATS
        .iter()
        .chain(ordered)
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_date(raw, None, day_first).map(|d| d.and_time(NaiveTime::MIN)))
        .map(ParsedTime::Local)
}

fn parse_date(raw: &str, format: Option<&str>, day_first: bool) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(fmt) = format {
        return NaiveDate::parse_from_str(raw, fmt).ok();
    }
    let ordered = if day_first {
        DAY_FIRST_DATE_FORMATS
    } else {
        MONTH_FIRST_DATE_FORMATS
    };
    ISO_DATE_FORMATS
        .iter()
        .chain(ordered)
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn parse_time(raw: &str, format: Option<&str>) -> Option<NaiveTime> {
    let raw = raw.trim();
    if let Some(fmt) = format {
        return NaiveTime::parse_from_str(raw, fmt).ok();
    }
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
}

/// Parses `+HH:MM`, `-HHMM`, `Z` or `UTC` into seconds east of UTC.
fn parse_utc_offset(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Some(0);
    }
    let (sign, rest) = match raw.chars().next()? {
        '+' => (1, &raw[1..]),
        '-' => (-1, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i64 = digits[..2].parse().ok()?;
    let minutes: i64 = digits[2..].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

/// Resolves `(site_id, site_name)` for every row.
///
/// With a site id column the id is the identity and the name is a label taken from
/// the row, the first name seen for that id, the registry, or `Site <id>` in that
/// order. With only a name column, ids come from the registry or are assigned
/// 1-based in first-seen order, skipping ids the registry already uses.
fn resolve_sites(
    columns: &ColumnResolver<'_>,
    registry: &SiteRegistry,
) -> Result<Vec<(u32, String)>, SentryError> {
    let table = columns.table;
    let id_col = columns.resolve(CanonicalField::SiteId)?;
    let name_col = columns.resolve(CanonicalField::SiteName)?;

    match (id_col, name_col) {
        (None, None) => Err(columns.error("no site_id or site_name column")),
        (Some(id_col), name_col) => {
            let mut ids = Vec::with_capacity(table.len());
            for row in 0..table.len() {
                let raw = table.cell(row, id_col).ok_or_else(|| {
                    columns.error(format!("row {}: missing site id", row + 1))
                })?;
                let id = parse_site_id(raw).ok_or_else(|| {
                    columns.error(format!("row {}: invalid site id '{}'", row + 1, raw))
                })?;
                ids.push(id);
            }

            let row_name = |row: usize| name_col.and_then(|c| table.cell(row, c));
            let mut first_names: HashMap<u32, String> = HashMap::new();
            for (row, id) in ids.iter().enumerate() {
                if let Some(name) = row_name(row) {
                    first_names.entry(*id).or_insert_with(|| name.to_string());
                }
            }

            Ok(ids
                .iter()
                .enumerate()
                .map(|(row, id)| {
                    let name = row_name(row)
                        .map(str::to_string)
                        .or_else(|| first_names.get(id).cloned())
                        .or_else(|| registry.by_id(*id).map(|p| p.site_name.clone()))
                        .unwrap_or_else(|| format!("Site {}", id));
                    (*id, name)
                })
                .collect())
        }
        (None, Some(name_col)) => {
            let mut assigned: HashMap<String, u32> = HashMap::new();
            let mut used: HashSet<u32> = HashSet::new();
            let mut next_id = 1u32;
            let mut identities = Vec::with_capacity(table.len());

            for row in 0..table.len() {
                let name = table.cell(row, name_col).ok_or_else(|| {
                    columns.error(format!("row {}: missing site name", row + 1))
                })?;
                let id = match assigned.get(name) {
                    Some(id) => *id,
                    None => {
                        let id = match registry.by_name(name) {
                            Some(profile) => profile.site_id,
                            None => {
                                while used.contains(&next_id) || registry.by_id(next_id).is_some() {
                                    next_id += 1;
                                }
                                next_id
                            }
                        };
                        used.insert(id);
                        assigned.insert(name.to_string(), id);
                        id
                    }
                };
                identities.push((id, name.to_string()));
            }
            Ok(identities)
        }
    }
}

/// Accepts integral ids written as `7` or `7.0`.
fn parse_site_id(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u32::MAX as f64)
            .map(|v| v as u32)
    })
}

/// Coordinates are site-fixed, so gaps are filled from the same site's first
/// observed coordinates in this table, then from the registry. Never from a median.
fn resolve_coordinates(
    columns: &ColumnResolver<'_>,
    identities: &[(u32, String)],
    registry: &SiteRegistry,
) -> Result<Vec<(f64, f64)>, SentryError> {
    let table = columns.table;
    let lat_col = columns.resolve(CanonicalField::Latitude)?;
    let lon_col = columns.resolve(CanonicalField::Longitude)?;
    let cell = |col: Option<usize>, row: usize| parse_number(col.and_then(|c| table.cell(row, c)));

    let mut first_seen: HashMap<u32, (Option<f64>, Option<f64>)> = HashMap::new();
    for (row, (id, _)) in identities.iter().enumerate() {
        let entry = first_seen.entry(*id).or_insert((None, None));
        if entry.0.is_none() {
            entry.0 = cell(lat_col, row);
        }
        if entry.1.is_none() {
            entry.1 = cell(lon_col, row);
        }
    }

    let mut coordinates = Vec::with_capacity(identities.len());
    for (row, (id, name)) in identities.iter().enumerate() {
        let seen = first_seen.get(id).copied().unwrap_or((None, None));
        let profile = registry.by_id(*id);
        let latitude = cell(lat_col, row)
            .or(seen.0)
            .or(profile.map(|p| p.latitude));
        let longitude = cell(lon_col, row)
            .or(seen.1)
            .or(profile.map(|p| p.longitude));
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => coordinates.push((lat, lon)),
            _ => {
                return Err(columns.error(format!(
                    "no coordinates for site {} ('{}')",
                    id, name
                )))
            }
        }
    }
    Ok(coordinates)
}
