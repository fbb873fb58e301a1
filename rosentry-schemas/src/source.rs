use crate::units::{FlowUnit, PressureUnit};
use serde::{Deserialize, Serialize};

/// A field of the canonical reading layout, as it can appear in a raw table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    SiteId,
    SiteName,
    Latitude,
    Longitude,
    Pressure,
    PressureUnit,
    FlowFeed,
    FlowProduct,
    FlowWaste,
    FlowUnit,
    Conductivity,
    Temperature,
    RecoveryRate,
}

impl CanonicalField {
    pub fn canonical_name(&self) -> &'static str {
        match self {
            CanonicalField::SiteId => "site_id",
            CanonicalField::SiteName => "site_name",
            CanonicalField::Latitude => "latitude",
            CanonicalField::Longitude => "longitude",
            CanonicalField::Pressure => "pressure",
            CanonicalField::PressureUnit => "pressure_unit",
            CanonicalField::FlowFeed => "flow_feed",
            CanonicalField::FlowProduct => "flow_product",
            CanonicalField::FlowWaste => "flow_waste",
            CanonicalField::FlowUnit => "flow_unit",
            CanonicalField::Conductivity => "conductivity",
            CanonicalField::Temperature => "temperature",
            CanonicalField::RecoveryRate => "recovery_rate",
        }
    }
}

/// Source column name for each canonical field. Unmapped fields are looked up
/// under their canonical name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnMapping {
    pub site_id: Option<String>,
    pub site_name: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub pressure: Option<String>,
    pub pressure_unit: Option<String>,
    pub flow_feed: Option<String>,
    pub flow_product: Option<String>,
    pub flow_waste: Option<String>,
    pub flow_unit: Option<String>,
    pub conductivity: Option<String>,
    pub temperature: Option<String>,
    pub recovery_rate: Option<String>,
}

impl ColumnMapping {
    /// The explicitly declared source column for `field`, if any.
    pub fn declared(&self, field: CanonicalField) -> Option<&str> {
        let declared = match field {
            CanonicalField::SiteId => &self.site_id,
            CanonicalField::SiteName => &self.site_name,
            CanonicalField::Latitude => &self.latitude,
            CanonicalField::Longitude => &self.longitude,
            CanonicalField::Pressure => &self.pressure,
            CanonicalField::PressureUnit => &self.pressure_unit,
            CanonicalField::FlowFeed => &self.flow_feed,
            CanonicalField::FlowProduct => &self.flow_product,
            CanonicalField::FlowWaste => &self.flow_waste,
            CanonicalField::FlowUnit => &self.flow_unit,
            CanonicalField::Conductivity => &self.conductivity,
            CanonicalField::Temperature => &self.temperature,
            CanonicalField::RecoveryRate => &self.recovery_rate,
        };
        declared.as_deref()
    }

    pub fn column_for(&self, field: CanonicalField) -> &str {
        self.declared(field).unwrap_or_else(|| field.canonical_name())
    }
}

/// Where the point in time of a row comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum TimestampLayout {
    Combined {
        column: String,
        #[serde(default)]
        format: Option<String>,
    },
    Split {
        date_column: String,
        time_column: String,
        #[serde(default)]
        date_format: Option<String>,
        #[serde(default)]
        time_format: Option<String>,
    },
}

impl Default for TimestampLayout {
    fn default() -> Self {
        TimestampLayout::Combined {
            column: "timestamp".to_string(),
            format: None,
        }
    }
}

fn default_day_first() -> bool {
    true
}

/// Declared shape of one raw input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    #[serde(default)]
    pub columns: ColumnMapping,
    #[serde(default)]
    pub timestamp: TimestampLayout,
    /// Selects day-first over month-first for ambiguous dates like `03/04/2024`.
    #[serde(default = "default_day_first")]
    pub day_first: bool,
    /// Fixed offset such as `+04:00`. When set, timestamps are converted to UTC.
    #[serde(default)]
    pub utc_offset: Option<String>,
    #[serde(default)]
    pub pressure_unit: PressureUnit,
    #[serde(default)]
    pub flow_unit: FlowUnit,
}

impl SourceSpec {
    /// A source already laid out in canonical column names.
    pub fn canonical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: ColumnMapping::default(),
            timestamp: TimestampLayout::default(),
            day_first: default_day_first(),
            utc_offset: None,
            pressure_unit: PressureUnit::default(),
            flow_unit: FlowUnit::default(),
        }
    }
}
