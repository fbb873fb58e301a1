use crate::{
    site::SiteProfile,
    source::SourceSpec,
    thresholds::{EfficiencyConfig, MaintenanceConfig},
    units::UnitSystem,
};
use serde::Deserialize;

/// Whether a source holds settled history or a periodically rewritten live feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    #[default]
    Historical,
    Live,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub path: String,
    #[serde(default)]
    pub role: SourceRole,
    #[serde(flatten)]
    pub spec: SourceSpec,
}

#[derive(Debug, Deserialize)]
pub struct PipelineFile {
    pub schema_version: String,
    /// Units used for site summaries.
    #[serde(default)]
    pub units: UnitSystem,
    #[serde(default)]
    pub sites: Vec<SiteProfile>,
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub efficiency: EfficiencyConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}
