use anyhow::{bail, Context, Result};
use rosentry_core::kpi::validate_efficiency_config;
use rosentry_schemas::{
    file_formats::{PipelineFile, SourceEntry, SourceRole},
    site::SiteRegistry,
    thresholds::{EfficiencyConfig, MaintenanceConfig},
    units::UnitSystem,
};
use std::{
    fs,
    path::{Path, PathBuf},
};

const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["1", "1.0"];

/// Everything a pipeline run needs, loaded once from the YAML pipeline file and
/// passed explicitly into each stage.
pub struct PipelineConfig {
    pub units: UnitSystem,
    pub registry: SiteRegistry,
    /// Historical sources first, then live ones, each group in file order.
    pub sources: Vec<SourceEntry>,
    pub efficiency: EfficiencyConfig,
    pub maintenance: MaintenanceConfig,
}

impl PipelineConfig {
    /// Loads the pipeline file. Relative source paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading pipeline config");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {:?}", path))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&content, base_dir)
            .with_context(|| format!("Invalid pipeline config {:?}", path))
    }

    pub fn from_yaml(content: &str, base_dir: &Path) -> Result<Self> {
        let file: PipelineFile =
            serde_yaml::from_str(content).context("Failed to parse pipeline YAML")?;

        if !SUPPORTED_SCHEMA_VERSIONS.contains(&file.schema_version.as_str()) {
            bail!("unsupported schema_version '{}'", file.schema_version);
        }
        if file.sources.is_empty() {
            bail!("at least one source is required");
        }
        validate_efficiency_config(&file.efficiency)?;
        if file.maintenance.window_size == 0 {
            bail!("maintenance.window_size must be at least 1");
        }
        for site in &file.sites {
            if file.sites.iter().filter(|s| s.site_id == site.site_id).count() > 1 {
                bail!("site id {} is declared more than once", site.site_id);
            }
            if file.sites.iter().filter(|s| s.site_name == site.site_name).count() > 1 {
                bail!("site name '{}' is declared more than once", site.site_name);
            }
        }

        let mut sources = file.sources;
        for source in &mut sources {
            let resolved: PathBuf = base_dir.join(&source.path);
            source.path = resolved.to_string_lossy().into_owned();
        }
        // Stable, so file order survives within each role.
        sources.sort_by_key(|s| s.role == SourceRole::Live);

        tracing::info!(
            sources = sources.len(),
            sites = file.sites.len(),
            "pipeline config loaded"
        );
        Ok(Self {
            units: file.units,
            registry: SiteRegistry::new(file.sites),
            sources,
            efficiency: file.efficiency,
            maintenance: file.maintenance,
        })
    }
}
