use crate::{reading::Parameter, units::UnitSystem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operating band and trend tolerance for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterThreshold {
    pub low: f64,
    pub high: f64,
    /// Largest tolerated per-step change of the rolling mean.
    pub trend_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdSet(pub BTreeMap<Parameter, ParameterThreshold>);

impl ThresholdSet {
    pub fn get(&self, parameter: Parameter) -> Option<&ParameterThreshold> {
        self.0.get(&parameter)
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        self.0.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Parameter, &ParameterThreshold)> {
        self.0.iter()
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        let band = |low, high, trend_threshold| ParameterThreshold {
            low,
            high,
            trend_threshold,
        };
        ThresholdSet(BTreeMap::from([
            (Parameter::Pressure, band(55.0, 75.0, 0.5)),
            (Parameter::FlowFeed, band(105.0, 125.0, 0.3)),
            (Parameter::Conductivity, band(420.0, 490.0, 2.0)),
            (Parameter::RecoveryRate, band(70.0, 80.0, 0.5)),
        ]))
    }
}

/// Constants of the composite efficiency score. The ideal band differs per membrane system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficiencyConfig {
    pub recovery_low: f64,
    pub recovery_high: f64,
    pub pressure_center: f64,
    pub pressure_span: f64,
    pub recovery_weight: f64,
    pub pressure_weight: f64,
    pub units: UnitSystem,
}

impl Default for EfficiencyConfig {
    fn default() -> Self {
        Self {
            recovery_low: 70.0,
            recovery_high: 100.0,
            pressure_center: 60.0,
            pressure_span: 20.0,
            recovery_weight: 0.6,
            pressure_weight: 0.4,
            units: UnitSystem::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub window_size: usize,
    pub units: UnitSystem,
    pub thresholds: ThresholdSet,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            units: UnitSystem::default(),
            thresholds: ThresholdSet::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "
window_size: 3
thresholds:
  pressure: { low: 480, high: 520, trend_threshold: 1.5 }
";
        let config: MaintenanceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.window_size, 3);
        assert_eq!(config.units, UnitSystem::default());
        assert_eq!(config.thresholds.parameters(), vec![Parameter::Pressure]);
        assert_eq!(config.thresholds.get(Parameter::Pressure).unwrap().high, 520.0);
    }

    #[test]
    fn efficiency_defaults_match_seventy_to_hundred_band() {
        let config: EfficiencyConfig = serde_yaml::from_str("recovery_low: 95").unwrap();
        assert_eq!(config.recovery_low, 95.0);
        assert_eq!(config.recovery_high, 100.0);
        assert_eq!(config.pressure_weight, 0.4);
    }
}
