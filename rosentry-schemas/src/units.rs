use serde::{Deserialize, Serialize};
use std::fmt;

/// Pounds per square inch in one bar.
const PSI_PER_BAR: f64 = 14.503_773_8;
/// Kilopascals in one bar.
const KPA_PER_BAR: f64 = 100.0;
/// Cubic metres per hour in one US gallon per minute.
const M3H_PER_GPM: f64 = 0.227_124_7;
/// Cubic metres per hour in one litre per minute.
const M3H_PER_LMIN: f64 = 0.06;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureUnit {
    #[default]
    Bar,
    Psi,
    Kpa,
}

impl PressureUnit {
    fn bar_per_unit(self) -> f64 {
        match self {
            PressureUnit::Bar => 1.0,
            PressureUnit::Psi => 1.0 / PSI_PER_BAR,
            PressureUnit::Kpa => 1.0 / KPA_PER_BAR,
        }
    }

    /// Converts `value` expressed in `self` into `target`.
    pub fn convert(self, value: f64, target: PressureUnit) -> f64 {
        if self == target {
            return value;
        }
        value * self.bar_per_unit() / target.bar_per_unit()
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bar" => Some(PressureUnit::Bar),
            "psi" => Some(PressureUnit::Psi),
            "kpa" => Some(PressureUnit::Kpa),
            _ => None,
        }
    }
}

impl fmt::Display for PressureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            PressureUnit::Bar => "bar",
            PressureUnit::Psi => "psi",
            PressureUnit::Kpa => "kPa",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowUnit {
    #[default]
    M3PerHour,
    Gpm,
    LPerMin,
}

impl FlowUnit {
    fn m3h_per_unit(self) -> f64 {
        match self {
            FlowUnit::M3PerHour => 1.0,
            FlowUnit::Gpm => M3H_PER_GPM,
            FlowUnit::LPerMin => M3H_PER_LMIN,
        }
    }

    /// Converts `value` expressed in `self` into `target`.
    pub fn convert(self, value: f64, target: FlowUnit) -> f64 {
        if self == target {
            return value;
        }
        value * self.m3h_per_unit() / target.m3h_per_unit()
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "m3_per_hour" | "m3/h" | "m³/h" => Some(FlowUnit::M3PerHour),
            "gpm" => Some(FlowUnit::Gpm),
            "l_per_min" | "l/min" => Some(FlowUnit::LPerMin),
            _ => None,
        }
    }
}

impl fmt::Display for FlowUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            FlowUnit::M3PerHour => "m³/h",
            FlowUnit::Gpm => "gpm",
            FlowUnit::LPerMin => "L/min",
        };
        f.write_str(symbol)
    }
}

/// The units thresholds, efficiency constants and aggregates are expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSystem {
    #[serde(default)]
    pub pressure: PressureUnit,
    #[serde(default)]
    pub flow: FlowUnit,
}
