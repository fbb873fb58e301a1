use crate::units::{FlowUnit, PressureUnit, UnitSystem};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A monitored physical quantity on an RO train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Pressure,
    FlowFeed,
    FlowProduct,
    FlowWaste,
    Conductivity,
    Temperature,
    RecoveryRate,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Parameter::Pressure,
        Parameter::FlowFeed,
        Parameter::FlowProduct,
        Parameter::FlowWaste,
        Parameter::Conductivity,
        Parameter::Temperature,
        Parameter::RecoveryRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Pressure => "pressure",
            Parameter::FlowFeed => "flow_feed",
            Parameter::FlowProduct => "flow_product",
            Parameter::FlowWaste => "flow_waste",
            Parameter::Conductivity => "conductivity",
            Parameter::Temperature => "temperature",
            Parameter::RecoveryRate => "recovery_rate",
        }
    }

    /// Human label, e.g. "Flow Feed".
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parameter::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| format!("unknown parameter '{}'", s))
    }
}

/// One timestamped sensor snapshot for one site, in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub site_id: u32,
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pressure: f64,
    pub pressure_unit: PressureUnit,
    pub flow_feed: f64,
    pub flow_product: f64,
    pub flow_waste: f64,
    pub flow_unit: FlowUnit,
    pub conductivity: Option<f64>,
    pub temperature: Option<f64>,
    pub recovery_rate: f64,
}

impl Reading {
    /// Value of `parameter` converted into `units`. `None` for an absent optional field.
    pub fn value(&self, parameter: Parameter, units: &UnitSystem) -> Option<f64> {
        let flow = |v: f64| self.flow_unit.convert(v, units.flow);
        match parameter {
            Parameter::Pressure => Some(self.pressure_unit.convert(self.pressure, units.pressure)),
            Parameter::FlowFeed => Some(flow(self.flow_feed)),
            Parameter::FlowProduct => Some(flow(self.flow_product)),
            Parameter::FlowWaste => Some(flow(self.flow_waste)),
            Parameter::Conductivity => self.conductivity,
            Parameter::Temperature => self.temperature,
            Parameter::RecoveryRate => Some(self.recovery_rate),
        }
    }

    /// Feed minus product minus waste, in the reading's own flow unit.
    pub fn flow_balance(&self) -> f64 {
        self.flow_feed - self.flow_product - self.flow_waste
    }
}

/// Clamps a recovery percentage into `[0, 100]`; non-finite input becomes 0.
pub fn clamp_recovery(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// `flow_product / flow_feed * 100`, clamped. A non-positive feed yields 0.
pub fn derive_recovery_rate(flow_feed: f64, flow_product: f64) -> f64 {
    if flow_feed.is_nan() || flow_feed <= 0.0 {
        return 0.0;
    }
    clamp_recovery(flow_product / flow_feed * 100.0)
}
