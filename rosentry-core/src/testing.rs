use chrono::{Duration, NaiveDate, NaiveDateTime};
use rosentry_schemas::{
    reading::Reading,
    units::{FlowUnit, PressureUnit},
};

pub(crate) fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// A nominal reading for `site_id` at `hour` hours after the base time.
pub(crate) fn reading(site_id: u32, hour: i64, pressure: f64) -> Reading {
    Reading {
        timestamp: base_time() + Duration::hours(hour),
        site_id,
        site_name: format!("Site {}", site_id),
        latitude: 20.0 + site_id as f64,
        longitude: 50.0 + site_id as f64,
        pressure,
        pressure_unit: PressureUnit::Bar,
        flow_feed: 115.0,
        flow_product: 86.25,
        flow_waste: 28.75,
        flow_unit: FlowUnit::M3PerHour,
        conductivity: Some(455.0),
        temperature: Some(25.0),
        recovery_rate: 75.0,
    }
}
