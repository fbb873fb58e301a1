//! Seeded synthetic plant feeds shared by the integration tests.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt::Write as _;

pub const SITES: [(u32, &str, f64, f64); 3] = [
    (1, "Jebel Ali", 25.01, 55.06),
    (2, "Fujairah", 25.12, 56.33),
    (3, "Taweelah", 24.69, 54.73),
];

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Canonical CSV with one row per site per hour in `hours`. Recovery is left out so
/// the normalizer derives it from the flows.
pub fn canonical_feed(seed: u64, hours: std::ops::Range<i64>) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut csv = String::from(
        "timestamp,site_id,site_name,latitude,longitude,pressure,flow_feed,flow_product,conductivity,temperature\n",
    );
    for hour in hours {
        let ts = start() + Duration::hours(hour);
        for (id, name, lat, lon) in SITES {
            let feed: f64 = rng.gen_range(108.0..122.0);
            let product = feed * rng.gen_range(0.72..0.78);
            writeln!(
                csv,
                "{},{},{},{},{},{:.2},{:.2},{:.2},{:.1},{:.1}",
                ts.format("%Y-%m-%d %H:%M:%S"),
                id,
                name,
                lat,
                lon,
                rng.gen_range(58.0..68.0),
                feed,
                product,
                rng.gen_range(440.0..470.0),
                rng.gen_range(22.0..28.0),
            )
            .unwrap();
        }
    }
    csv
}

/// A vendor export for one site: split date/time columns, day-first dates, psi and gpm.
pub fn vendor_feed(seed: u64, site_name: &str, hours: std::ops::Range<i64>) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut csv = String::from("Date,Time,Plant,HP Pump (psi),Feed (gpm),Permeate (gpm),EC\n");
    for hour in hours {
        let ts = start() + Duration::hours(hour);
        let feed_gpm: f64 = rng.gen_range(480.0..530.0);
        writeln!(
            csv,
            "{},{},{},{:.1},{:.1},{:.1},{:.0}",
            ts.format("%d/%m/%Y"),
            ts.format("%H:%M"),
            site_name,
            rng.gen_range(860.0..960.0),
            feed_gpm,
            feed_gpm * 0.75,
            rng.gen_range(440.0..470.0),
        )
        .unwrap();
    }
    csv
}
