pub mod file_formats;
pub mod reading;
pub mod site;
pub mod source;
pub mod thresholds;
pub mod units;
