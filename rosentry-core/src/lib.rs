pub mod aggregate;
pub mod error;
pub mod export;
pub mod kpi;
pub mod maintenance;
pub mod merge;
pub mod normalize;
pub mod statistics;
pub mod table;
pub mod trend;

mod stats;

#[cfg(test)]
mod testing;
