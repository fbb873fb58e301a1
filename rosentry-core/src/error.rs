use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentryError {
    #[error("Source '{source_name}' cannot be mapped to the canonical schema: {reason}")]
    Schema { source_name: String, reason: String },

    #[error("No data: {0}")]
    NoData(String),

    #[error("Site {site_id} has inconsistent {field} across its readings")]
    InconsistentSite { site_id: u32, field: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error for file '{0}': {1}")]
    FileIO(String, #[source] std::io::Error),

    #[error("Failed to process CSV file '{0}': {1}")]
    CsvError(String, #[source] csv::Error),
}

impl SentryError {
    pub(crate) fn schema(source_name: &str, reason: impl Into<String>) -> Self {
        SentryError::Schema {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }
}
