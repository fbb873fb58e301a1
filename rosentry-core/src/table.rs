//! Untyped tabular input as read from disk, before any schema mapping.

use crate::error::SentryError;
use std::{fs::File, io, path::Path};

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub source_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(source_name: &str, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            source_name: source_name.to_string(),
            headers,
            rows,
        }
    }

    /// Reads a headered CSV file. The file name becomes the source name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SentryError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let file = File::open(path).map_err(|e| SentryError::FileIO(display.clone(), e))?;
        Self::from_reader(&display, file)
    }

    pub fn from_reader<R: io::Read>(source_name: &str, reader: R) -> Result<Self, SentryError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| SentryError::CsvError(source_name.to_string(), e))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SentryError::CsvError(source_name.to_string(), e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::debug!(source = source_name, rows = rows.len(), "read raw table");
        Ok(Self::new(source_name, headers, rows))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// The trimmed cell at `(row, column)`, or `None` when it is missing or blank.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
