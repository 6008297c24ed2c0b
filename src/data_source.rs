//! CSV data source for data-driven requests.
//!
//! The first line of the file names the fields, every following line becomes
//! a [`DataRecord`]. Records are loaded once into an immutable shared slice;
//! request generation picks them by index so lanes never contend on a lock.
//!
//! Record selection cycles: with `K` records, request `i` (1-based) uses
//! record `(i - 1) mod K`, no matter how many requests are generated.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when loading CSV data.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Failed to read CSV data: {0}")]
    CsvReadError(#[from] csv::Error),

    #[error("Failed to open data file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV data has no data rows")]
    EmptyData,

    #[error("CSV data has no headers")]
    NoHeaders,
}

/// One row of the data file: field name to value, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRecord {
    fields: Vec<(String, String)>,
}

impl DataRecord {
    /// The record used when no data file is configured.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a record from `(field, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of a field, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(field, value)` pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for DataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// Records loaded from a CSV file.
///
/// Cloning is cheap: clones share the records and the cursor.
///
/// # Example CSV File
/// ```csv
/// id,value
/// 1,a1
/// 2,a2
/// ```
///
/// # Example Usage
/// ```rust
/// use beast_rs::data_source::DataSet;
///
/// let data = DataSet::from_string("id,value\n1,a1\n2,a2").unwrap();
/// assert_eq!(data.record_for(3).get("id"), Some("1"));
/// ```
#[derive(Clone, Debug)]
pub struct DataSet {
    headers: Arc<[String]>,
    records: Arc<[Arc<DataRecord>]>,
    cursor: Arc<AtomicUsize>,
}

impl DataSet {
    /// Load a CSV file from the given path.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, has no headers, or has no rows.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DataSourceError> {
        let path_ref = path.as_ref();
        info!(path = ?path_ref, "Loading CSV data file");

        let file = File::open(path_ref).map_err(|source| DataSourceError::IoError {
            path: path_ref.display().to_string(),
            source,
        })?;
        let data = Self::from_reader(file)?;

        info!(
            path = ?path_ref,
            rows = data.row_count(),
            columns = data.headers.len(),
            "CSV data loaded successfully"
        );

        Ok(data)
    }

    /// Create a data source from raw CSV content (useful for testing).
    pub fn from_string(csv_content: &str) -> Result<Self, DataSourceError> {
        Self::from_reader(csv_content.as_bytes())
    }

    fn from_reader<R: Read>(reader: R) -> Result<Self, DataSourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();

        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(DataSourceError::NoHeaders);
        }

        debug!(headers = ?headers, "CSV headers loaded");

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result?;
            let record = DataRecord::from_pairs(
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, header)| (header.clone(), row.get(i).unwrap_or("").to_string())),
            );
            records.push(Arc::new(record));
        }

        if records.is_empty() {
            return Err(DataSourceError::EmptyData);
        }

        Ok(Self {
            headers: headers.into(),
            records: records.into(),
            cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Claim the next record in round-robin order.
    ///
    /// Safe to call from many tasks at once: each call claims a unique
    /// cursor position with a single atomic increment. Runs pick records with
    /// [`DataSet::record_for`] instead and never move this cursor.
    pub fn next(&self) -> Arc<DataRecord> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.at(index)
    }

    /// Record used by the given 1-based request id.
    pub fn record_for(&self, request_id: u64) -> Arc<DataRecord> {
        let index = request_id.saturating_sub(1) % self.records.len() as u64;
        self.at(index as usize)
    }

    fn at(&self, index: usize) -> Arc<DataRecord> {
        Arc::clone(&self.records[index % self.records.len()])
    }

    /// Get the total number of data rows.
    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// Get the column headers.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}
