//! Per-request CSV output and progress reporting.

use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

use crate::config::RunMode;
use crate::outcome::ExecutionOutcome;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const CSV_HEADER: [&str; 6] = [
    "Timestamp",
    "Request",
    "Result",
    "StatusCode",
    "IsSuccess",
    "Duration",
];

/// Cells in the progress bar; each one is 5%.
const BAR_CELLS: u32 = 20;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Error creating output file {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Error writing output file: {0}")]
    Write(#[from] csv::Error),

    #[error("Error flushing output file: {0}")]
    Flush(#[from] std::io::Error),
}

/// Writes one CSV row per outcome.
pub struct Output {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl Output {
    /// Create (or truncate) `path` and write the header row.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ReportError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = csv::Writer::from_path(&path).map_err(|source| ReportError::Create {
            path: path.display().to_string(),
            source,
        })?;
        writer.write_record(CSV_HEADER)?;

        Ok(Self { path, writer })
    }

    pub fn write(&mut self, outcome: &ExecutionOutcome) -> Result<(), ReportError> {
        self.writer.write_record(encode(outcome))?;
        Ok(())
    }

    /// Flush and close the file.
    pub fn close(mut self) -> Result<PathBuf, ReportError> {
        self.writer.flush()?;
        info!(path = %self.path.display(), "Output file written");
        Ok(self.path)
    }
}

fn format_timestamp(timestamp: SystemTime) -> String {
    DateTime::<Utc>::from(timestamp)
        .format(DATETIME_FORMAT)
        .to_string()
}

fn encode(outcome: &ExecutionOutcome) -> [String; 6] {
    let duration = if outcome.duration.is_zero() {
        String::new()
    } else {
        outcome.duration.as_millis().to_string()
    };

    let (result, status_code, is_success) = match outcome.client_error_kind() {
        Some(kind) => (kind.description().to_string(), String::new(), false),
        None => (
            "Executed".to_string(),
            outcome.status_code.to_string(),
            outcome.is_success(),
        ),
    };

    [
        format_timestamp(outcome.timestamp),
        outcome.request.clone(),
        result,
        status_code,
        is_success.to_string(),
        duration,
    ]
}

/// Progress of a run, logged every 5%.
///
/// In count mode progress is outcomes received over outcomes expected; in
/// duration mode it is elapsed time over the run duration.
#[derive(Debug)]
pub struct ProgressBar {
    mode: RunMode,
    received: u64,
    started: Instant,
    last: u32,
}

impl ProgressBar {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            received: 0,
            started: Instant::now(),
            last: 0,
        }
    }

    /// Record one outcome. Returns the new percentage when a 5% step was
    /// crossed.
    pub fn update(&mut self) -> Option<u32> {
        self.received += 1;

        let step = 100 / BAR_CELLS;
        let percentage = (self.percentage() / step) * step;
        if percentage <= self.last {
            return None;
        }

        self.last = percentage;
        info!(progress = %draw_bar(percentage), percentage, "{}%", percentage);
        Some(percentage)
    }

    pub fn percentage(&self) -> u32 {
        let percentage = match self.mode {
            RunMode::Count(0) => 100,
            RunMode::Count(total) => self.received.saturating_mul(100) / total,
            RunMode::Duration(duration) if duration.is_zero() => 100,
            RunMode::Duration(duration) => {
                (self.started.elapsed().as_secs_f64() * 100.0 / duration.as_secs_f64()) as u64
            }
        };

        percentage.min(100) as u32
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// `[#####...............]` for 25%.
pub fn draw_bar(percentage: u32) -> String {
    let done = (percentage.min(100) / (100 / BAR_CELLS)) as usize;
    format!(
        "[{}{}]",
        "#".repeat(done),
        ".".repeat(BAR_CELLS as usize - done)
    )
}
