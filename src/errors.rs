//! Error classification for load test runs.
//!
//! Two kinds of failure exist. Fatal startup errors ([`BeastError`]) stop the
//! program before any request is sent. Per-request failures never surface as
//! `Err`; they are folded into an [`ExecutionOutcome`](crate::outcome::ExecutionOutcome)
//! using one of the negative sentinel codes described by [`ClientError`].

use std::error::Error as StdError;
use std::fmt;
use std::io;
use thiserror::Error;

use crate::config::ConfigError;
use crate::data_source::DataSourceError;
use crate::report::ReportError;
use crate::template::TemplateError;

/// Status code reported when a request could not be built.
pub const GENERATION_ERROR_CODE: i32 = -100;

/// Status code reported when the network call timed out.
pub const TIMEOUT_ERROR_CODE: i32 = -400;

/// Status code reported for any other transport failure.
pub const UNEXPECTED_ERROR_CODE: i32 = -500;

/// Failures that happen on our side of the wire, before a status code exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientError {
    /// Templating or request construction failed; no network call was made.
    Generation,

    /// The network call exceeded the configured request timeout.
    Timeout,

    /// Connection refused, DNS failure, TLS failure, broken body, ...
    Unexpected,
}

impl ClientError {
    /// The sentinel status code carried by the outcome.
    pub const fn code(self) -> i32 {
        match self {
            ClientError::Generation => GENERATION_ERROR_CODE,
            ClientError::Timeout => TIMEOUT_ERROR_CODE,
            ClientError::Unexpected => UNEXPECTED_ERROR_CODE,
        }
    }

    /// Maps a sentinel status code back to its category.
    ///
    /// Returns `None` for real HTTP status codes.
    pub fn from_code(status_code: i32) -> Option<Self> {
        match status_code {
            GENERATION_ERROR_CODE => Some(ClientError::Generation),
            TIMEOUT_ERROR_CODE => Some(ClientError::Timeout),
            UNEXPECTED_ERROR_CODE => Some(ClientError::Unexpected),
            _ => None,
        }
    }

    /// Categorize a reqwest error.
    ///
    /// Timeouts are reported separately; every other transport failure is
    /// folded into [`ClientError::Unexpected`].
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() || caused_by_timeout(error) {
            ClientError::Timeout
        } else {
            ClientError::Unexpected
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ClientError::Generation => "generation_error",
            ClientError::Timeout => "timeout_error",
            ClientError::Unexpected => "unexpected_error",
        }
    }

    /// Get a human-readable description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            ClientError::Generation => "Request generation error",
            ClientError::Timeout => "Request timeout",
            ClientError::Unexpected => "Unexpected error",
        }
    }
}

/// True when some error in the source chain is an I/O timeout.
fn caused_by_timeout(error: &(dyn StdError + 'static)) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            if io_error.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = err.source();
    }
    false
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Fatal errors reported to the operator before execution begins.
#[derive(Error, Debug)]
pub enum BeastError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Data(#[from] DataSourceError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Helper to name common HTTP status codes for display.
pub fn status_code_name(status_code: i32) -> &'static str {
    match status_code {
        // 2xx Success
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",

        // 3xx Redirection
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",

        // 4xx Client Errors
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        429 => "Too Many Requests",

        // 5xx Server Errors
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",

        code => match ClientError::from_code(code) {
            Some(err) => err.description(),
            None => "Unknown Status",
        },
    }
}
