use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::time::Duration;
use tracing::info;

use crate::client::ClientConfig;
use crate::controller::MAX_CONCURRENCY;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Error reading config file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error writing config file {path}: {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config, {0}")]
    Validation(String),
}

/// HTTP client settings, stored as JSON.
///
/// Keys missing from the file keep their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HttpConfig {
    pub disable_compression: bool,
    pub disable_keep_alives: bool,
    /// Idle connections kept per host; 0 means unlimited.
    pub max_connections: i64,
    /// Per-request timeout in seconds; 0 disables the timeout.
    pub request_timeout: i64,
    pub disable_certificate_check: bool,
    pub disable_redirects: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            disable_compression: true,
            disable_keep_alives: false,
            max_connections: 0,
            request_timeout: 30,
            disable_certificate_check: false,
            disable_redirects: true,
        }
    }
}

impl HttpConfig {
    /// Read and validate a config file.
    ///
    /// # Errors
    /// Unreadable file, malformed JSON, negative numbers.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path_str.clone(),
            source,
        })?;

        let config: HttpConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path_str.clone(),
                source,
            })?;
        config.validate()?;

        info!(path = %path_str, config = ?config, "HTTP client config loaded");
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path_str.clone(),
            source,
        })?;
        fs::write(path, content).map_err(|source| ConfigError::FileWrite {
            path: path_str,
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections < 0 {
            return Err(ConfigError::Validation(
                "'max-connections' must be zero or positive".to_string(),
            ));
        }

        if self.request_timeout < 0 {
            return Err(ConfigError::Validation(
                "'request-timeout' must be zero or positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Creates a ClientConfig from this config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            disable_compression: self.disable_compression,
            disable_keep_alives: self.disable_keep_alives,
            max_idle_per_host: usize::try_from(self.max_connections)
                .ok()
                .filter(|n| *n > 0),
            request_timeout: u64::try_from(self.request_timeout)
                .ok()
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            skip_tls_verify: self.disable_certificate_check,
            disable_redirects: self.disable_redirects,
        }
    }
}

/// How a run decides it is finished. The two modes are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Send exactly this many requests.
    Count(u64),
    /// Keep generating requests until this much time has passed.
    Duration(Duration),
}

impl RunMode {
    /// Build the mode from the raw `-n` / `-t` values, where 0 means unset.
    pub fn from_limits(request_count: u64, duration: Duration) -> Result<Self, ConfigError> {
        match (request_count, duration.is_zero()) {
            (0, true) => Err(ConfigError::Validation(
                "one of -n (requests) or -t (duration) must be given".to_string(),
            )),
            (n, true) => Ok(RunMode::Count(n)),
            (0, false) => Ok(RunMode::Duration(duration)),
            (_, false) => Err(ConfigError::Validation(
                "-n (requests) and -t (duration) cannot be used together".to_string(),
            )),
        }
    }

    /// The request count, 0 in duration mode.
    pub fn request_count(&self) -> u64 {
        match self {
            RunMode::Count(n) => *n,
            RunMode::Duration(_) => 0,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Count(n) => write!(f, "Number of requests: {}", n),
            RunMode::Duration(d) => write!(f, "Duration: {}s", d.as_secs()),
        }
    }
}

/// Everything the `run` command needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub concurrency: usize,
    pub template_file: PathBuf,
    pub config_file: Option<PathBuf>,
    pub data_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "-c (concurrency) must be at least 1".to_string(),
            ));
        }

        if self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Validation(format!(
                "-c (concurrency) must be at most {}",
                MAX_CONCURRENCY
            )));
        }

        match self.mode {
            RunMode::Count(0) => Err(ConfigError::Validation(
                "-n (requests) must be positive".to_string(),
            )),
            RunMode::Duration(d) if d.is_zero() => Err(ConfigError::Validation(
                "-t (duration) must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Load the HTTP client config, or the defaults when none was given.
    pub fn http_config(&self) -> Result<HttpConfig, ConfigError> {
        match self.config_file {
            Some(ref path) => HttpConfig::read(path),
            None => Ok(HttpConfig::default()),
        }
    }

    /// Prints the run banner.
    pub fn print_summary(&self) {
        println!("=== Request ===");
        println!("Request template: {}", self.template_file.display());

        if let Some(ref data) = self.data_file {
            println!("Sample Data: {}", data.display());
        }

        if let Some(ref config) = self.config_file {
            println!("Configuration: {}", config.display());
        }

        if let Some(ref output) = self.output_file {
            println!("Output file: {}", output.display());
        }

        println!("{}", self.mode);
        println!("Number of concurrent requests: {}", self.concurrency);
        println!("=== Test ===");
    }
}
