use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for building the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub disable_compression: bool,
    pub disable_keep_alives: bool,
    /// None leaves the pool unbounded.
    pub max_idle_per_host: Option<usize>,
    /// None disables the per-request timeout.
    pub request_timeout: Option<Duration>,
    pub skip_tls_verify: bool,
    pub disable_redirects: bool,
}

/// Builds a reqwest HTTP client with the specified configuration.
///
/// One client is shared by every in-flight request of a run.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut client_builder = reqwest::Client::builder();

    if config.disable_compression {
        client_builder = client_builder.no_gzip();
    }

    // Keep-alives off means no connection is ever returned to the pool
    if config.disable_keep_alives {
        client_builder = client_builder.pool_max_idle_per_host(0);
    } else if let Some(max_idle) = config.max_idle_per_host {
        client_builder = client_builder.pool_max_idle_per_host(max_idle);
    }

    if let Some(timeout) = config.request_timeout {
        client_builder = client_builder.timeout(timeout);
    }

    if config.disable_redirects {
        client_builder = client_builder.redirect(Policy::none());
    }

    if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        client_builder = client_builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    let client = client_builder.build()?;

    info!(
        compression = !config.disable_compression,
        keep_alives = !config.disable_keep_alives,
        max_idle_per_host = ?config.max_idle_per_host,
        request_timeout = ?config.request_timeout,
        redirects = !config.disable_redirects,
        "HTTP client configured"
    );

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;

    #[test]
    fn test_build_default_client() {
        let config = HttpConfig::default().to_client_config();
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_build_permissive_client() {
        let config = ClientConfig {
            disable_compression: false,
            disable_keep_alives: true,
            max_idle_per_host: Some(2),
            request_timeout: None,
            skip_tls_verify: true,
            disable_redirects: false,
        };
        assert!(build_client(&config).is_ok());
    }
}
