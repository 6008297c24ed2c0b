use async_trait::async_trait;
use std::time::SystemTime;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::ClientError;
use crate::metrics::{
    CONCURRENT_REQUESTS, REQUEST_DURATION_SECONDS, REQUEST_STATUS_CODES, REQUEST_TOTAL,
};
use crate::outcome::ExecutionOutcome;
use crate::request::RequestSpec;

/// Performs one request against the network.
///
/// Implementations never fail: transport problems are reported through the
/// outcome status code.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request_id: u64, spec: &RequestSpec) -> ExecutionOutcome;
}

/// Executor backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, request_id: u64, spec: &RequestSpec) -> ExecutionOutcome {
        CONCURRENT_REQUESTS.inc();
        REQUEST_TOTAL.inc();

        let timestamp = SystemTime::now();
        let request_start_time = Instant::now();

        let result = match spec.to_request_builder(&self.client).send().await {
            Ok(mut response) => {
                let status = response.status().as_u16();

                // Drain the body in chunks so it is never buffered whole
                let mut body_error = None;
                loop {
                    match response.chunk().await {
                        Ok(Some(_chunk)) => {}
                        Ok(None) => break,
                        Err(e) => {
                            body_error = Some(e);
                            break;
                        }
                    }
                }

                match body_error {
                    Some(e) if ClientError::from_reqwest_error(&e) == ClientError::Timeout => {
                        Err(ClientError::Timeout)
                    }
                    Some(e) => {
                        debug!(
                            request_id,
                            status_code = status,
                            error = %e,
                            "Response body read failed"
                        );
                        Ok(status)
                    }
                    None => Ok(status),
                }
            }
            Err(e) => {
                let kind = ClientError::from_reqwest_error(&e);
                if kind == ClientError::Unexpected {
                    warn!(request_id, request = %spec, error = %e, "Error executing request");
                }
                Err(kind)
            }
        };

        let duration = request_start_time.elapsed();
        REQUEST_DURATION_SECONDS.observe(duration.as_secs_f64());
        CONCURRENT_REQUESTS.dec();

        match result {
            Ok(status) => {
                REQUEST_STATUS_CODES
                    .with_label_values(&[status_code_label(status)])
                    .inc();
                debug!(
                    request_id,
                    status_code = status,
                    duration_ms = duration.as_millis() as u64,
                    "Request completed"
                );
                ExecutionOutcome::response(request_id, spec.to_string(), timestamp, status, duration)
            }
            Err(kind) => {
                REQUEST_STATUS_CODES.with_label_values(&[kind.label()]).inc();
                debug!(
                    request_id,
                    error = kind.label(),
                    duration_ms = duration.as_millis() as u64,
                    "Request failed"
                );
                ExecutionOutcome::client_error(
                    request_id,
                    spec.to_string(),
                    timestamp,
                    kind,
                    duration,
                )
            }
        }
    }
}

/// Returns a static string label for common HTTP status codes.
///
/// Uncommon codes fall back to "other" rather than allocating a unique string.
fn status_code_label(code: u16) -> &'static str {
    match code {
        200 => "200",
        201 => "201",
        202 => "202",
        204 => "204",
        301 => "301",
        302 => "302",
        304 => "304",
        400 => "400",
        401 => "401",
        403 => "403",
        404 => "404",
        405 => "405",
        408 => "408",
        409 => "409",
        422 => "422",
        429 => "429",
        500 => "500",
        502 => "502",
        503 => "503",
        504 => "504",
        _ => "other",
    }
}
