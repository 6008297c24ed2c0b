use std::fmt;
use std::time::{Duration, SystemTime};

use crate::errors::ClientError;

/// Result of attempting one request.
///
/// `status_code` is either the HTTP status returned by the server or one of
/// the negative sentinel codes from [`ClientError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Request id the outcome belongs to.
    pub request_id: u64,
    /// Human readable description of the request.
    pub request: String,
    /// Wall-clock time at send (or at generation failure).
    pub timestamp: SystemTime,
    pub status_code: i32,
    /// Zero when the request never reached the network.
    pub duration: Duration,
}

impl ExecutionOutcome {
    /// Outcome for a response received from the server.
    pub fn response(
        request_id: u64,
        request: String,
        timestamp: SystemTime,
        status_code: u16,
        duration: Duration,
    ) -> Self {
        Self {
            request_id,
            request,
            timestamp,
            status_code: i32::from(status_code),
            duration,
        }
    }

    /// Outcome for a request that failed on our side of the wire.
    pub fn client_error(
        request_id: u64,
        request: String,
        timestamp: SystemTime,
        error: ClientError,
        duration: Duration,
    ) -> Self {
        Self {
            request_id,
            request,
            timestamp,
            status_code: error.code(),
            duration,
        }
    }

    /// Outcome for a request that could not be generated.
    pub fn generation_error(request_id: u64, request: String) -> Self {
        Self::client_error(
            request_id,
            request,
            SystemTime::now(),
            ClientError::Generation,
            Duration::ZERO,
        )
    }

    /// True for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// True when no HTTP response was received.
    pub fn is_client_error(&self) -> bool {
        self.status_code < 0
    }

    /// The client error category, when `is_client_error()`.
    pub fn client_error_kind(&self) -> Option<ClientError> {
        ClientError::from_code(self.status_code)
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {:?}", self.status_code, self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        let now = SystemTime::now();
        let ok = ExecutionOutcome::response(1, "GET http://x/".into(), now, 204, Duration::ZERO);
        let not_found =
            ExecutionOutcome::response(2, "GET http://x/".into(), now, 404, Duration::ZERO);

        assert!(ok.is_success());
        assert!(!ok.is_client_error());
        assert!(!not_found.is_success());
        assert!(!not_found.is_client_error());
    }

    #[test]
    fn test_generation_error() {
        let outcome = ExecutionOutcome::generation_error(3, "requestId: 3 and data: {}".into());
        assert_eq!(outcome.status_code, -100);
        assert_eq!(outcome.duration, Duration::ZERO);
        assert!(outcome.is_client_error());
        assert_eq!(outcome.client_error_kind(), Some(ClientError::Generation));
    }

    #[test]
    fn test_display() {
        let outcome = ExecutionOutcome::response(
            1,
            "GET http://x/".into(),
            SystemTime::now(),
            200,
            Duration::from_millis(5),
        );
        assert_eq!(outcome.to_string(), "200 - 5ms");
    }
}
