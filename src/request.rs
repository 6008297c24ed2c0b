//! Fully resolved HTTP requests.
//!
//! A [`RequestSpec`] is validated on construction (method token, absolute
//! http(s) URL, header names and values), so turning it into a wire request
//! cannot fail later on the hot path.

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::fmt;
use thiserror::Error;

/// Reasons a rendered request cannot be sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("Invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("Invalid value for header '{0}'")]
    InvalidHeaderValue(String),
}

/// A request ready for network execution. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    method: Method,
    endpoint: Url,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<String>,
}

impl RequestSpec {
    /// Validate the parts of a request.
    ///
    /// Header keys may repeat; every pair is sent. An empty body is treated
    /// as no body.
    pub fn new<'a, I>(
        method: &str,
        endpoint: &str,
        headers: I,
        body: Option<String>,
    ) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let method = Method::from_bytes(method.trim().to_uppercase().as_bytes())
            .map_err(|_| RequestError::InvalidMethod(method.to_string()))?;

        let endpoint_str = endpoint.trim();
        let endpoint = Url::parse(endpoint_str).map_err(|e| RequestError::InvalidUrl {
            url: endpoint_str.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(RequestError::UnsupportedScheme(endpoint.scheme().to_string()));
        }

        let headers = headers
            .into_iter()
            .map(|(key, value)| {
                let name = HeaderName::from_bytes(key.trim().as_bytes())
                    .map_err(|_| RequestError::InvalidHeaderName(key.to_string()))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|_| RequestError::InvalidHeaderValue(key.to_string()))?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, RequestError>>()?;

        Ok(Self {
            method,
            endpoint,
            headers,
            body: body.filter(|b| !b.is_empty()),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Build the wire request on the shared client.
    pub fn to_request_builder(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let mut builder = client.request(self.method.clone(), self.endpoint.clone());
        for (name, value) in &self.headers {
            builder = builder.header(name.clone(), value.clone());
        }
        if let Some(ref body) = self.body {
            builder = builder.body(body.clone());
        }
        builder
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.endpoint)
    }
}
