//! Request templates: reading, writing and compiling them.
//!
//! A template describes one HTTP request. Its URL, header values and body may
//! contain text template actions (see [`crate::text_template`]) that are
//! evaluated once per request against `{RequestID, Data}`.
//!
//! Two file formats are supported, chosen by file extension:
//!
//! ```json
//! {
//!   "method": "POST",
//!   "url": "http://localhost:8080/items/{{ .RequestID }}",
//!   "headers": [{ "key": "Content-Type", "value": "application/json" }],
//!   "body": "{\"value\": \"{{ .Data.value }}\"}"
//! }
//! ```
//!
//! ```yaml
//! method: POST
//! endpoint: http://localhost:8080/items/{{ .RequestID }}
//! headers:
//!   Content-Type: application/json
//! request-body: '{"value": "{{ .Data.value }}"}'
//! ```
//!
//! A body starting with `@` names a file whose contents become the body.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::data_source::DataRecord;
use crate::request::{RequestError, RequestSpec};
use crate::text_template::{TemplateContext, TextTemplate};

/// Errors raised while loading, compiling or evaluating a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Error reading template file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error writing template file {path}: {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error reading external body file {path}: {source}")]
    ExternalBody {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON template file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid YAML template file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Header '{0}' must be a string or a list of strings")]
    HeaderValue(String),

    #[error("Unterminated action in {template} template at offset {offset}")]
    Unterminated { template: String, offset: usize },

    #[error("Empty action in {template} template")]
    EmptyAction { template: String },

    #[error("Unknown expression '{expression}' in {template} template")]
    UnknownExpression {
        template: String,
        expression: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
}

/// One header of a template; the value may contain template actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An HTTP request template as stored on disk (JSON layout).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestTemplate {
    #[serde(default)]
    pub method: String,

    #[serde(rename = "url", default)]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

/// YAML layout: headers are a map and the body key differs.
#[derive(Debug, Default, Serialize, Deserialize)]
struct YamlTemplate {
    #[serde(default)]
    method: String,

    #[serde(default)]
    endpoint: String,

    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    headers: Mapping,

    #[serde(rename = "request-body", default, skip_serializing_if = "String::is_empty")]
    body: String,
}

const DEFAULT_USER_AGENT: &str = "Beast/1";
const BODY_PLACEHOLDER: &str = "Optional, enter body to send with POST or PUT";

impl RequestTemplate {
    /// Starter template with placeholder text in every field.
    pub fn placeholder() -> Self {
        Self {
            method: "Use Http method: GET/POST/PUT/DELETE".to_string(),
            endpoint: "Http URL to be invoked".to_string(),
            headers: vec![Header::new("User-Agent", DEFAULT_USER_AGENT)],
            body: BODY_PLACEHOLDER.to_string(),
        }
    }

    /// Starter template for `method url`. POST and PUT get a body placeholder.
    pub fn for_endpoint(method: &str, url: &str) -> Self {
        let method = method.trim().to_uppercase();
        let body = if method == "POST" || method == "PUT" {
            BODY_PLACEHOLDER.to_string()
        } else {
            String::new()
        };

        Self {
            method,
            endpoint: url.to_string(),
            headers: vec![Header::new("User-Agent", DEFAULT_USER_AGENT)],
            body,
        }
    }

    /// Read a template, choosing JSON for `.json` files and YAML otherwise.
    ///
    /// # Errors
    /// Unreadable or malformed files, unreadable external body files.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| TemplateError::FileRead {
            path: path_str.clone(),
            source,
        })?;

        let mut template = if is_json(path) {
            serde_json::from_str::<RequestTemplate>(&content).map_err(|source| {
                TemplateError::Json {
                    path: path_str.clone(),
                    source,
                }
            })?
        } else {
            let yaml: YamlTemplate =
                serde_yaml::from_str(&content).map_err(|source| TemplateError::Yaml {
                    path: path_str.clone(),
                    source,
                })?;
            Self::from_yaml(yaml)?
        };

        if let Some(body_path) = template.body.strip_prefix('@') {
            let body_path = body_path.trim().to_string();
            debug!(path = %body_path, "Reading external request body");
            template.body =
                fs::read_to_string(&body_path).map_err(|source| TemplateError::ExternalBody {
                    path: body_path,
                    source,
                })?;
        }

        info!(
            path = %path_str,
            method = %template.method,
            endpoint = %template.endpoint,
            headers = template.headers.len(),
            "Request template loaded"
        );

        Ok(template)
    }

    /// Write the template, choosing the format from the file extension.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), TemplateError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let content = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|source| TemplateError::Json {
                path: path_str.clone(),
                source,
            })?
        } else {
            serde_yaml::to_string(&self.to_yaml()).map_err(|source| TemplateError::Yaml {
                path: path_str.clone(),
                source,
            })?
        };

        fs::write(path, content).map_err(|source| TemplateError::FileWrite {
            path: path_str,
            source,
        })
    }

    fn from_yaml(yaml: YamlTemplate) -> Result<Self, TemplateError> {
        let mut headers = Vec::with_capacity(yaml.headers.len());
        for (key, value) in yaml.headers {
            let key = scalar_to_string(&key).ok_or_else(|| {
                TemplateError::HeaderValue(format!("{:?}", key))
            })?;
            match value {
                Value::Sequence(values) => {
                    for v in values {
                        let v = scalar_to_string(&v)
                            .ok_or_else(|| TemplateError::HeaderValue(key.clone()))?;
                        headers.push(Header::new(key.clone(), v));
                    }
                }
                other => {
                    let v = scalar_to_string(&other)
                        .ok_or_else(|| TemplateError::HeaderValue(key.clone()))?;
                    headers.push(Header::new(key, v));
                }
            }
        }

        Ok(Self {
            method: yaml.method,
            endpoint: yaml.endpoint,
            headers,
            body: yaml.body,
        })
    }

    fn to_yaml(&self) -> YamlTemplate {
        let mut headers = Mapping::new();
        for header in &self.headers {
            let key = Value::String(header.key.clone());
            let value = Value::String(header.value.clone());
            match headers.get_mut(&key) {
                Some(Value::Sequence(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.clone();
                    *existing = Value::Sequence(vec![first, value]);
                }
                None => {
                    headers.insert(key, value);
                }
            }
        }

        YamlTemplate {
            method: self.method.clone(),
            endpoint: self.endpoint.clone(),
            headers,
            body: self.body.clone(),
        }
    }

    /// Compile URL, header values and body into reusable text templates.
    ///
    /// # Errors
    /// Any malformed action. These are fatal startup errors.
    pub fn compile(&self) -> Result<CompiledTemplate, TemplateError> {
        let endpoint = TextTemplate::parse("endpoint", &self.endpoint)?;

        let headers = self
            .headers
            .iter()
            .map(|h| {
                let name = format!("header '{}'", h.key);
                Ok((h.key.clone(), TextTemplate::parse(&name, &h.value)?))
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        let body = if self.body.is_empty() {
            None
        } else {
            Some(TextTemplate::parse("body", &self.body)?)
        };

        let method = if self.method.trim().is_empty() {
            "GET".to_string()
        } else {
            self.method.trim().to_uppercase()
        };

        Ok(CompiledTemplate {
            method,
            endpoint,
            headers,
            body,
        })
    }
}

/// A template whose text parts are parsed and ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    method: String,
    endpoint: TextTemplate,
    headers: Vec<(String, TextTemplate)>,
    body: Option<TextTemplate>,
}

impl CompiledTemplate {
    /// Render every part for one request and validate the result.
    ///
    /// # Errors
    /// The rendered request is not valid (bad URL, header value, method).
    /// These are per-request failures.
    pub fn evaluate(
        &self,
        request_id: u64,
        record: &DataRecord,
    ) -> Result<RequestSpec, TemplateError> {
        let ctx = TemplateContext {
            request_id,
            data: record,
        };

        let endpoint = self.endpoint.render(&ctx);
        let headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(key, value)| (key.clone(), value.render(&ctx)))
            .collect();
        let body = self.body.as_ref().map(|b| b.render(&ctx));

        let spec = RequestSpec::new(
            &self.method,
            &endpoint,
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            body,
        )?;
        Ok(spec)
    }

    fn parts(&self) -> impl Iterator<Item = &TextTemplate> {
        std::iter::once(&self.endpoint)
            .chain(self.headers.iter().map(|(_, t)| t))
            .chain(self.body.iter())
    }

    /// True when some part renders the request id.
    pub fn uses_request_id(&self) -> bool {
        self.parts().any(TextTemplate::uses_request_id)
    }

    /// True when some part reads the data record.
    pub fn uses_data(&self) -> bool {
        self.parts().any(TextTemplate::uses_data)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn post_template() -> RequestTemplate {
        RequestTemplate {
            method: "POST".to_string(),
            endpoint: "http://someendpoint.pt/{{.Data.A}}".to_string(),
            headers: vec![Header::new("Content-Type", "application/json")],
            body: "{\"id\": {{.RequestID}}, \"value\": \"{{.Data.B}}\"}".to_string(),
        }
    }

    #[test]
    fn test_read_json() {
        let file = temp_file(
            ".json",
            r#"{"method":"POST","url":"http://localhost/x","headers":[{"key":"A","value":"1"},{"key":"A","value":"2"}],"body":"hi"}"#,
        );

        let tmpl = RequestTemplate::read(file.path()).unwrap();
        assert_eq!(tmpl.method, "POST");
        assert_eq!(tmpl.endpoint, "http://localhost/x");
        assert_eq!(
            tmpl.headers,
            vec![Header::new("A", "1"), Header::new("A", "2")]
        );
        assert_eq!(tmpl.body, "hi");
    }

    #[test]
    fn test_read_yaml() {
        let file = temp_file(
            ".yaml",
            "method: GET\nendpoint: http://localhost/y\nheaders:\n  User-Agent: Beast/1\n  Accept:\n    - text/html\n    - application/json\n",
        );

        let tmpl = RequestTemplate::read(file.path()).unwrap();
        assert_eq!(tmpl.method, "GET");
        assert_eq!(tmpl.endpoint, "http://localhost/y");
        assert_eq!(
            tmpl.headers,
            vec![
                Header::new("User-Agent", "Beast/1"),
                Header::new("Accept", "text/html"),
                Header::new("Accept", "application/json"),
            ]
        );
        assert!(tmpl.body.is_empty());
    }

    #[test]
    fn test_external_body() {
        let body = temp_file(".txt", "{\"from\": \"file\"}");
        let content = format!(
            r#"{{"method":"POST","url":"http://localhost/","body":"@{}"}}"#,
            body.path().display()
        );
        let file = temp_file(".json", &content);

        let tmpl = RequestTemplate::read(file.path()).unwrap();
        assert_eq!(tmpl.body, "{\"from\": \"file\"}");
    }

    #[test]
    fn test_missing_external_body_is_fatal() {
        let file = temp_file(
            ".json",
            r#"{"method":"POST","url":"http://localhost/","body":"@/definitely/not/here.txt"}"#,
        );
        let err = RequestTemplate::read(file.path()).unwrap_err();
        assert!(matches!(err, TemplateError::ExternalBody { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = RequestTemplate::read("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, TemplateError::FileRead { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let file = temp_file(".json", "{ not json");
        let err = RequestTemplate::read(file.path()).unwrap_err();
        assert!(matches!(err, TemplateError::Json { .. }));
    }

    #[test]
    fn test_write_then_read_yaml_keeps_repeated_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.yml");
        let tmpl = RequestTemplate {
            method: "GET".to_string(),
            endpoint: "http://localhost/".to_string(),
            headers: vec![
                Header::new("Accept", "a"),
                Header::new("User-Agent", "Beast/1"),
                Header::new("Accept", "b"),
            ],
            body: String::new(),
        };

        tmpl.write(&path).unwrap();
        let read = RequestTemplate::read(&path).unwrap();

        // Grouped by key on disk
        assert_eq!(
            read.headers,
            vec![
                Header::new("Accept", "a"),
                Header::new("Accept", "b"),
                Header::new("User-Agent", "Beast/1"),
            ]
        );
    }

    #[test]
    fn test_compile_and_evaluate() {
        let record = DataRecord::from_pairs([("A", "1"), ("B", "a1")]);
        let compiled = post_template().compile().unwrap();

        let spec = compiled.evaluate(1, &record).unwrap();
        assert_eq!(spec.to_string(), "POST http://someendpoint.pt/1");
        assert_eq!(spec.headers().len(), 1);
        assert_eq!(spec.body(), Some("{\"id\": 1, \"value\": \"a1\"}"));
    }

    #[test]
    fn test_compile_error_is_reported() {
        let mut tmpl = post_template();
        tmpl.body = "{{ .RequestID".to_string();
        assert!(matches!(
            tmpl.compile(),
            Err(TemplateError::Unterminated { .. })
        ));
    }

    #[test]
    fn test_evaluate_error_for_bad_url() {
        let tmpl = RequestTemplate {
            method: "GET".to_string(),
            endpoint: "{{ .Data.url }}".to_string(),
            ..Default::default()
        };
        let compiled = tmpl.compile().unwrap();

        let err = compiled.evaluate(1, &DataRecord::empty()).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidRequest(_)));
    }

    #[test]
    fn test_empty_method_defaults_to_get() {
        let tmpl = RequestTemplate {
            endpoint: "http://localhost/".to_string(),
            ..Default::default()
        };
        let spec = tmpl
            .compile()
            .unwrap()
            .evaluate(1, &DataRecord::empty())
            .unwrap();
        assert_eq!(spec.method(), &reqwest::Method::GET);
    }

    #[test]
    fn test_starter_templates() {
        let get = RequestTemplate::for_endpoint("get", "http://localhost/");
        assert_eq!(get.method, "GET");
        assert!(get.body.is_empty());
        assert_eq!(get.headers, vec![Header::new("User-Agent", "Beast/1")]);

        let post = RequestTemplate::for_endpoint("post", "http://localhost/");
        assert_eq!(post.body, BODY_PLACEHOLDER);

        // Placeholder text is not a valid request
        assert!(RequestTemplate::placeholder()
            .compile()
            .unwrap()
            .evaluate(1, &DataRecord::empty())
            .is_err());
    }

    #[test]
    fn test_dependencies() {
        let compiled = post_template().compile().unwrap();
        assert!(compiled.uses_request_id());
        assert!(compiled.uses_data());

        let literal = RequestTemplate {
            method: "GET".to_string(),
            endpoint: "http://localhost/".to_string(),
            ..Default::default()
        };
        let compiled = literal.compile().unwrap();
        assert!(!compiled.uses_request_id());
        assert!(!compiled.uses_data());
    }
}
