//! Turns a request template plus optional data into generation tasks.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::data_source::{DataRecord, DataSet};
use crate::request::RequestSpec;
use crate::template::{CompiledTemplate, RequestTemplate, TemplateError};

lazy_static::lazy_static! {
    static ref EMPTY_RECORD: Arc<DataRecord> = Arc::new(DataRecord::empty());
}

/// A request id paired with the data record it will be rendered with.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub request_id: u64,
    pub record: Arc<DataRecord>,
}

impl GenerationTask {
    /// Description used for requests that could not be generated.
    pub fn describe(&self) -> String {
        format!("requestId: {} and data: {}", self.request_id, self.record)
    }
}

impl fmt::Display for GenerationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Where request specifications come from.
///
/// Static sources resolve to one shared spec; dynamic sources evaluate the
/// compiled template for every task. Cloning is cheap.
#[derive(Debug, Clone)]
pub enum RequestSource {
    Static(Arc<RequestSpec>),
    Dynamic {
        template: Arc<CompiledTemplate>,
        data: Option<DataSet>,
    },
}

impl RequestSource {
    /// Compile `template` and pick the mode.
    ///
    /// The source is static when there is no data and nothing in the template
    /// depends on the request id. The static spec is evaluated here, so any
    /// error it raises is a startup error.
    pub fn new(template: &RequestTemplate, data: Option<DataSet>) -> Result<Self, TemplateError> {
        let compiled = template.compile()?;

        if data.is_none() && !compiled.uses_request_id() {
            let spec = compiled.evaluate(1, &EMPTY_RECORD)?;
            info!(request = %spec, "Using static request");
            return Ok(RequestSource::Static(Arc::new(spec)));
        }

        if let Some(ref data) = data {
            if !compiled.uses_data() {
                warn!("Data file given but the template never reads .Data");
            }
            info!(
                records = data.row_count(),
                fields = ?data.headers(),
                "Using templated requests"
            );
        } else {
            info!("Using templated requests");
        }

        Ok(RequestSource::Dynamic {
            template: Arc::new(compiled),
            data,
        })
    }

    pub fn is_static(&self) -> bool {
        matches!(self, RequestSource::Static(_))
    }

    /// Build the task for `request_id` (1-based).
    ///
    /// With K data rows, request `i` gets row `(i - 1) mod K`.
    pub fn task(&self, request_id: u64) -> GenerationTask {
        let record = match self {
            RequestSource::Dynamic {
                data: Some(data), ..
            } => data.record_for(request_id),
            _ => EMPTY_RECORD.clone(),
        };

        GenerationTask { request_id, record }
    }

    /// Produce the request for one task.
    ///
    /// # Errors
    /// Evaluation failures of a dynamic template. Static sources never fail.
    pub fn resolve(&self, task: &GenerationTask) -> Result<Arc<RequestSpec>, TemplateError> {
        match self {
            RequestSource::Static(spec) => Ok(spec.clone()),
            RequestSource::Dynamic { template, .. } => template
                .evaluate(task.request_id, &task.record)
                .map(Arc::new),
        }
    }
}
