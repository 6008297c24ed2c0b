//! Wiring of one `run`: load everything, drive the controller, collect.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::client::build_client;
use crate::config::RunConfig;
use crate::controller::{ExecutionController, RunSummary, StopReason};
use crate::data_source::DataSet;
use crate::errors::BeastError;
use crate::executor::{HttpExecutor, RequestExecutor};
use crate::report::{Output, ProgressBar};
use crate::source::RequestSource;
use crate::stats::Stats;
use crate::template::RequestTemplate;

/// A run whose inputs have all been loaded and validated.
///
/// Every fatal error surfaces while preparing, before any request is sent.
pub struct PreparedRun {
    config: RunConfig,
    source: RequestSource,
    client: reqwest::Client,
    output: Option<Output>,
}

/// Result of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub stats: Stats,
    pub summary: RunSummary,
    /// Wall-clock time from start until the stream closed.
    pub elapsed: Duration,
    /// The CSV output file, when one was requested and fully written.
    pub output_file: Option<PathBuf>,
}

/// Load config, template and data, and build the HTTP client.
///
/// # Errors
/// Any invalid input. These are fatal and reported before execution.
pub fn prepare(config: RunConfig) -> Result<PreparedRun, BeastError> {
    config.validate()?;

    let http_config = config.http_config()?;
    let template = RequestTemplate::read(&config.template_file)?;
    let data = config
        .data_file
        .as_ref()
        .map(DataSet::from_file)
        .transpose()?;
    let source = RequestSource::new(&template, data)?;
    let client = build_client(&http_config.to_client_config())?;
    let output = config.output_file.as_ref().map(Output::create).transpose()?;

    Ok(PreparedRun {
        config,
        source,
        client,
        output,
    })
}

impl PreparedRun {
    pub fn source(&self) -> &RequestSource {
        &self.source
    }

    /// Run against the network with the configured client.
    pub async fn execute(self) -> Result<RunReport, BeastError> {
        let executor = Arc::new(HttpExecutor::new(self.client.clone()));
        self.execute_with(executor).await
    }

    /// Run with the given executor and collect every outcome.
    pub async fn execute_with(
        self,
        executor: Arc<dyn RequestExecutor>,
    ) -> Result<RunReport, BeastError> {
        let PreparedRun {
            config,
            source,
            mut output,
            ..
        } = self;

        let controller = ExecutionController::new(config.mode, config.concurrency);
        let mut stats = Stats::new(config.concurrency);
        let mut progress = ProgressBar::new(config.mode);

        let (mut outcomes, handle) = controller.start(source, executor);

        while let Some(outcome) = outcomes.recv().await {
            stats.update(&outcome);
            progress.update();

            if let Some(ref mut out) = output {
                if let Err(e) = out.write(&outcome) {
                    error!(error = %e, "Writing the output file failed, no more rows will be written");
                    output = None;
                }
            }
        }

        let elapsed = progress.elapsed();
        let summary = match handle.finished().await {
            Some(summary) => summary,
            None => RunSummary {
                generated: stats.requests(),
                stop_reason: StopReason::Abandoned,
                elapsed,
            },
        };

        info!(
            requests = stats.requests(),
            elapsed_ms = elapsed.as_millis() as u64,
            "All outcomes collected"
        );

        let output_file = match output {
            Some(out) => Some(out.close()?),
            None => None,
        };

        Ok(RunReport {
            stats,
            summary,
            elapsed,
            output_file,
        })
    }
}
