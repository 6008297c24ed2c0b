use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use beast_rs::config::{HttpConfig, RunConfig, RunMode};
use beast_rs::errors::BeastError;
use beast_rs::metrics::{gather_metrics_string, register_metrics, start_metrics_server};
use beast_rs::runner;
use beast_rs::template::RequestTemplate;
use beast_rs::utils::parse_duration_string;

#[derive(Debug, Parser)]
#[command(
    name = "beast",
    version,
    about = "HTTP load tester that replays a request template at a fixed concurrency"
)]
struct Cli {
    /// Log output format
    #[arg(long = "log-format", value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a load test using a request template
    Run(RunArgs),
    /// Write a starter request template (JSON for .json files, YAML otherwise)
    Template(TemplateArgs),
    /// Write the default HTTP client configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Number of requests to send
    #[arg(short = 'n', long = "requests", default_value_t = 0)]
    requests: u64,

    /// Duration of the test: seconds, or 30s/5m/2h/1d
    #[arg(short = 't', long = "duration", value_parser = parse_duration_string)]
    duration: Option<Duration>,

    /// Number of concurrent requests
    #[arg(short = 'c', long = "concurrency", default_value_t = 1)]
    concurrency: usize,

    /// Config file to set up the HTTP client
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// CSV file with data for request generation
    #[arg(long = "data")]
    data: Option<PathBuf>,

    /// CSV file with detailed execution results
    #[arg(long = "output")]
    output: Option<PathBuf>,

    /// Serve Prometheus metrics on this port while the test runs
    #[arg(long = "metrics-port", env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Request template file
    template: PathBuf,
}

#[derive(Debug, Args)]
struct TemplateArgs {
    /// HTTP method
    #[arg(short = 'm', long = "method", default_value = "GET")]
    method: String,

    /// `[url] <file>`: with only a file, every field gets placeholder text
    #[arg(num_args = 1..=2, required = true, value_names = ["URL", "FILE"])]
    args: Vec<String>,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Where to write the config
    file: PathBuf,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if let Err(err) = result {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}

async fn run_command(args: RunArgs) -> Result<(), BeastError> {
    let mode = RunMode::from_limits(args.requests, args.duration.unwrap_or(Duration::ZERO))?;
    let config = RunConfig {
        mode,
        concurrency: args.concurrency,
        template_file: args.template,
        config_file: args.config,
        data_file: args.data,
        output_file: args.output,
    };
    config.validate()?;
    config.print_summary();

    let prepared = runner::prepare(config)?;

    register_metrics()?;
    if let Some(port) = args.metrics_port {
        let registry = prometheus::default_registry().clone();
        tokio::spawn(async move {
            start_metrics_server(port, registry).await;
        });
    }

    let report = prepared.execute().await?;
    report.stats.print(report.elapsed);

    if let Some(path) = report.output_file {
        println!("===== Output File =====");
        println!("Output file '{}' was successfully generated", path.display());
    }

    debug!(
        metrics = %gather_metrics_string(prometheus::default_registry()),
        "Final metrics"
    );

    Ok(())
}

fn template_command(args: TemplateArgs) -> Result<(), BeastError> {
    match args.args.as_slice() {
        [url, file] => {
            let template = RequestTemplate::for_endpoint(&args.method, url);
            template.write(file)?;
            println!(
                "File {} was created for '{} {}'",
                file, template.method, template.endpoint
            );
        }
        [file] => {
            RequestTemplate::placeholder().write(file)?;
            println!("File {} was created, please edit before use", file);
        }
        // clap enforces one or two values
        _ => {}
    }

    Ok(())
}

fn config_command(args: ConfigArgs) -> Result<(), BeastError> {
    HttpConfig::default().write(&args.file)?;
    println!(
        "File {} was created with the default configuration",
        args.file.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.command {
        Command::Run(args) => run_command(args).await,
        Command::Template(args) => template_command(args),
        Command::Config(args) => config_command(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
