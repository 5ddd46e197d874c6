//! Command-line entry point
//!
//! A run loads both configuration files, queries Prometheus over the given
//! range and either prints the resulting points (simulation) or pushes them
//! to OpenTSDB. The process exit code reflects where a failure happened:
//! configuration problems exit with 1, query or delivery problems with 2.

use std::ffi::OsString;

use clap::{error::ErrorKind, Parser};
use prom2tsdb_core::{
    error::{ExportError, ExportResult, EXIT_CONFIGURATION_FAILURE, EXIT_OK},
    time::parse_date,
    VERSION,
};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::config::{ExporterConfig, QueryConfig};
use crate::dispatcher::BulkDispatcher;
use crate::pipeline::query_points;
use crate::prometheus::PrometheusClient;

#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(
    name = "prom2tsdb",
    version,
    about = "Export the result of a Prometheus range query to OpenTSDB"
)]
pub struct Cli {
    /// Query description file (JSON or YAML)
    #[arg(short = 'q', long = "query-conf")]
    pub query_conf: Option<String>,

    /// Exporter configuration file (JSON or YAML)
    #[arg(short = 'e', long = "exporter-conf")]
    pub exporter_conf: Option<String>,

    /// Start date, e.g. 2019-07-31T17:00:00.000Z
    #[arg(short = 'f', long = "from")]
    pub from: Option<String>,

    /// End date, e.g. 2019-07-31T18:00:00.000Z
    #[arg(short = 't', long = "to")]
    pub to: Option<String>,

    /// Print the points as JSON instead of pushing them
    #[arg(short = 's', long = "simulate")]
    pub simulate: bool,
}

/// Map a configured logging level to a filter. `fatal` and `panic` are
/// accepted and treated as `error`.
pub fn parse_log_level(level: &str) -> ExportResult<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "" | "info" => Ok(LevelFilter::INFO),
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "fatal" | "panic" => Ok(LevelFilter::ERROR),
        _ => Err(ExportError::configuration(format!(
            "Wrong logging level value ({})",
            level
        ))),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level
/// when set. A subscriber installed earlier is left in place.
pub fn init_logging(level: &str) -> ExportResult<()> {
    let level = parse_log_level(level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}

fn required<'a>(value: &'a Option<String>, what: &str, flag: char) -> ExportResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExportError::configuration(format!("No {} provided (-{})", what, flag)))
}

/// Execute one export run
pub async fn execute(cli: &Cli) -> ExportResult<()> {
    let exporter_path = required(&cli.exporter_conf, "exporter configuration file", 'e')?;
    let exporter = ExporterConfig::load(exporter_path).map_err(|e| {
        ExportError::configuration(format!(
            "error while loading exporter configuration: {:#}",
            e
        ))
    })?;

    init_logging(&exporter.logging_level)?;
    info!("Starting prom2tsdb {}", VERSION);

    let query_path = required(&cli.query_conf, "query description file", 'q')?;
    let query = QueryConfig::load_from_file(query_path).map_err(|e| {
        ExportError::configuration(format!("error while loading query description: {:#}", e))
    })?;

    let from = required(&cli.from, "start date", 'f')?;
    let start = parse_date(from).map_err(|e| {
        ExportError::configuration(format!("error while parsing start date ({}): {}", from, e))
    })?;
    let to = required(&cli.to, "end date", 't')?;
    let end = parse_date(to).map_err(|e| {
        ExportError::configuration(format!("error while parsing end date ({}): {}", to, e))
    })?;

    let backend = PrometheusClient::new(&exporter.prometheus_url)?;

    let dispatcher = if cli.simulate {
        info!("Simulation mode: nothing will be pushed to OpenTSDB");
        None
    } else {
        Some(BulkDispatcher::new(&exporter)?)
    };

    let points = query_points(&backend, &query, start, end).await?;

    match dispatcher {
        None => {
            let json = serde_json::to_string_pretty(&points)?;
            println!("{}", json);
        }
        Some(dispatcher) => dispatcher.push(points).await?,
    }

    Ok(())
}

fn report(e: &ExportError) {
    if tracing::dispatcher::has_been_set() {
        error!("{} error: {}", e.category(), e);
    } else {
        eprintln!("Error: {}", e);
    }
}

/// Parse `args` and run; returns the process exit code
pub async fn run<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // usage (including --help) is reported as a configuration failure
            return match e.kind() {
                ErrorKind::DisplayVersion => EXIT_OK,
                _ => EXIT_CONFIGURATION_FAILURE,
            };
        }
    };

    match execute(&cli).await {
        Ok(()) => EXIT_OK,
        Err(e) => {
            report(&e);
            e.exit_code()
        }
    }
}
