//! docpolicy
//!
//! Command line front end for the document classification engine: loads a
//! rule file, classifies documents with a collection sequence and writes the
//! results as JSON.

use anyhow::Result;
use clap::{Parser, Subcommand};
use docpolicy_core::{PolicyId, SequenceId};
use docpolicy_engine::DefaultCollectionTieBreak;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use tracing::info;

mod commands;
mod config;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "docpolicy")]
#[command(about = "Rule-based document classification and policy application", long_about = None)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "docpolicy.yaml")]
    config: PathBuf,

    /// Rule file (YAML or JSON)
    #[arg(short, long, global = true, env = "DOCPOLICY_RULES")]
    rules: Option<PathBuf>,

    /// Documents classified at the same time
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Per-document timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Default collection pick: lowest_id, highest_id or none
    #[arg(long, global = true, value_parser = config::parse_tie_break)]
    tie_break: Option<DefaultCollectionTieBreak>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify documents with a collection sequence
    Classify {
        /// Collection sequence id
        #[arg(short, long)]
        sequence: SequenceId,

        /// Documents as a JSON array or YAML list (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Write the batch result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print Prometheus metrics to stderr after the run
        #[arg(long)]
        metrics: bool,
    },

    /// Print the rule file fingerprint and entity counts
    Fingerprint,

    /// Check references and policy details of the rule file
    Validate,

    /// Show which of the given policies win priority resolution
    Resolve {
        /// Policy ids, all of one policy type
        #[arg(required = true)]
        policies: Vec<PolicyId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    let config = CliConfig::load(&cli.config, &cli)?;
    info!(rules = %config.rules_path.display(), "Configuration loaded");

    match cli.command {
        Command::Classify {
            sequence,
            input,
            output,
            metrics,
        } => {
            let prometheus = if metrics || config.telemetry.prometheus {
                Some(init_metrics()?)
            } else {
                None
            };
            commands::classify(&config, sequence, input.as_deref(), output.as_deref()).await?;
            if let Some(handle) = prometheus {
                eprintln!("{}", handle.render());
            }
        }
        Command::Fingerprint => commands::fingerprint(&config).await?,
        Command::Validate => commands::validate(&config).await?,
        Command::Resolve { policies } => commands::resolve(&config, &policies).await?,
    }

    Ok(())
}

/// Initialize tracing/logging on stderr
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("docpolicy=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docpolicy=info"))
    };

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!("docpolicy_batches_total", "Total number of classify calls");
    metrics::describe_counter!(
        "docpolicy_degraded_batches_total",
        "Classify calls served from the last known-good snapshot"
    );
    metrics::describe_counter!("docpolicy_documents_total", "Total number of documents classified");
    metrics::describe_counter!(
        "docpolicy_document_errors_total",
        "Documents returned with an error marker, by kind"
    );
    metrics::describe_counter!(
        "docpolicy_collection_matches_total",
        "Total number of matched collections"
    );
    metrics::describe_counter!("docpolicy_policies_applied_total", "Total number of applied policies");
    metrics::describe_counter!(
        "docpolicy_diagnostics_total",
        "Recovered collection and policy problems"
    );
    metrics::describe_counter!("docpolicy_snapshot_loads_total", "Published configuration snapshots");
    metrics::describe_histogram!(
        "docpolicy_document_latency_us",
        metrics::Unit::Microseconds,
        "Per-document classification latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
