//! Stepline — step event ingestion and session/funnel analytics.
//!
//! `serve` runs the REST API over a journal-backed in-memory event log.
//! `report` replays a journal offline and prints one report as JSON.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use stepline_api::ApiServer;
use stepline_core::config::AppConfig;
use stepline_core::{parse_day, DayRange, ReportingOffset};
use stepline_reporting::{AnalyticsEngine, QueryOptions};
use stepline_store::journal::{self, JournalWriter};
use stepline_store::{EventLog, ExclusionRegistry, MemoryEventLog};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "stepline")]
#[command(about = "Step event ingestion and session/funnel analytics")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./stepline.toml if present)
    #[arg(long, global = true, env = "STEPLINE_CONFIG")]
    config: Option<String>,

    /// Event journal path (overrides config)
    #[arg(long, global = true, env = "STEPLINE__STORE__JOURNAL_PATH")]
    journal: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and metrics exporter
    Serve {
        /// Node identifier (overrides config)
        #[arg(long, env = "STEPLINE__NODE_ID")]
        node_id: Option<String>,

        /// HTTP port (overrides config)
        #[arg(long, env = "STEPLINE__API__HTTP_PORT")]
        http_port: Option<u16>,
    },

    /// Replay the journal and print a report as JSON
    Report {
        #[command(flatten)]
        options: ReportArgs,

        #[command(subcommand)]
        report: Report,
    },
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Reporting offset for this run, e.g. +03:00 (default: registry offset)
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<String>,

    /// Ignore the exclusion registry
    #[arg(long, default_value_t = false)]
    include_excluded: bool,
}

#[derive(Subcommand, Debug)]
enum Report {
    /// Daily active users per day, with the average
    Dau {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },

    /// Distinct sessions per step with drop-offs
    Funnel {
        #[arg(long)]
        scenario: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Comma-separated ordered step names
        #[arg(long, value_delimiter = ',', required = true)]
        steps: Vec<String>,
    },

    /// Sessions started on a day
    Sessions {
        #[arg(long)]
        scenario: String,
        #[arg(long)]
        day: String,
        /// Comma-separated terminal steps (default: configured set)
        #[arg(long, value_delimiter = ',')]
        terminal: Vec<String>,
    },

    /// Attribute distribution for one step
    Attributes {
        #[arg(long)]
        scenario: String,
        #[arg(long)]
        step: String,
        /// Dot-separated metadata path
        #[arg(long)]
        path: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

#[derive(Serialize)]
struct DauReport {
    days: BTreeMap<NaiveDate, u64>,
    average: f64,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path, true)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };
    if let Some(journal) = &cli.journal {
        config.store.journal_path = Some(journal.clone());
    }
    Ok(config)
}

/// Rebuild the in-memory log from the configured journal, if any.
fn restore_log(config: &AppConfig) -> anyhow::Result<MemoryEventLog> {
    match &config.store.journal_path {
        Some(path) => {
            let outcome = journal::replay(Path::new(path))?;
            if outcome.skipped_lines > 0 {
                warn!(skipped = outcome.skipped_lines, "Journal contained unreadable lines");
            }
            Ok(MemoryEventLog::from_events(outcome.events))
        }
        None => Ok(MemoryEventLog::new()),
    }
}

fn load_registry(config: &AppConfig) -> anyhow::Result<ExclusionRegistry> {
    let path = config.store.registry_path.as_deref().map(Path::new);
    Ok(ExclusionRegistry::load_or_seed(path, &config.reporting)?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn serve(mut config: AppConfig, node_id: Option<String>, http_port: Option<u16>) -> anyhow::Result<()> {
    // Apply CLI overrides
    if let Some(node_id) = node_id {
        config.node_id = node_id;
    }
    if let Some(port) = http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        journal = ?config.store.journal_path,
        registry = ?config.store.registry_path,
        "Configuration loaded"
    );

    let log = Arc::new(restore_log(&config)?);
    let registry = Arc::new(load_registry(&config)?);

    let journal_task = match JournalWriter::from_config(&config.store).await? {
        Some((writer, task)) => {
            log.attach_journal(writer);
            Some(task)
        }
        None => {
            warn!("No journal configured, events will not survive a restart");
            None
        }
    };

    let engine = Arc::new(AnalyticsEngine::new(
        log.clone(),
        registry,
        config.reporting.terminal_steps.clone(),
    ));
    let api_server = ApiServer::new(config.clone(), engine);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!(events = log.len(), "Stepline is ready to serve traffic");

    // Serve until ctrl-c
    let served = api_server.start_http(shutdown_signal()).await;

    // Drop the last writer handle so the journal task drains and exits.
    drop(log.detach_journal());
    if let Some(task) = journal_task {
        task.finished().await;
        info!("Journal flushed");
    }

    served
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(config: AppConfig, args: ReportArgs, report: Report) -> anyhow::Result<()> {
    let log = Arc::new(restore_log(&config)?);
    let loaded = load_registry(&config)?;
    // An offset override must not be written back to the persisted registry.
    let registry = match &args.offset {
        Some(raw) => loaded.detached_with_offset(ReportingOffset::parse(raw)?),
        None => loaded,
    };
    let engine = AnalyticsEngine::new(log, Arc::new(registry), config.reporting.terminal_steps.clone());
    let options = QueryOptions {
        include_excluded: args.include_excluded,
    };

    match report {
        Report::Dau { from, to } => {
            let range = DayRange::new(parse_day(&from)?, parse_day(&to)?);
            let days = engine.dau_range(range, options)?;
            let average = stepline_reporting::dau::average(&days);
            print_json(&DauReport { days, average })
        }
        Report::Funnel {
            scenario,
            from,
            to,
            steps,
        } => {
            let range = DayRange::new(parse_day(&from)?, parse_day(&to)?);
            print_json(&engine.funnel(&scenario, range, &steps, options)?)
        }
        Report::Sessions {
            scenario,
            day,
            terminal,
        } => {
            let day = parse_day(&day)?;
            print_json(&engine.sessions(&scenario, day, &terminal, options)?)
        }
        Report::Attributes {
            scenario,
            step,
            path,
            from,
            to,
        } => {
            let range = DayRange::new(parse_day(&from)?, parse_day(&to)?);
            print_json(&engine.attribute_stats(&scenario, &step, &path, range, options)?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout is reserved for report output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepline=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Serve { node_id, http_port } => {
            info!("Stepline starting up");
            serve(config, node_id, http_port).await
        }
        Command::Report { options, report: which } => report(config, options, which),
    }
}
