//! ingest-gate - evaluate ingestion eligibility from the command line
//!
//! Loads gate configuration, fills the in-memory stores from a JSON
//! snapshot, and runs the standard gate for one context. The decision card
//! is printed as JSON on stdout; logs go to stderr.
//!
//! Exit status is 0 when ingestion is allowed and 2 when it is blocked.

use clap::{Parser, Subcommand};
use eligibility_gate::{
    standard_policies, AnalyticsSink, BackendSnapshot, BlockEmitter, EligibilityContext,
    EligibilityGateBuilder, GateConfig, GateStores, MemoryBackend, TracingAnalyticsSink,
};
use eligibility_types::{IngestionFlow, Platform};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod error;

use error::{CliError, CliResult};

const EXIT_BLOCKED: u8 = 2;

#[derive(Parser)]
#[command(name = "ingest-gate")]
#[command(about = "Evaluate ingestion eligibility against a store snapshot", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "INGEST_GATE_CONFIG")]
    config: Option<String>,

    /// Log level, overrides the configured one
    #[arg(long, env = "INGEST_GATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "INGEST_GATE_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one ingestion request
    Check {
        /// JSON snapshot of the backing stores
        #[arg(short, long)]
        snapshot: Option<String>,

        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        account: Option<String>,

        /// x or youtube
        #[arg(short, long)]
        platform: Option<String>,

        /// timeline, mentions or replies
        #[arg(short, long, default_value = "timeline")]
        flow: String,

        /// Correlation id; generated when absent
        #[arg(long)]
        request_id: Option<Uuid>,

        /// Print only `{allowed, blocked_by}` instead of the full card
        #[arg(long)]
        decision_only: bool,
    },

    /// List the standard policies in evaluation order
    Policies,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = GateConfig::load(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_tracing(&level, cli.json || config.logging.json);

    match cli.command {
        Command::Check {
            snapshot,
            user,
            account,
            platform,
            flow,
            request_id,
            decision_only,
        } => {
            let platform = platform.as_deref().map(str::parse::<Platform>).transpose()?;
            let flow: IngestionFlow = flow.parse()?;
            let context = EligibilityContext::from_parts(user, account, platform, flow, request_id);

            check(config, snapshot.as_deref(), &context, decision_only).await
        }
        Command::Policies => {
            let stores = GateStores::from_backend(Arc::new(MemoryBackend::new()));
            for (position, policy) in standard_policies(&stores, &config).iter().enumerate() {
                println!("{}. {:<20} {}", position + 1, policy.name(), policy.description());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_snapshot(path: Option<&str>) -> CliResult<BackendSnapshot> {
    let Some(path) = path else {
        return Ok(BackendSnapshot::default());
    };
    if !Path::new(path).exists() {
        return Err(CliError::InvalidInput(format!("snapshot not found: {}", path)));
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

async fn check(
    config: GateConfig,
    snapshot: Option<&str>,
    context: &EligibilityContext,
    decision_only: bool,
) -> CliResult<ExitCode> {
    let backend = Arc::new(MemoryBackend::from_snapshot(load_snapshot(snapshot)?));
    debug!(?snapshot, "Loaded store snapshot");

    let mut builder = EligibilityGateBuilder::new(config.clone())
        .with_stores(GateStores::from_backend(backend));

    let mut worker = None;
    if config.emitter.enabled {
        let sink: Arc<dyn AnalyticsSink> = Arc::new(TracingAnalyticsSink);
        let (emitter, handle) = BlockEmitter::spawn(sink, config.emitter.capacity);
        builder = builder.with_emitter(emitter);
        worker = Some(handle);
    }
    let gate = builder.build()?;

    let card = gate.evaluate_with_card(context).await;
    info!(
        request_id = %card.request_id,
        allowed = card.was_allowed(),
        "Evaluation finished"
    );

    if decision_only {
        println!("{}", serde_json::to_string_pretty(&card.decision)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&card)?);
    }

    // Let queued block events drain before exiting
    drop(gate);
    if let Some(handle) = worker {
        let _ = handle.await;
    }

    Ok(if card.was_allowed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_BLOCKED)
    })
}
