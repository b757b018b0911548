//! Rodline - rod-line quality inference and parameter recommendation
//!
//! # Usage
//!
//! ```bash
//! # Serve the API, fetching snapshots from ingestion.source_url
//! cargo run --release
//!
//! # Replay a local export and run a single cycle
//! ./rodline --source-csv data/sample_input.csv --once
//!
//! # Start with automation already enabled
//! ./rodline --enable-automation
//! ```
//!
//! # Environment Variables
//!
//! - `RODLINE_CONFIG`: Path to the line TOML (default: ./rodline.toml)
//! - `RODLINE_SERVER_ADDR`: Bind address (default: 0.0.0.0:5000)
//! - `AUTOMATION_INTERVAL_SECS`: Cycle interval (default: 10)
//! - `RODLINE_CORS_ORIGINS`: Comma-separated allowed origins
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rodline::api::{create_app, ApiState};
use rodline::automation::{AutomationController, IntervalScheduler};
use rodline::config::{self, LineConfig};
use rodline::pipeline::{CyclePipeline, ForwardPipeline, InversePipeline};
use rodline::registry::ModelRegistry;
use rodline::storage::{FeatureStore, ProcessLock};
use rodline::{acquisition, StagedBus};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "rodline")]
#[command(about = "Rod-line quality inference and process-parameter recommendation")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default: "0.0.0.0:5000")
    #[arg(short, long)]
    addr: Option<String>,

    /// Line configuration TOML (overrides RODLINE_CONFIG and ./rodline.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ingest from a local CSV export instead of ingestion.source_url
    #[arg(long, value_name = "PATH")]
    source_csv: Option<PathBuf>,

    /// Run one full cycle, print the report as JSON and exit
    #[arg(long)]
    once: bool,

    /// Enable scheduled cycles at startup
    #[arg(long)]
    enable_automation: bool,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Automation,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Automation => write!(f, "Automation"),
        }
    }
}

/// Long-lived components shared by the server and the scheduler.
struct Core {
    _process_lock: ProcessLock,
    controller: Arc<AutomationController>,
    state: ApiState,
}

fn build_core(cfg: &LineConfig, cancel_token: &CancellationToken) -> Result<Core> {
    let process_lock = ProcessLock::acquire(&cfg.paths.data_dir)?;

    let forward_registry = ModelRegistry::load(&cfg.models.forward_dir)
        .context("Failed to load forward models")?;
    let inverse_registry = ModelRegistry::load(&cfg.models.inverse_dir)
        .context("Failed to load inverse models")?;
    info!(
        forward = ?forward_registry.target_ids(),
        inverse = inverse_registry.len(),
        scaling = ?cfg.models.feature_scaling,
        "Model registries loaded"
    );

    let forward = ForwardPipeline::new(
        Arc::new(forward_registry),
        cfg.pipeline.window_size,
        cfg.models.feature_scaling,
        cfg.pipeline.quality_targets.clone(),
    );
    let inverse = InversePipeline::new(
        Arc::new(inverse_registry),
        cfg.pipeline.window_size,
        cfg.models.feature_scaling,
    );

    let bus = Arc::new(StagedBus::new(&cfg.paths.staging_dir));
    let ingestor = acquisition::from_config(&cfg.ingestion)
        .context("No ingestion source; set ingestion.source_url or pass --source-csv")?;
    info!(source = ingestor.source_name(), staging = %bus.dir().display(), "Staged bus ready");

    let pipeline = Arc::new(CyclePipeline::new(
        Arc::clone(&bus),
        ingestor,
        forward,
        inverse,
        &cfg.pipeline,
    ));

    let scheduler = Arc::new(IntervalScheduler::with_parent(cancel_token.clone()));
    let controller = AutomationController::new(
        scheduler,
        Arc::clone(&pipeline) as Arc<dyn rodline::CycleRunner>,
        Duration::from_secs(cfg.automation.interval_secs),
        cfg.automation.job_name.clone(),
    );

    let feature_store = match FeatureStore::open(&cfg.paths.feature_db) {
        Ok(store) => {
            info!(path = %cfg.paths.feature_db.display(), records = store.len(), "Feature store opened");
            Some(store)
        }
        Err(e) => {
            warn!(path = %cfg.paths.feature_db.display(), error = %e, "Feature store unavailable, submissions go to the CSV log only");
            None
        }
    };

    let state = ApiState {
        controller: Arc::clone(&controller),
        pipeline,
        bus,
        feature_store,
        quality_targets: cfg.pipeline.quality_targets.clone(),
    };

    Ok(Core {
        _process_lock: process_lock,
        controller,
        state,
    })
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Stop scheduled cycles once shutdown begins.
fn spawn_automation_guard(
    task_set: &mut JoinSet<Result<TaskName>>,
    controller: Arc<AutomationController>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        cancel_token.cancelled().await;
        controller.shutdown();
        let status = controller.latest();
        info!(
            completed = status.cycles_completed,
            failed = status.cycles_failed,
            skipped = status.ticks_skipped,
            "[Automation] Scheduler stopped"
        );
        Ok(TaskName::Automation)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => {
                info!("Supervisor: task {} completed", task_name);
            }
            Ok(Err(e)) => {
                error!("Supervisor: task failed: {}", e);
                cancel_token.cancel();
                return Err(e);
            }
            Err(e) => {
                error!("Supervisor: task panicked: {}", e);
                cancel_token.cancel();
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
        }
    }

    info!("Supervisor: all tasks completed");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut line_config = match &args.config {
        Some(path) => LineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LineConfig::load(),
    };
    line_config.apply_env_overrides();
    if let Some(addr) = args.addr {
        line_config.server.addr = addr;
    }
    if let Some(csv) = args.source_csv {
        line_config.ingestion.source_file = Some(csv);
    }
    line_config.validate().context("Invalid configuration")?;
    config::init(line_config);
    let cfg = config::get();

    info!("Rodline - {}", cfg.line.name);
    info!(
        window = cfg.pipeline.window_size,
        interval_secs = cfg.automation.interval_secs,
        forward_dir = %cfg.models.forward_dir.display(),
        inverse_dir = %cfg.models.inverse_dir.display(),
        "Configuration"
    );

    let cancel_token = CancellationToken::new();
    let core = build_core(cfg, &cancel_token)?;

    if args.once {
        let report = core.controller.run_now().await.context("Cycle failed")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    if args.enable_automation || cfg.automation.enabled_on_start {
        core.controller
            .enable()
            .context("Failed to enable automation")?;
    }

    let listener = tokio::net::TcpListener::bind(&cfg.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.addr))?;
    info!("HTTP API listening on http://{}", cfg.server.addr);

    let app = create_app(core.state.clone());
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    spawn_automation_guard(&mut task_set, Arc::clone(&core.controller), cancel_token.clone());

    run_supervisor(&mut task_set, cancel_token).await
}
