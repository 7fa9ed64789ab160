use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dockhand_deployer::build;
use dockhand_deployer::concurrency::ConcurrencyGate;
use dockhand_deployer::config::Config;
use dockhand_deployer::db::Db;
use dockhand_deployer::http::{self, AppState};
use dockhand_deployer::log_pipeline::LogPipelineRegistry;
use dockhand_deployer::orchestrator::{self, DeploymentService};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How often the artifact-directory size sweep runs (§4.9). Independent of
/// any single build; just needs to run often enough that the directory
/// doesn't balloon between sweeps.
const ARTIFACT_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

#[derive(Parser, Debug)]
struct Args {
    /// Address to bind the HTTP API to
    #[clap(long, default_value = "127.0.0.1:8001")]
    bind: SocketAddr,
    /// Path to the sqlite database file
    #[clap(long, default_value = "./dockhand.sqlite")]
    db_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")).unwrap();
    tracing_subscriber::registry().with(filter_layer).with(fmt::layer()).init();

    let config = Arc::new(Config::from_env()?);
    tokio::fs::create_dir_all(&config.artifacts_dir).await?;
    tokio::fs::create_dir_all(&config.work_dir).await?;

    let db = Db::connect(&args.db_path).await?;

    match orchestrator::reconcile_on_startup(&db).await {
        Ok(count) if count > 0 => warn!(count, "reconciled orphaned deployments from a previous run"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to reconcile deployments on startup"),
    }

    tokio::spawn(run_artifact_sweep(config.clone()));

    let gate = Arc::new(ConcurrencyGate::new(config.max_concurrent_deployments));
    let logs = Arc::new(LogPipelineRegistry::new(Arc::new(db.clone())));
    let service = Arc::new(DeploymentService::new(db.clone(), config.clone(), gate.clone(), logs.clone()));

    let state = AppState {
        db,
        config,
        gate,
        logs,
        service,
    };
    let router = http::router(state);

    info!(bind = %args.bind, "binding to and listening at address");
    axum::Server::bind(&args.bind)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically sweeps `config.artifacts_dir` down to `max_artifacts_size_mb`
/// (§4.9), deleting the oldest artifacts first. Runs for the lifetime of
/// the process; a failed sweep is logged and retried on the next tick.
async fn run_artifact_sweep(config: Arc<Config>) {
    let mut interval = tokio::time::interval(ARTIFACT_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        match build::cleanup_artifacts(&config.artifacts_dir, config.max_artifacts_size_mb).await {
            Ok(report) if !report.removed.is_empty() => {
                info!(
                    removed = report.removed.len(),
                    bytes_freed = report.bytes_freed,
                    "swept artifacts directory"
                );
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "artifact sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .unwrap_or_else(|err| warn!(error = %err, "failed to install ctrl-c handler"));
    info!("received shutdown signal");
}
