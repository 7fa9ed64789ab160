use std::sync::Arc;

use crate::concurrency::ConcurrencyGate;
use crate::config::Config;
use crate::db::Db;
use crate::log_pipeline::LogPipelineRegistry;
use crate::orchestrator::DeploymentService;

/// Shared state handed to every handler (§6). Cheap to clone — every field
/// is already an `Arc` or wraps one.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub gate: Arc<ConcurrencyGate>,
    pub logs: Arc<LogPipelineRegistry>,
    pub service: Arc<DeploymentService>,
}
