use std::path::PathBuf;
use std::time::Duration;

use dockhand_common::{DeploymentId, DeploymentStatus};

use crate::config::LogVerbosity;
use crate::db::Db;
use crate::log_pipeline::LogPipelineRegistry;

use super::fanout::{self, FailurePolicy};
use super::types::{ProjectConfig, ServerTarget};

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("source deployment has no recorded artifact")]
    NoArtifact,
    #[error("source deployment's artifact is missing from disk: {0}")]
    ArtifactMissing(String),
    #[error("{0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Fanout(#[from] fanout::FanoutError),
}

/// Redeploys `source_deployment_id`'s artifact to the same server targets
/// under a freshly created `rollback_deployment_id`, skipping clone and
/// build entirely. The restart step is best-effort: a failing restart
/// script is logged as a warning rather than failing the rollback
/// (§4.11).
pub async fn rollback(
    db: &Db,
    logs: &LogPipelineRegistry,
    rollback_deployment_id: DeploymentId,
    source_deployment_id: DeploymentId,
    ssh_timeout_seconds: u64,
    verbosity: LogVerbosity,
) -> Result<(), RollbackError> {
    let pipeline = logs.get_or_create(rollback_deployment_id);

    let artifact = db
        .artifact_for_deployment(source_deployment_id)
        .await?
        .ok_or(RollbackError::NoArtifact)?;
    let artifact_path = PathBuf::from(&artifact.file_path);
    if !tokio::fs::try_exists(&artifact_path).await.unwrap_or(false) {
        return Err(RollbackError::ArtifactMissing(artifact.file_path));
    }

    let rollback_row = db
        .get_deployment(rollback_deployment_id)
        .await?
        .ok_or_else(|| RollbackError::Validation("rollback deployment not found".to_string()))?;
    let project_row = db
        .get_project(rollback_row.project_id)
        .await?
        .ok_or_else(|| RollbackError::Validation("project not found".to_string()))?;
    let project = ProjectConfig::from_row(project_row).map_err(RollbackError::Validation)?;

    db.update_status(rollback_deployment_id, DeploymentStatus::Deploying, None, None)
        .await?;

    let server_rows = db.servers_for_groups(&rollback_row.target_server_ids()).await?;
    let servers: Vec<ServerTarget> = server_rows
        .into_iter()
        .map(ServerTarget::from_row)
        .collect::<std::result::Result<_, _>>()
        .map_err(RollbackError::Validation)?;

    let result = fanout::deploy_to_servers_with_restart_policy(
        db,
        &servers,
        &project,
        &artifact_path,
        rollback_deployment_id,
        Duration::from_secs(ssh_timeout_seconds),
        verbosity,
        &pipeline,
        FailurePolicy::HaltOnFirst,
        false,
    )
    .await;

    let final_status = if result.is_ok() {
        DeploymentStatus::Success
    } else {
        DeploymentStatus::Failed
    };
    db.update_status(
        rollback_deployment_id,
        final_status,
        None,
        result.as_ref().err().map(fanout::FanoutError::to_string).as_deref(),
    )
    .await?;
    pipeline.flush().await;
    logs.remove(rollback_deployment_id);

    result.map_err(RollbackError::from)
}
