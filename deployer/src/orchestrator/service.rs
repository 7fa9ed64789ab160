use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dockhand_common::{DeploymentId, DeploymentKind, DeploymentStatus};

use crate::build::{self, BuildConfig};
use crate::concurrency::ConcurrencyGate;
use crate::config::Config;
use crate::db::{Db, DeploymentRow};
use crate::error::{OrchestratorError, Result};
use crate::git;
use crate::health;
use crate::log_pipeline::LogPipelineRegistry;
use crate::ssh::SshSession;

use super::cancel::CancellationRegistry;
use super::fanout::{self, FailurePolicy};
use super::types::{ProjectConfig, ServerTarget};

/// Owns every shared subsystem a running deployment needs and drives the
/// stage machine for a single deployment from submission to terminal
/// state (§4.7).
pub struct DeploymentService {
    db: Db,
    config: Arc<Config>,
    gate: Arc<ConcurrencyGate>,
    logs: Arc<LogPipelineRegistry>,
    cancellations: Arc<CancellationRegistry>,
}

impl DeploymentService {
    pub fn new(
        db: Db,
        config: Arc<Config>,
        gate: Arc<ConcurrencyGate>,
        logs: Arc<LogPipelineRegistry>,
    ) -> Self {
        Self {
            db,
            config,
            gate,
            logs,
            cancellations: Arc::new(CancellationRegistry::new()),
        }
    }

    /// Cooperative cancel: marks the flag and lets the running stage
    /// machine notice it at the next between-stage check (§4.7).
    pub async fn cancel(&self, deployment_id: DeploymentId) -> bool {
        self.cancellations.cancel(deployment_id).await
    }

    /// Attempts to admit `deployment_id` and, if admitted, spawns its
    /// stage machine in the background. Returns `false` (and marks the
    /// deployment `QUEUED`) if the concurrency gate is at capacity (§4.6).
    ///
    /// Callers creating an `UPLOAD` deployment must have already written
    /// its artifact row (`Db::insert_artifact`) before calling this.
    pub async fn submit(self: &Arc<Self>, deployment_id: DeploymentId) -> Result<bool> {
        if self.gate.acquire(deployment_id).await.is_err() {
            self.db
                .update_status(
                    deployment_id,
                    DeploymentStatus::Queued,
                    None,
                    Some("maximum concurrent deployments reached"),
                )
                .await?;
            return Ok(false);
        }

        let service = self.clone();
        tokio::spawn(async move {
            service.run(deployment_id).await;
        });
        Ok(true)
    }

    /// Admits and runs a rollback (§4.11): bypasses the normal stage
    /// machine entirely, redeploying `source_deployment_id`'s artifact
    /// under the already-created `rollback_deployment_id` row.
    pub async fn submit_rollback(
        self: &Arc<Self>,
        rollback_deployment_id: DeploymentId,
        source_deployment_id: DeploymentId,
    ) -> Result<bool> {
        if self.gate.acquire(rollback_deployment_id).await.is_err() {
            self.db
                .update_status(
                    rollback_deployment_id,
                    DeploymentStatus::Queued,
                    None,
                    Some("maximum concurrent deployments reached"),
                )
                .await?;
            return Ok(false);
        }

        let service = self.clone();
        tokio::spawn(async move {
            let result = super::rollback::rollback(
                &service.db,
                &service.logs,
                rollback_deployment_id,
                source_deployment_id,
                service.config.ssh_timeout_seconds,
                service.config.deployment_log_verbosity,
            )
            .await;
            if let Err(err) = result {
                tracing::error!(error = %err, rollback_deployment_id, "rollback failed");
            }
            service.gate.release(rollback_deployment_id).await;
        });
        Ok(true)
    }

    async fn run(self: Arc<Self>, deployment_id: DeploymentId) {
        let cancelled = self.cancellations.register(deployment_id).await;
        let pipeline = self.logs.get_or_create(deployment_id);

        let outcome = self.drive(deployment_id, &cancelled).await;

        let final_status = if cancelled.load(Ordering::SeqCst) {
            DeploymentStatus::Cancelled
        } else if outcome.is_ok() {
            DeploymentStatus::Success
        } else {
            DeploymentStatus::Failed
        };
        let error_message = outcome.as_ref().err().map(OrchestratorError::to_string);

        if let Err(err) = self
            .db
            .update_status(deployment_id, final_status, None, error_message.as_deref())
            .await
        {
            tracing::error!(error = %err, deployment_id, "failed to record terminal status");
        }

        pipeline.flush().await;
        self.logs.remove(deployment_id);
        self.cancellations.unregister(deployment_id).await;
        self.gate.release(deployment_id).await;
    }

    async fn drive(&self, deployment_id: DeploymentId, cancelled: &AtomicBool) -> Result<()> {
        let row = self
            .db
            .get_deployment(deployment_id)
            .await?
            .ok_or_else(|| OrchestratorError::Validation("deployment not found".to_string()))?;
        let project_row = self
            .db
            .get_project(row.project_id)
            .await?
            .ok_or_else(|| OrchestratorError::Validation("project not found".to_string()))?;
        let project = ProjectConfig::from_row(project_row).map_err(OrchestratorError::Validation)?;

        match row.kind.0 {
            DeploymentKind::Full => self.run_full(&row, &project, cancelled).await,
            DeploymentKind::RestartOnly => self.run_restart_only(&row, &project).await,
            DeploymentKind::Upload => self.run_upload(&row, &project, cancelled).await,
        }
    }

    async fn run_full(
        &self,
        row: &DeploymentRow,
        project: &ProjectConfig,
        cancelled: &AtomicBool,
    ) -> Result<()> {
        let deployment_id = row.id;
        let pipeline = self.logs.get_or_create(deployment_id);

        self.set_status(deployment_id, DeploymentStatus::Cloning).await?;
        let work_dir = self.config.work_dir.join(format!("build_{deployment_id}"));
        let info = git::fetch(&project.git_url, &row.branch, &project.credentials, &work_dir).await?;
        self.db
            .set_commit_info(deployment_id, &info.commit_hash, &info.commit_message)
            .await?;
        pipeline
            .info(format!("Fetched {} at {}", info.branch, info.commit_hash))
            .await;

        if cancelled.load(Ordering::SeqCst) {
            let _ = tokio::fs::remove_dir_all(&work_dir).await;
            return Ok(());
        }

        self.set_status(deployment_id, DeploymentStatus::Building).await?;
        let build_config = BuildConfig {
            project_kind: project.kind,
            auto_install: project.auto_install,
            install_command: project.install_command.clone(),
            build_command: project.build_command.clone(),
            output_dir: project.output_dir.clone(),
        };
        let cancel_flag = AtomicBool::new(cancelled.load(Ordering::SeqCst));
        let build_outcome = build::build(
            &work_dir,
            &build_config,
            &self.config.artifacts_dir,
            self.config.deployment_log_verbosity,
            &pipeline,
            &cancel_flag,
            Duration::from_secs(self.config.build_timeout_seconds),
        )
        .await;

        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        let build_result = build_outcome?;

        if build_result.status != build::BuildStatus::Success {
            return Err(OrchestratorError::Validation(
                build_result.error.unwrap_or_else(|| "build failed".to_string()),
            ));
        }
        let artifact_path = build_result.artifact_path.expect("success implies artifact");
        self.db
            .insert_artifact(
                deployment_id,
                &artifact_path.to_string_lossy(),
                build_result.size,
                &build_result.sha256,
            )
            .await?;

        let existing = self.db.artifacts_for_project_of(deployment_id).await?;
        build::reap_project_artifacts(
            &existing.into_iter().map(|a| PathBuf::from(a.file_path)).collect::<Vec<_>>(),
            &artifact_path,
        )
        .await;

        if cancelled.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.deploy_and_health_check(row, project, &artifact_path, cancelled)
            .await
    }

    /// `UPLOAD` deployments skip clone/build entirely: the artifact is
    /// already on disk, its row written by the HTTP boundary before the
    /// deployment was submitted (§4.7 kind == UPLOAD).
    async fn run_upload(
        &self,
        row: &DeploymentRow,
        project: &ProjectConfig,
        cancelled: &AtomicBool,
    ) -> Result<()> {
        let deployment_id = row.id;
        self.set_status(deployment_id, DeploymentStatus::Uploading).await?;

        let artifact = self
            .db
            .artifact_for_deployment(deployment_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::Validation(
                    "upload deployment has no artifact recorded".to_string(),
                )
            })?;
        let artifact_path = PathBuf::from(artifact.file_path);
        if !tokio::fs::try_exists(&artifact_path).await.unwrap_or(false) {
            return Err(OrchestratorError::Validation(format!(
                "uploaded artifact missing from disk: {}",
                artifact_path.display()
            )));
        }

        self.deploy_and_health_check(row, project, &artifact_path, cancelled)
            .await
    }

    async fn run_restart_only(&self, row: &DeploymentRow, project: &ProjectConfig) -> Result<()> {
        let deployment_id = row.id;
        let script = project.restart_only_script.clone().ok_or_else(|| {
            OrchestratorError::Validation(
                "restart-only deployment requires restart_only_script_path".to_string(),
            )
        })?;

        self.set_status(deployment_id, DeploymentStatus::Restarting).await?;
        let pipeline = self.logs.get_or_create(deployment_id);
        let servers = self.resolve_servers(row).await?;

        // Restart aggregates across every server rather than halting on
        // the first failure (§9 decision).
        let mut first_error = None;
        for server in &servers {
            if !server.active {
                pipeline.warning(format!("skipping inactive server {}", server.name)).await;
                continue;
            }
            let session = match self.connect(server).await {
                Ok(session) => session,
                Err(err) => {
                    pipeline.error(format!("connect to {} failed: {err}", server.name)).await;
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            if let Err(err) = fanout::run_restart_script(
                session,
                &script,
                false,
                self.config.deployment_log_verbosity,
                &pipeline,
            )
            .await
            {
                pipeline.error(format!("restart on {} failed: {err}", server.name)).await;
                first_error.get_or_insert(OrchestratorError::RemoteExec(err.to_string()));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn deploy_and_health_check(
        &self,
        row: &DeploymentRow,
        project: &ProjectConfig,
        artifact_path: &Path,
        cancelled: &AtomicBool,
    ) -> Result<()> {
        let deployment_id = row.id;
        let pipeline = self.logs.get_or_create(deployment_id);

        self.set_status(deployment_id, DeploymentStatus::Deploying).await?;
        let servers = self.resolve_servers(row).await?;

        fanout::deploy_to_servers(
            &self.db,
            &servers,
            project,
            artifact_path,
            deployment_id,
            Duration::from_secs(self.config.ssh_timeout_seconds),
            self.config.deployment_log_verbosity,
            &pipeline,
            FailurePolicy::HaltOnFirst,
        )
        .await
        .map_err(|e| OrchestratorError::RemoteExec(e.to_string()))?;

        if cancelled.load(Ordering::SeqCst) {
            return Ok(());
        }

        let Some(health_check) = &project.health_check else {
            return Ok(());
        };

        self.set_status(deployment_id, DeploymentStatus::HealthChecking).await?;
        // Health checking aggregates across every server rather than
        // halting on the first failure (§9 decision).
        let mut all_ok = true;
        for server in &servers {
            if !server.active {
                continue;
            }
            let ssh = if health_check.check_type == dockhand_common::HealthCheckType::Command {
                Some(self.connect(server).await?)
            } else {
                None
            };
            let ok = health::check(
                health_check,
                &server.host,
                project.upload_path.as_deref().unwrap_or_default(),
                ssh,
                self.config.deployment_log_verbosity,
                &pipeline,
            )
            .await
            .map_err(|e| OrchestratorError::Validation(e.to_string()))?;
            if !ok {
                pipeline.error(format!("health check failed on {}", server.name)).await;
                all_ok = false;
            }
        }

        if !all_ok {
            return Err(OrchestratorError::Validation(
                "health check failed on one or more servers".to_string(),
            ));
        }
        Ok(())
    }

    async fn resolve_servers(&self, row: &DeploymentRow) -> Result<Vec<ServerTarget>> {
        let rows = self.db.servers_for_groups(&row.target_server_ids()).await?;
        rows.into_iter()
            .map(ServerTarget::from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(OrchestratorError::Validation)
    }

    async fn connect(&self, server: &ServerTarget) -> Result<Arc<SshSession>> {
        let server = server.clone();
        let timeout = Duration::from_secs(self.config.ssh_timeout_seconds);
        let session = tokio::task::spawn_blocking(move || {
            SshSession::connect(&server.host, server.port, "deploy", &server.auth, timeout)
        })
        .await
        .map_err(|e| OrchestratorError::Internal(format!("ssh connect task panicked: {e}")))??;
        Ok(Arc::new(session))
    }

    async fn set_status(&self, deployment_id: DeploymentId, status: DeploymentStatus) -> Result<()> {
        self.db.update_status(deployment_id, status, None, None).await?;
        Ok(())
    }
}
