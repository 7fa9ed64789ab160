use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dockhand_common::{DeploymentId, ProjectKind};
use tokio::sync::mpsc;

use crate::config::LogVerbosity;
use crate::db::Db;
use crate::log_pipeline::LogPipeline;
use crate::ssh::{SshError, SshSession, TransferStats};

use super::types::{ProjectConfig, ServerTarget};

#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    #[error("ssh error: {0}")]
    Ssh(#[from] SshError),
    #[error("{0}")]
    Deploy(String),
}

/// Whether a failure on one server should stop the whole fan-out, or be
/// recorded and the remaining servers still attempted (SPEC_FULL.md §4.8,
/// §9: DEPLOYING and Rollback halt on first failure; RESTARTING and
/// HEALTH_CHECKING aggregate across every server).
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum FailurePolicy {
    HaltOnFirst,
    AggregateAcrossServers,
}

/// Deploys the artifact to every active server in `servers`, honoring
/// `policy` for how a single server's failure affects the rest.
///
/// Returns the error of the first failing server when `HaltOnFirst`; under
/// `AggregateAcrossServers` every server is attempted regardless, and the
/// first error encountered (if any) is still what the caller surfaces as
/// the deployment's `error_message`, per §4.8's "first failing server's
/// error captured".
pub async fn deploy_to_servers(
    db: &Db,
    servers: &[ServerTarget],
    project: &ProjectConfig,
    artifact_path: &Path,
    deployment_id: DeploymentId,
    ssh_timeout: Duration,
    verbosity: LogVerbosity,
    log: &LogPipeline,
    policy: FailurePolicy,
) -> Result<(), FanoutError> {
    deploy_to_servers_with_restart_policy(
        db,
        servers,
        project,
        artifact_path,
        deployment_id,
        ssh_timeout,
        verbosity,
        log,
        policy,
        true,
    )
    .await
}

/// Like [`deploy_to_servers`], but also controls whether a failing restart
/// script halts the fan-out or is logged and treated as a warning — the
/// Rollback Driver's restart step is best-effort (§4.11) while the normal
/// `DEPLOYING` fan-out's restart step is not.
pub async fn deploy_to_servers_with_restart_policy(
    db: &Db,
    servers: &[ServerTarget],
    project: &ProjectConfig,
    artifact_path: &Path,
    deployment_id: DeploymentId,
    ssh_timeout: Duration,
    verbosity: LogVerbosity,
    log: &LogPipeline,
    policy: FailurePolicy,
    restart_halt_on_failure: bool,
) -> Result<(), FanoutError> {
    let mut first_error = None;

    for server in servers {
        if !server.active {
            log.warning(format!("skipping inactive server {}", server.name)).await;
            continue;
        }

        let result = deploy_to_server(
            server,
            project,
            artifact_path,
            ssh_timeout,
            verbosity,
            log,
            restart_halt_on_failure,
        )
        .await;
        let mapping_status = if result.is_ok() { "success" } else { "failed" };
        if let Err(err) = db.set_server_mapping_status(deployment_id, server.id, mapping_status).await {
            log.warning(format!("failed to record server mapping status: {err}")).await;
        }

        if let Err(err) = result {
            log.error(format!("deployment to {} failed: {err}", server.name)).await;
            if first_error.is_none() {
                first_error = Some(err);
            }
            if policy == FailurePolicy::HaltOnFirst {
                break;
            }
        } else {
            log.info(format!("deployment to {} succeeded", server.name)).await;
        }
    }

    match (policy, first_error) {
        (_, None) => Ok(()),
        (_, Some(err)) => Err(err),
    }
}

async fn deploy_to_server(
    server: &ServerTarget,
    project: &ProjectConfig,
    artifact_path: &Path,
    ssh_timeout: Duration,
    verbosity: LogVerbosity,
    log: &LogPipeline,
    restart_halt_on_failure: bool,
) -> Result<(), FanoutError> {
    let session = Arc::new(connect(server, ssh_timeout).await?);

    let upload_path = project
        .upload_path
        .clone()
        .ok_or_else(|| FanoutError::Deploy("project has no upload_path".to_string()))?;

    let artifact_name = artifact_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FanoutError::Deploy("artifact path has no file name".to_string()))?
        .to_string();

    match project.kind {
        ProjectKind::Frontend => {
            frontend_atomic_swap(&session, &upload_path, artifact_path, &artifact_name, log).await?
        }
        ProjectKind::Backend | ProjectKind::Java => {
            backend_in_place_overwrite(&session, &upload_path, artifact_path, &artifact_name, log)
                .await?
        }
    }

    if let Some(restart_script) = &project.restart_script {
        run_restart_script(session, restart_script, restart_halt_on_failure, verbosity, log).await?;
    }

    Ok(())
}

async fn connect(server: &ServerTarget, timeout: Duration) -> Result<SshSession, FanoutError> {
    let server = server.clone();
    tokio::task::spawn_blocking(move || {
        SshSession::connect(&server.host, server.port, "deploy", &server.auth, timeout)
    })
    .await
    .map_err(|e| FanoutError::Deploy(format!("ssh connect task panicked: {e}")))?
    .map_err(FanoutError::from)
}

/// Atomic directory swap for static content (§4.8 "Frontend deployment").
async fn frontend_atomic_swap(
    session: &Arc<SshSession>,
    upload_path: &str,
    artifact_path: &Path,
    artifact_name: &str,
    log: &LogPipeline,
) -> Result<(), FanoutError> {
    let target = PathBuf::from(upload_path);
    let parent = target
        .parent()
        .ok_or_else(|| FanoutError::Deploy("upload_path has no parent directory".to_string()))?;
    let basename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FanoutError::Deploy("upload_path has no basename".to_string()))?;

    if upload_path == "/" || parent.as_os_str().is_empty() || parent == target {
        return Err(FanoutError::Deploy(
            "upload_path must not be the filesystem root".to_string(),
        ));
    }

    let remote_artifact = parent.join(artifact_name);
    let timestamp = chrono::Utc::now().format("%m%d-%H%M%S").to_string();
    let backup_path = parent.join(format!("{basename}-{timestamp}"));

    run(session, &format!("mkdir -p {}", parent.display())).await?;

    let (local, remote) = (artifact_path.to_path_buf(), remote_artifact.clone());
    upload(session, &local, &remote, log).await?;

    let had_existing = path_exists(session, &target).await?;
    let mut backup_made = false;
    if had_existing {
        run(
            session,
            &format!("mv {} {}", target.display(), backup_path.display()),
        )
        .await?;
        backup_made = path_exists(session, &backup_path).await?;
    }

    let unzip_result = run(
        session,
        &format!(
            "unzip -o {} -d {}",
            remote_artifact.display(),
            target.display()
        ),
    )
    .await;

    if let Err(err) = unzip_result {
        if backup_made {
            let restore = run(
                session,
                &format!("mv {} {}", backup_path.display(), target.display()),
            )
            .await;
            match restore {
                Ok(()) => log.error("unzip failed, restored previous version from backup".to_string()).await,
                Err(restore_err) => {
                    log.error(format!(
                        "unzip failed and restore also failed ({restore_err}); complete manually with: mv {} {}",
                        backup_path.display(),
                        target.display()
                    ))
                    .await;
                }
            }
        }
        let _ = run(session, &format!("rm -f {}", remote_artifact.display())).await;
        return Err(err);
    }

    if let Err(err) = run(session, &format!("rm -f {}", remote_artifact.display())).await {
        log.warning(format!("failed to remove staging artifact: {err}")).await;
    }

    Ok(())
}

/// In-place overwrite for backend/java deployments (§4.8). No backup.
async fn backend_in_place_overwrite(
    session: &Arc<SshSession>,
    upload_path: &str,
    artifact_path: &Path,
    artifact_name: &str,
    log: &LogPipeline,
) -> Result<(), FanoutError> {
    run(session, &format!("mkdir -p {upload_path}")).await?;
    let remote = PathBuf::from(upload_path).join(artifact_name);
    upload(session, &artifact_path.to_path_buf(), &remote, log).await?;
    run(session, &format!("unzip -o {} -d {upload_path}", remote.display())).await?;
    Ok(())
}

/// Restart step (§4.8): non-zero exit is fatal unless `halt_on_failure`
/// is false, in which case it is logged as a warning only (the rollback
/// flow's "best-effort" restart, §4.11). Per-line stdout/stderr logging is
/// gated on `verbosity`, same as the Builder's own streamed commands.
pub async fn run_restart_script(
    session: Arc<SshSession>,
    script_path: &str,
    halt_on_failure: bool,
    verbosity: LogVerbosity,
    log: &LogPipeline,
) -> Result<(), FanoutError> {
    let path = PathBuf::from(script_path);
    let (workdir, basename) = if path.is_absolute() {
        (
            path.parent().map(|p| p.display().to_string()).unwrap_or_default(),
            path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string(),
        )
    } else {
        (
            path.parent()
                .map(|p| p.display().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| ".".to_string()),
            path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string(),
        )
    };
    let full_command = format!("cd \"{workdir}\" && bash \"./{basename}\"");

    let (tx, mut rx) = mpsc::unbounded_channel::<(bool, String)>();
    let exec_session = session.clone();
    let exec_command = full_command.clone();
    let exec_task = tokio::task::spawn_blocking(move || {
        exec_session.exec_streaming(&exec_command, |is_stderr, line| {
            let _ = tx.send((is_stderr, line.to_string()));
        })
    });

    while let Some((is_stderr, line)) = rx.recv().await {
        if verbosity.is_detailed() {
            let prefixed = if is_stderr {
                format!("[stderr] {line}")
            } else {
                format!("[stdout] {line}")
            };
            log.info(prefixed).await;
        }
    }

    let (exit_code, _stdout, _stderr) = exec_task
        .await
        .map_err(|e| FanoutError::Deploy(format!("restart task panicked: {e}")))??;

    if exit_code != 0 {
        let message = format!("restart script exited with code {exit_code}");
        if halt_on_failure {
            return Err(FanoutError::Deploy(message));
        }
        log.warning(format!("{message} (best-effort, continuing)")).await;
    }

    Ok(())
}

async fn run(session: &Arc<SshSession>, command: &str) -> Result<(), FanoutError> {
    let session = session.clone();
    let command = command.to_string();
    let (exit_code, _stdout, stderr) = tokio::task::spawn_blocking(move || session.exec(&command))
        .await
        .map_err(|e| FanoutError::Deploy(format!("ssh exec task panicked: {e}")))??;
    if exit_code != 0 {
        return Err(FanoutError::Deploy(format!(
            "command `{command}` exited with {exit_code}: {stderr}"
        )));
    }
    Ok(())
}

/// Uploads `local` to `remote` over SFTP, logging a line at each +10%
/// transferred plus start/end lines with duration and throughput (§4.4).
async fn upload(
    session: &Arc<SshSession>,
    local: &Path,
    remote: &Path,
    log: &LogPipeline,
) -> Result<(), FanoutError> {
    let size = tokio::fs::metadata(local)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    log.info(format!("uploading {} ({size} bytes)", local.display())).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
    let upload_session = session.clone();
    let upload_local = local.to_path_buf();
    let upload_remote = remote.to_path_buf();
    let upload_task = tokio::task::spawn_blocking(move || {
        let stats = TransferStats::start();
        let result = upload_session.upload_file_with_progress(&upload_local, &upload_remote, |pct| {
            let _ = tx.send(pct);
        });
        (result, stats)
    });

    while let Some(pct) = rx.recv().await {
        log.info(format!("upload {pct}% complete")).await;
    }

    let (result, stats) = upload_task
        .await
        .map_err(|e| FanoutError::Deploy(format!("upload task panicked: {e}")))?;
    result?;

    let (elapsed, throughput) = stats.finish(size);
    log.info(format!(
        "upload finished in {:.1}s ({:.0} bytes/s)",
        elapsed.as_secs_f64(),
        throughput
    ))
    .await;
    Ok(())
}

async fn path_exists(session: &Arc<SshSession>, path: &Path) -> Result<bool, FanoutError> {
    let session = session.clone();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || session.file_exists(&path))
        .await
        .map_err(|e| FanoutError::Deploy(format!("stat task panicked: {e}")))?
        .map_err(FanoutError::from)
}
