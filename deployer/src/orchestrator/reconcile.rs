use crate::db::Db;

/// Crash recovery (§4.10): any deployment still in a non-terminal status
/// when the process starts was orphaned by a previous crash or restart —
/// nothing is resuming its in-flight build or SSH session, so it is marked
/// `FAILED` rather than left to hang forever.
pub async fn reconcile_on_startup(db: &Db) -> Result<usize, sqlx::Error> {
    let stuck = db.non_terminal_deployments().await?;
    let count = stuck.len();
    for deployment_id in stuck {
        tracing::warn!(deployment_id, "marking orphaned deployment as failed on startup");
        db.update_status(
            deployment_id,
            dockhand_common::DeploymentStatus::Failed,
            None,
            Some("deployment was orphaned by a process restart"),
        )
        .await?;
    }
    Ok(count)
}
