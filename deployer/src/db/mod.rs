mod models;
mod schema;

pub use models::{ArtifactRow, DeploymentRow, ProjectRow, ServerRow};

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use dockhand_common::{DeploymentId, DeploymentKind, DeploymentStatus, Environment, LogEntry, ProjectId};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::migrate::MigrateDatabase;

use crate::log_pipeline::LogSink;

/// The relational store collaborator (§6): one pool shared by the process,
/// one logical session per deployment task (§5 "Shared resources").
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(path: &Path) -> Result<Self, sqlx::Error> {
        let url = format!("sqlite://{}", path.display());
        if !Sqlite::database_exists(&url).await.unwrap_or(false) {
            Sqlite::create_database(&url).await?;
        }
        let pool = SqlitePool::connect(&url).await?;
        Self::from_pool(pool).await
    }

    pub async fn connect_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(schema::SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_deployment(
        &self,
        project_id: ProjectId,
        branch: &str,
        kind: DeploymentKind,
        target_server_group_ids: &[i64],
        environment: Environment,
        rollback_from: Option<DeploymentId>,
        created_by: Option<i64>,
    ) -> Result<DeploymentId, sqlx::Error> {
        let targets = target_server_group_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO deployments
                (project_id, branch, kind, status, progress, target_server_group_ids,
                 rollback_from, environment, created_at, created_by)
             VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(branch)
        .bind(kind.to_string())
        .bind(DeploymentStatus::Pending.to_string())
        .bind(targets)
        .bind(rollback_from)
        .bind(environment.to_string())
        .bind(now)
        .bind(created_by)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn update_status(
        &self,
        deployment_id: DeploymentId,
        status: DeploymentStatus,
        current_step: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE deployments
             SET status = ?, progress = ?, current_step = ?, error_message = ?
             WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(status.progress() as i64)
        .bind(current_step)
        .bind(error_message)
        .bind(deployment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_commit_info(
        &self,
        deployment_id: DeploymentId,
        commit_hash: &str,
        commit_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE deployments SET commit_hash = ?, commit_message = ? WHERE id = ?",
        )
        .bind(commit_hash)
        .bind(commit_message)
        .bind(deployment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_deployment(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Option<DeploymentRow>, sqlx::Error> {
        sqlx::query_as::<_, DeploymentRow>("SELECT * FROM deployments WHERE id = ?")
            .bind(deployment_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_deployments(&self) -> Result<Vec<DeploymentRow>, sqlx::Error> {
        sqlx::query_as::<_, DeploymentRow>("SELECT * FROM deployments ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await
    }

    /// Deployments left in a non-terminal, non-queued status, for the
    /// startup reconciliation pass (§4.10). QUEUED rows were never running
    /// and are left untouched — they remain valid candidates for an
    /// operator's manual retry.
    pub async fn non_terminal_deployments(&self) -> Result<Vec<DeploymentId>, sqlx::Error> {
        let rows: Vec<(DeploymentId,)> = sqlx::query_as(
            "SELECT id FROM deployments WHERE status NOT IN (?, ?, ?, ?)",
        )
        .bind(DeploymentStatus::Success.to_string())
        .bind(DeploymentStatus::Failed.to_string())
        .bind(DeploymentStatus::Cancelled.to_string())
        .bind(DeploymentStatus::Queued.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn insert_artifact(
        &self,
        deployment_id: DeploymentId,
        file_path: &str,
        size_bytes: u64,
        sha256: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO deployment_artifacts (deployment_id, file_path, size_bytes, sha256)
             VALUES (?, ?, ?, ?)",
        )
        .bind(deployment_id)
        .bind(file_path)
        .bind(size_bytes as i64)
        .bind(sha256)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Artifacts belonging to the same project as `deployment_id`, newest
    /// first, for the per-project reap (§4.9).
    pub async fn artifacts_for_project_of(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Vec<ArtifactRow>, sqlx::Error> {
        sqlx::query_as::<_, ArtifactRow>(
            "SELECT a.* FROM deployment_artifacts a
             JOIN deployments d ON d.id = a.deployment_id
             WHERE d.project_id = (SELECT project_id FROM deployments WHERE id = ?)
             ORDER BY a.deployment_id DESC",
        )
        .bind(deployment_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_project(&self, project_id: ProjectId) -> Result<Option<ProjectRow>, sqlx::Error> {
        sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Servers in enumeration order, for every group in `group_ids`,
    /// preserving the group's own selection order (§4.8 "traversed in
    /// selection order").
    pub async fn servers_for_groups(
        &self,
        group_ids: &[i64],
    ) -> Result<Vec<ServerRow>, sqlx::Error> {
        let mut servers = Vec::new();
        for group_id in group_ids {
            let group_servers = sqlx::query_as::<_, ServerRow>(
                "SELECT s.* FROM servers s
                 JOIN server_group_members m ON m.server_id = s.id
                 WHERE m.server_group_id = ?
                 ORDER BY s.id ASC",
            )
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
            servers.extend(group_servers);
        }
        Ok(servers)
    }

    pub async fn set_server_mapping_status(
        &self,
        deployment_id: DeploymentId,
        server_id: i64,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO deployment_server_mappings (deployment_id, server_id, status)
             VALUES (?, ?, ?)
             ON CONFLICT(deployment_id, server_id) DO UPDATE SET status = excluded.status",
        )
        .bind(deployment_id)
        .bind(server_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The artifact belonging directly to this deployment — either the one
    /// the Builder produced, or, for `UPLOAD` deployments, the one the HTTP
    /// boundary wrote before submitting the deployment for execution.
    pub async fn artifact_for_deployment(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Option<ArtifactRow>, sqlx::Error> {
        sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM deployment_artifacts WHERE deployment_id = ?",
        )
        .bind(deployment_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn latest_artifact_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<ArtifactRow>, sqlx::Error> {
        sqlx::query_as::<_, ArtifactRow>(
            "SELECT a.* FROM deployment_artifacts a
             JOIN deployments d ON d.id = a.deployment_id
             WHERE d.project_id = ? AND d.status = ?
             ORDER BY a.deployment_id DESC LIMIT 1",
        )
        .bind(project_id)
        .bind(DeploymentStatus::Success.to_string())
        .fetch_optional(&self.pool)
        .await
    }

    /// Incremental fetch contract (§4.1): entries with id > `since_id`
    /// capped at 100, or the most recent 500 in ascending order when no
    /// bound is given, plus the max id returned.
    pub async fn fetch_logs(
        &self,
        deployment_id: DeploymentId,
        since_id: Option<i64>,
    ) -> Result<(Vec<LogEntry>, Option<i64>), sqlx::Error> {
        let rows: Vec<(i64, String, String, String)> = if let Some(since_id) = since_id {
            sqlx::query_as(
                "SELECT id, level, content, timestamp FROM deployment_logs
                 WHERE deployment_id = ? AND id > ? ORDER BY id ASC LIMIT 100",
            )
            .bind(deployment_id)
            .bind(since_id)
            .fetch_all(&self.pool)
            .await?
        } else {
            let mut rows: Vec<(i64, String, String, String)> = sqlx::query_as(
                "SELECT id, level, content, timestamp FROM deployment_logs
                 WHERE deployment_id = ? ORDER BY id DESC LIMIT 500",
            )
            .bind(deployment_id)
            .fetch_all(&self.pool)
            .await?;
            rows.reverse();
            rows
        };

        let max_id = rows.last().map(|(id, ..)| *id);
        let entries = rows
            .into_iter()
            .map(|(id, level, content, timestamp)| LogEntry {
                id: Some(id),
                level: level.parse().unwrap_or(dockhand_common::LogLevel::Info),
                content,
                timestamp: timestamp
                    .parse()
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect();
        Ok((entries, max_id))
    }
}

#[async_trait]
impl LogSink for Db {
    async fn insert_logs(
        &self,
        deployment_id: DeploymentId,
        entries: &[LogEntry],
    ) -> Result<(), sqlx::Error> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO deployment_logs (deployment_id, level, content, timestamp)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(deployment_id)
            .bind(entry.level.to_string())
            .bind(&entry.content)
            .bind(entry.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_common::LogLevel;

    #[tokio::test]
    async fn create_and_fetch_deployment_round_trips() {
        let db = Db::connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO projects (name, git_url, credential_kind, kind, build_command, output_dir, environment) VALUES ('p', 'https://example.com/r.git', 'none', 'backend', 'make', 'dist', 'development')")
            .execute(&db.pool)
            .await
            .unwrap();

        let id = db
            .create_deployment(1, "main", DeploymentKind::Full, &[1, 2], Environment::Development, None, None)
            .await
            .unwrap();

        let row = db.get_deployment(id).await.unwrap().unwrap();
        assert_eq!(row.branch, "main");
        assert_eq!(row.target_server_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn log_sink_inserts_and_fetch_logs_returns_them_in_order() {
        let db = Db::connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO projects (name, git_url, credential_kind, kind, build_command, output_dir, environment) VALUES ('p', 'https://example.com/r.git', 'none', 'backend', 'make', 'dist', 'development')")
            .execute(&db.pool)
            .await
            .unwrap();
        let id = db
            .create_deployment(1, "main", DeploymentKind::Full, &[], Environment::Development, None, None)
            .await
            .unwrap();

        let entries = vec![
            LogEntry::new(LogLevel::Info, "one"),
            LogEntry::new(LogLevel::Info, "two"),
        ];
        db.insert_logs(id, &entries).await.unwrap();

        let (fetched, max_id) = db.fetch_logs(id, None).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].content, "one");
        assert!(max_id.is_some());
    }

    #[tokio::test]
    async fn non_terminal_deployments_excludes_terminal_statuses() {
        let db = Db::connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO projects (name, git_url, credential_kind, kind, build_command, output_dir, environment) VALUES ('p', 'https://example.com/r.git', 'none', 'backend', 'make', 'dist', 'development')")
            .execute(&db.pool)
            .await
            .unwrap();
        let id = db
            .create_deployment(1, "main", DeploymentKind::Full, &[], Environment::Development, None, None)
            .await
            .unwrap();
        db.update_status(id, DeploymentStatus::Building, None, None)
            .await
            .unwrap();

        let pending = db.non_terminal_deployments().await.unwrap();
        assert_eq!(pending, vec![id]);

        db.update_status(id, DeploymentStatus::Success, None, None)
            .await
            .unwrap();
        let pending = db.non_terminal_deployments().await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn non_terminal_deployments_excludes_queued() {
        let db = Db::connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO projects (name, git_url, credential_kind, kind, build_command, output_dir, environment) VALUES ('p', 'https://example.com/r.git', 'none', 'backend', 'make', 'dist', 'development')")
            .execute(&db.pool)
            .await
            .unwrap();
        let id = db
            .create_deployment(1, "main", DeploymentKind::Full, &[], Environment::Development, None, None)
            .await
            .unwrap();
        db.update_status(
            id,
            DeploymentStatus::Queued,
            None,
            Some("maximum concurrent deployments reached"),
        )
        .await
        .unwrap();

        let pending = db.non_terminal_deployments().await.unwrap();
        assert!(pending.is_empty());
    }
}
