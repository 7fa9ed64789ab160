use dockhand_common::{DeploymentKind, DeploymentStatus, Environment, LogEntry};
use serde::{Deserialize, Serialize};

use crate::db::DeploymentRow;

#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub project_id: i64,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub kind: DeploymentKind,
    #[serde(default)]
    pub target_server_group_ids: Vec<i64>,
    pub environment: Environment,
    #[serde(default)]
    pub created_by: Option<i64>,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Serialize)]
pub struct DeploymentResponse {
    pub id: i64,
    pub project_id: i64,
    pub branch: String,
    pub kind: DeploymentKind,
    pub status: DeploymentStatus,
    pub progress: u8,
    pub current_step: Option<String>,
    pub commit_hash: Option<String>,
    pub commit_message: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_log_id: Option<i64>,
}

impl DeploymentResponse {
    pub fn from_row(row: DeploymentRow) -> Self {
        let status = row.status.0;
        Self {
            id: row.id,
            project_id: row.project_id,
            branch: row.branch,
            kind: row.kind.0,
            progress: status.progress(),
            status,
            current_step: row.current_step,
            commit_hash: row.commit_hash,
            commit_message: row.commit_message,
            error_message: row.error_message,
            created_at: row.created_at,
            max_log_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub entries: Vec<LogEntry>,
    pub max_log_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub deployment_id: i64,
    pub status: DeploymentStatus,
}
