use dockhand_common::{DeploymentId, DeploymentKind, DeploymentStatus, Environment, ProjectId};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeploymentRow {
    pub id: DeploymentId,
    pub project_id: ProjectId,
    pub branch: String,
    #[sqlx(try_from = "String")]
    pub kind: DeploymentKindColumn,
    #[sqlx(try_from = "String")]
    pub status: DeploymentStatusColumn,
    pub progress: i64,
    pub current_step: Option<String>,
    pub commit_hash: Option<String>,
    pub commit_message: Option<String>,
    pub target_server_group_ids: String,
    pub rollback_from: Option<DeploymentId>,
    #[sqlx(try_from = "String")]
    pub environment: EnvironmentColumn,
    pub error_message: Option<String>,
    pub created_at: String,
    pub created_by: Option<i64>,
}

/// Thin newtype wrappers so `sqlx::FromRow`'s `try_from = "String"` can
/// delegate to `strum`'s `FromStr` impl on the shared enum types.
macro_rules! strum_column {
    ($wrapper:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $wrapper(pub $inner);

        impl TryFrom<String> for $wrapper {
            type Error = strum::ParseError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse().map($wrapper)
            }
        }
    };
}

strum_column!(DeploymentKindColumn, DeploymentKind);
strum_column!(DeploymentStatusColumn, DeploymentStatus);
strum_column!(EnvironmentColumn, Environment);

impl DeploymentRow {
    pub fn target_server_ids(&self) -> Vec<i64> {
        self.target_server_group_ids
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArtifactRow {
    pub deployment_id: DeploymentId,
    pub file_path: String,
    pub size_bytes: i64,
    pub sha256: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServerRow {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub ssh_auth_kind: String,
    pub ssh_auth_secret: Option<String>,
    pub active: bool,
    pub reachability: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: ProjectId,
    pub name: String,
    pub git_url: String,
    pub credential_kind: String,
    pub credential_secret: Option<String>,
    pub kind: String,
    pub build_command: String,
    pub install_command: Option<String>,
    pub auto_install: bool,
    pub output_dir: String,
    pub upload_path: Option<String>,
    pub restart_script: Option<String>,
    pub restart_only_script: Option<String>,
    pub environment: String,
    pub health_check_json: Option<String>,
}
