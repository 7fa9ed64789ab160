use dockhand_common::{Credentials, Environment, ProjectKind, SshAuth};

use crate::db::{ProjectRow, ServerRow};
use crate::health::HealthCheckConfig;

/// A project's configuration, decoded from its stored row into the typed
/// values the orchestrator and its subsystems operate on (§3).
#[derive(Clone, Debug)]
pub struct ProjectConfig {
    pub id: i64,
    pub name: String,
    pub git_url: String,
    pub credentials: Credentials,
    pub kind: ProjectKind,
    pub build_command: String,
    pub install_command: Option<String>,
    pub auto_install: bool,
    pub output_dir: String,
    pub upload_path: Option<String>,
    pub restart_script: Option<String>,
    pub restart_only_script: Option<String>,
    pub environment: Environment,
    pub health_check: Option<HealthCheckConfig>,
}

impl ProjectConfig {
    pub fn from_row(row: ProjectRow) -> Result<Self, String> {
        let credentials = match row.credential_kind.as_str() {
            "none" => Credentials::None,
            "token" => Credentials::Token(row.credential_secret.unwrap_or_default()),
            "userpass" => {
                let mut parts = row.credential_secret.unwrap_or_default().splitn(2, '\u{1f}');
                let username = parts.next().unwrap_or_default().to_string();
                let password = parts.next().unwrap_or_default().to_string();
                Credentials::UserPass(username, password)
            }
            "sshkey" => Credentials::SshKey(
                row.credential_secret
                    .unwrap_or_default()
                    .into_bytes(),
            ),
            other => return Err(format!("unknown credential kind: {other}")),
        };

        let kind: ProjectKind = row
            .kind
            .parse()
            .map_err(|_| format!("unknown project kind: {}", row.kind))?;
        let environment: Environment = row
            .environment
            .parse()
            .map_err(|_| format!("unknown environment: {}", row.environment))?;

        let health_check = row
            .health_check_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e: serde_json::Error| format!("invalid health_check_json: {e}"))?;

        Ok(Self {
            id: row.id,
            name: row.name,
            git_url: row.git_url,
            credentials,
            kind,
            build_command: row.build_command,
            install_command: row.install_command,
            auto_install: row.auto_install,
            output_dir: row.output_dir,
            upload_path: row.upload_path,
            restart_script: row.restart_script,
            restart_only_script: row.restart_only_script,
            environment,
            health_check,
        })
    }
}

/// A server the fan-out targets, decoded into typed SSH auth (§3).
#[derive(Clone, Debug)]
pub struct ServerTarget {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub auth: SshAuth,
    pub active: bool,
}

impl ServerTarget {
    pub fn from_row(row: ServerRow) -> Result<Self, String> {
        let auth = match row.ssh_auth_kind.as_str() {
            "password" => SshAuth::Password(row.ssh_auth_secret.unwrap_or_default()),
            "key" => SshAuth::Key(row.ssh_auth_secret.unwrap_or_default().into_bytes()),
            other => return Err(format!("unknown ssh auth kind: {other}")),
        };
        Ok(Self {
            id: row.id,
            name: row.name,
            host: row.host,
            port: row.port as u16,
            auth,
            active: row.active,
        })
    }
}
