/// Raw DDL for the nine tables of §3/§6, run as `CREATE TABLE IF NOT
/// EXISTS` at startup — schema migrations are an out-of-core collaborator
/// concern (§1), so this is the entire forward schema, not a migration
/// chain.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    git_url TEXT NOT NULL,
    credential_kind TEXT NOT NULL,
    credential_secret TEXT,
    kind TEXT NOT NULL,
    build_command TEXT NOT NULL,
    install_command TEXT,
    auto_install INTEGER NOT NULL DEFAULT 0,
    output_dir TEXT NOT NULL,
    upload_path TEXT,
    restart_script TEXT,
    restart_only_script TEXT,
    environment TEXT NOT NULL,
    health_check_json TEXT
);

CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    ssh_auth_kind TEXT NOT NULL,
    ssh_auth_secret TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    reachability TEXT NOT NULL DEFAULT 'untested'
);

CREATE TABLE IF NOT EXISTS server_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    environment TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS server_group_members (
    server_group_id INTEGER NOT NULL REFERENCES server_groups(id),
    server_id INTEGER NOT NULL REFERENCES servers(id),
    PRIMARY KEY (server_group_id, server_id)
);

CREATE TABLE IF NOT EXISTS deployments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id),
    branch TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    current_step TEXT,
    commit_hash TEXT,
    commit_message TEXT,
    target_server_group_ids TEXT NOT NULL,
    rollback_from INTEGER REFERENCES deployments(id),
    environment TEXT NOT NULL,
    error_message TEXT,
    created_at TEXT NOT NULL,
    created_by INTEGER REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS deployment_artifacts (
    deployment_id INTEGER PRIMARY KEY REFERENCES deployments(id),
    file_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    sha256 TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deployment_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    deployment_id INTEGER NOT NULL REFERENCES deployments(id),
    level TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deployment_server_mappings (
    deployment_id INTEGER NOT NULL REFERENCES deployments(id),
    server_id INTEGER NOT NULL REFERENCES servers(id),
    status TEXT NOT NULL,
    PRIMARY KEY (deployment_id, server_id)
);

CREATE TABLE IF NOT EXISTS audit_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER REFERENCES users(id),
    action TEXT NOT NULL,
    resource_kind TEXT NOT NULL,
    resource_id INTEGER,
    details_json TEXT,
    ip TEXT,
    user_agent TEXT,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deployment_logs_deployment_id ON deployment_logs(deployment_id, id);
CREATE INDEX IF NOT EXISTS idx_deployments_project_id ON deployments(project_id);
";
