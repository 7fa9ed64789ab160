pub mod credentials;
pub mod deployment;
pub mod log;
pub mod project;

pub use credentials::{Credentials, SshAuth};
pub use deployment::{DeploymentKind, DeploymentStatus, Environment};
pub use log::{LogEntry, LogLevel};
pub use project::{HealthCheckType, ProjectKind};

pub type DeploymentId = i64;
pub type ProjectId = i64;
pub type ServerId = i64;
pub type ServerGroupId = i64;
