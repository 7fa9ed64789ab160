use std::path::PathBuf;

use derive_builder::Builder;
use strum::{Display, EnumString};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Presentation switch threaded through the Builder, SSH streaming, and
/// Health Prober (§9 decision: a single process-wide switch, not a
/// per-stage flag).
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum LogVerbosity {
    Minimal,
    Detailed,
}

impl LogVerbosity {
    pub fn is_detailed(self) -> bool {
        matches!(self, Self::Detailed)
    }
}

/// The host-key verification policy of the SSH Executor (§4.4, §9).
///
/// Only `AutoAccept` is implemented; the enum exists so a future pinning
/// variant doesn't require touching call sites.
#[derive(Clone, Debug, Default)]
pub enum HostKeyPolicy {
    #[default]
    AutoAccept,
}

/// Process-wide configuration snapshot, loaded once at startup (§6
/// "Environment (core-relevant)", §9 "Global mutable state").
///
/// Mirrors the teacher's `DeployerServiceConfig`: a builder with defaults,
/// overridden from the environment, validated eagerly so a bad value fails
/// at startup rather than mid-deployment.
#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct Config {
    #[builder(default = "3")]
    pub max_concurrent_deployments: usize,
    #[builder(default = "3600")]
    pub build_timeout_seconds: u64,
    #[builder(default = "300")]
    pub ssh_timeout_seconds: u64,
    #[builder(default = "PathBuf::from(\"artifacts\")")]
    pub artifacts_dir: PathBuf,
    #[builder(default = "PathBuf::from(\"work\")")]
    pub work_dir: PathBuf,
    #[builder(default = "LogVerbosity::Detailed")]
    pub deployment_log_verbosity: LogVerbosity,
    #[builder(default = "2048")]
    pub max_artifacts_size_mb: u64,
    #[builder(default)]
    pub host_key_policy: HostKeyPolicy,
}

impl Config {
    /// Loads configuration from the process environment, falling back to
    /// the documented defaults in §6. Fails fast on a value that doesn't
    /// parse rather than silently falling back.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::default();

        if let Some(v) = parse_env("MAX_CONCURRENT_DEPLOYMENTS")? {
            builder.max_concurrent_deployments(v);
        }
        if let Some(v) = parse_env("BUILD_TIMEOUT_SECONDS")? {
            builder.build_timeout_seconds(v);
        }
        if let Some(v) = parse_env("SSH_TIMEOUT_SECONDS")? {
            builder.ssh_timeout_seconds(v);
        }
        if let Ok(v) = std::env::var("ARTIFACTS_DIR") {
            builder.artifacts_dir(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("WORK_DIR") {
            builder.work_dir(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DEPLOYMENT_LOG_VERBOSITY") {
            let verbosity: LogVerbosity = v.parse().map_err(|_| ConfigError::InvalidValue {
                var: "DEPLOYMENT_LOG_VERBOSITY",
                value: v,
            })?;
            builder.deployment_log_verbosity(verbosity);
        }
        if let Some(v) = parse_env("MAX_ARTIFACTS_SIZE_MB")? {
            builder.max_artifacts_size_mb(v);
        }

        builder
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                var: "<config>",
                value: e.to_string(),
            })
    }
}

fn parse_env<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ConfigBuilder::default().build().unwrap();
        assert_eq!(config.max_concurrent_deployments, 3);
        assert_eq!(config.build_timeout_seconds, 3600);
        assert_eq!(config.ssh_timeout_seconds, 300);
        assert_eq!(config.deployment_log_verbosity, LogVerbosity::Detailed);
    }

    #[test]
    fn verbosity_parses_case_insensitively() {
        assert_eq!(
            "MINIMAL".parse::<LogVerbosity>().unwrap(),
            LogVerbosity::Minimal
        );
    }
}
