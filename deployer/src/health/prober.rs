use std::sync::Arc;
use std::time::Duration;

use dockhand_common::HealthCheckType;

use crate::config::LogVerbosity;
use crate::log_pipeline::LogPipeline;
use crate::ssh::SshSession;

use super::config::HealthCheckConfig;
use super::error::ProbeError;

/// Runs the retry loop over a single probe kind for a single server
/// (§4.5). First success short-circuits; final outcome is boolean.
pub async fn check(
    config: &HealthCheckConfig,
    server_host: &str,
    upload_path: &str,
    ssh: Option<Arc<SshSession>>,
    verbosity: LogVerbosity,
    log: &LogPipeline,
) -> Result<bool, ProbeError> {
    let timeout = Duration::from_secs(config.timeout_seconds);

    for attempt in 1..=config.retries.max(1) {
        let outcome = match config.check_type {
            HealthCheckType::Http => probe_http(config, server_host, timeout).await,
            HealthCheckType::Tcp => probe_tcp(config, server_host, timeout).await,
            HealthCheckType::Command => {
                let session = ssh.clone().ok_or_else(|| {
                    ProbeError::Configuration(
                        "command health check requires an SSH session".to_string(),
                    )
                })?;
                probe_command(config, upload_path, session).await
            }
        };

        match outcome {
            Ok(true) => return Ok(true),
            Ok(false) => {
                if verbosity.is_detailed() {
                    log.warning(format!(
                        "health check attempt {attempt}/{} did not succeed",
                        config.retries
                    ))
                    .await;
                }
            }
            Err(err) => {
                if verbosity.is_detailed() {
                    log.warning(format!("health check attempt {attempt} errored: {err}"))
                        .await;
                }
            }
        }

        if attempt < config.retries {
            tokio::time::sleep(Duration::from_secs(config.interval_seconds)).await;
        }
    }

    Ok(false)
}

async fn probe_http(
    config: &HealthCheckConfig,
    server_host: &str,
    timeout: Duration,
) -> Result<bool, ProbeError> {
    let url = config
        .resolved_url(server_host)
        .ok_or_else(|| ProbeError::Configuration("http health check has no url".to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Configuration(e.to_string()))?;

    match client.get(&url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            Ok((200..400).contains(&status))
        }
        Err(_) => Ok(false),
    }
}

async fn probe_tcp(
    config: &HealthCheckConfig,
    server_host: &str,
    timeout: Duration,
) -> Result<bool, ProbeError> {
    let port = config
        .port
        .ok_or_else(|| ProbeError::Configuration("tcp health check has no port".to_string()))?;

    let addr = format!("{server_host}:{port}");
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => Ok(true),
        _ => Ok(false),
    }
}

async fn probe_command(
    config: &HealthCheckConfig,
    upload_path: &str,
    ssh: Arc<SshSession>,
) -> Result<bool, ProbeError> {
    let command = config
        .command
        .clone()
        .ok_or_else(|| ProbeError::Configuration("command health check has no command".to_string()))?;
    let full_command = format!("cd {upload_path} && {command}");

    let (exit_code, _stdout, _stderr) =
        tokio::task::spawn_blocking(move || ssh.exec(&full_command))
            .await
            .map_err(|e| ProbeError::Configuration(format!("health check task panicked: {e}")))?
            .map_err(|e| ProbeError::Configuration(e.to_string()))?;

    Ok(exit_code == 0)
}
