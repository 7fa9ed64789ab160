use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::config::LogVerbosity;
use crate::log_pipeline::LogPipeline;

use super::config::BuildConfig;
use super::error::BuildError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildStatus {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub status: BuildStatus,
    pub artifact_path: Option<PathBuf>,
    pub size: u64,
    pub sha256: String,
    pub error: Option<String>,
}

impl BuildResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            status: BuildStatus::Failed,
            artifact_path: None,
            size: 0,
            sha256: String::new(),
            error: Some(error.into()),
        }
    }

    fn cancelled() -> Self {
        Self {
            status: BuildStatus::Cancelled,
            artifact_path: None,
            size: 0,
            sha256: String::new(),
            error: None,
        }
    }
}

/// Runs the install → build → package → digest sequence (§4.3). The reap
/// step is the caller's responsibility (it needs project-scoped knowledge
/// the Builder itself doesn't have — see [`super::reaper`]).
///
/// `cancelled` is polled between stages only; an in-flight child process is
/// not forcibly killed (§4.3, design note on cooperative cancellation).
pub async fn build(
    source_dir: &Path,
    config: &BuildConfig,
    artifacts_dir: &Path,
    verbosity: LogVerbosity,
    log: &LogPipeline,
    cancelled: &AtomicBool,
    build_timeout: Duration,
) -> Result<BuildResult, BuildError> {
    if let Some(install_command) = config.effective_install_command() {
        log.info(format!("Executing install: {install_command}")).await;
        match run_streamed(source_dir, &install_command, verbosity, log).await {
            Ok(0) => {}
            Ok(code) => {
                log.error(format!("Install command exited with code {code} (continuing)"))
                    .await;
            }
            Err(err) => {
                log.error(format!("Install command failed to run: {err} (continuing)"))
                    .await;
            }
        }
    }

    if cancelled.load(Ordering::SeqCst) {
        return Ok(BuildResult::cancelled());
    }

    log.info(format!("Executing build: {}", config.build_command)).await;
    let exit_code = match tokio::time::timeout(
        build_timeout,
        run_streamed(source_dir, &config.build_command, verbosity, log),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            log.error(format!(
                "build command exceeded the {}s timeout",
                build_timeout.as_secs()
            ))
            .await;
            return Err(BuildError::Timeout(build_timeout.as_secs()));
        }
    };
    if exit_code != 0 {
        return Ok(BuildResult::failed(format!(
            "build script failed with exit code {exit_code}"
        )));
    }

    if cancelled.load(Ordering::SeqCst) {
        return Ok(BuildResult::cancelled());
    }

    let output_path = source_dir.join(&config.output_dir);
    if !output_path.exists() {
        return Ok(BuildResult::failed(format!(
            "output directory '{}' not found",
            config.output_dir
        )));
    }

    if cancelled.load(Ordering::SeqCst) {
        return Ok(BuildResult::cancelled());
    }

    let artifact_path = package(&output_path, artifacts_dir)
        .await
        .map_err(|e| BuildError::Packaging(e.to_string()))?;
    log.info(format!("Created artifact: {}", artifact_path.display()))
        .await;

    let sha256 = digest_file(&artifact_path).await?;
    let size = tokio::fs::metadata(&artifact_path).await?.len();
    log.info(format!("Artifact size: {size} bytes, sha256: {sha256}"))
        .await;

    Ok(BuildResult {
        status: BuildStatus::Success,
        artifact_path: Some(artifact_path),
        size,
        sha256,
        error: None,
    })
}

/// Parses `command_line` into argv by whitespace and runs it in `cwd`,
/// streaming combined stdout+stderr through the log pipeline at INFO (when
/// `verbosity` is detailed) or collecting it for one end-of-run entry
/// (when minimal).
async fn run_streamed(
    cwd: &Path,
    command_line: &str,
    verbosity: LogVerbosity,
    log: &LogPipeline,
) -> Result<i32, BuildError> {
    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| BuildError::Packaging("empty command".to_string()))?;
    let args: Vec<&str> = parts.collect();

    let mut child = Command::new(program)
        .args(&args)
        .current_dir(cwd)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    let mut stdout = BufReader::new(child.stdout.take().expect("piped stdout")).lines();
    let mut stderr_raw = child.stderr.take().expect("piped stderr");

    let mut collected = String::new();
    while let Some(line) = stdout.next_line().await? {
        if verbosity.is_detailed() {
            log.info(line).await;
        } else {
            collected.push_str(&line);
            collected.push('\n');
        }
    }

    let mut stderr_text = String::new();
    stderr_raw.read_to_string(&mut stderr_text).await?;
    if !verbosity.is_detailed() {
        collected.push_str(&stderr_text);
    } else {
        for line in stderr_text.lines() {
            if !line.is_empty() {
                log.info(line.to_string()).await;
            }
        }
    }

    let status = child.wait().await?;
    if !verbosity.is_detailed() && !collected.is_empty() {
        log.info(collected).await;
    }

    Ok(status.code().unwrap_or(-1))
}

/// Packages `source_path` into a deflated ZIP named by the current Unix
/// timestamp, walking it post-order with entry names relative to
/// `source_path` (§4.3 step 3).
async fn package(source_path: &Path, artifacts_dir: &Path) -> Result<PathBuf, std::io::Error> {
    tokio::fs::create_dir_all(artifacts_dir).await?;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let artifact_path = artifacts_dir.join(format!("artifact_{timestamp}.zip"));

    let source_path = source_path.to_path_buf();
    let artifact_path_clone = artifact_path.clone();
    tokio::task::spawn_blocking(move || write_zip(&source_path, &artifact_path_clone))
        .await
        .expect("packaging task panicked")?;

    Ok(artifact_path)
}

fn write_zip(source_path: &Path, artifact_path: &Path) -> Result<(), std::io::Error> {
    let file = std::fs::File::create(artifact_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let walker = walkdir::WalkDir::new(source_path).contents_first(true);
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source_path)
            .expect("walked entry is under source_path");
        let name = relative.to_string_lossy().replace('\\', "/");

        zip.start_file(name, options)?;
        let mut f = std::fs::File::open(entry.path())?;
        std::io::copy(&mut f, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}

/// SHA-256 of `path`, streamed in 8 KiB chunks (§4.3 step 4).
pub async fn digest_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_result_helpers_set_expected_status() {
        assert_eq!(BuildResult::cancelled().status, BuildStatus::Cancelled);
        assert_eq!(BuildResult::failed("x").status, BuildStatus::Failed);
    }
}
