use std::path::Path;

use dockhand_common::Credentials;
use serde::Serialize;
use tokio::process::Command;

use super::auth::GitEnv;
use super::error::GitError;

/// Result of a successful `fetch` (§4.2 contract).
#[derive(Debug, Clone, Serialize)]
pub struct GitInfo {
    pub commit_hash: String,
    pub commit_message: String,
    pub author: String,
    pub branch: String,
}

/// Runs `git` with the given args against `url`'s credentials, SSL
/// verification disabled globally for this subsystem (§4.2 — internal
/// self-signed CAs), in `cwd` if given.
async fn run_git(
    url: &str,
    credentials: &Credentials,
    cwd: Option<&Path>,
    args: &[&str],
) -> Result<std::process::Output, GitError> {
    let git_env = GitEnv::prepare(url, credentials)?;

    let mut command = Command::new("git");
    command.arg("-c").arg("http.sslVerify=false");
    if let Some(dir) = cwd {
        command.arg("-C").arg(dir);
    }
    command.args(args).kill_on_drop(true);
    for (key, value) in &git_env.env {
        command.env(key, value);
    }

    command
        .output()
        .await
        .map_err(|e| GitError::Unknown(format!("failed to spawn git: {e}")))
}

/// Clones `url` into `work_dir`, checks out `branch`, and returns the
/// resulting head commit's metadata (§4.2 contract).
///
/// Follows the checkout sequence literally: fetch origin, verify
/// `origin/<branch>` exists in the local refs set, create or reuse a local
/// tracking branch, then pull.
pub async fn fetch(
    url: &str,
    branch: &str,
    credentials: &Credentials,
    work_dir: &Path,
) -> Result<GitInfo, GitError> {
    let clone_output = run_git(
        url,
        credentials,
        None,
        &[
            "clone",
            "-c",
            "core.hooksPath=/dev/null",
            "--no-single-branch",
            "--",
            url,
            work_dir
                .to_str()
                .ok_or_else(|| GitError::Unknown("non-utf8 work dir".to_string()))?,
        ],
    )
    .await?;
    if !clone_output.status.success() {
        let stderr = String::from_utf8_lossy(&clone_output.stderr);
        return Err(GitError::classify(url, &stderr));
    }

    let fetch_output = run_git(url, credentials, Some(work_dir), &["fetch", "origin"]).await?;
    if !fetch_output.status.success() {
        let stderr = String::from_utf8_lossy(&fetch_output.stderr);
        return Err(GitError::classify(url, &stderr));
    }

    let remote_ref = format!("refs/remotes/origin/{branch}");
    let verify_output = run_git(
        url,
        credentials,
        Some(work_dir),
        &["show-ref", "--verify", "--quiet", &remote_ref],
    )
    .await?;
    if !verify_output.status.success() {
        let available = list_branches(url, credentials).await.unwrap_or_default();
        return Err(GitError::BranchNotFound {
            branch: format!("{branch} (available: {})", available.join(", ")),
        });
    }

    let checkout_output = run_git(
        url,
        credentials,
        Some(work_dir),
        &["checkout", "-B", branch, &format!("origin/{branch}")],
    )
    .await?;
    if !checkout_output.status.success() {
        let stderr = String::from_utf8_lossy(&checkout_output.stderr);
        return Err(GitError::classify(url, &stderr));
    }

    let pull_output = run_git(
        url,
        credentials,
        Some(work_dir),
        &["pull", "origin", branch],
    )
    .await?;
    if !pull_output.status.success() {
        let stderr = String::from_utf8_lossy(&pull_output.stderr);
        return Err(GitError::classify(url, &stderr));
    }

    read_head_info(work_dir, branch).await
}

/// Lists remote branch names without cloning, tolerating shallow/bare
/// listing (§4.2 contract). Sorted, deduplicated, HEAD excluded.
pub async fn list_branches(url: &str, credentials: &Credentials) -> Result<Vec<String>, GitError> {
    let output = run_git(url, credentials, None, &["ls-remote", "--heads", "--", url]).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::classify(url, &stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut branches: Vec<String> = stdout
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .filter_map(|ref_name| ref_name.strip_prefix("refs/heads/"))
        .filter(|name| *name != "HEAD")
        .map(str::to_string)
        .collect();
    branches.sort();
    branches.dedup();
    Ok(branches)
}

async fn read_head_info(repo_dir: &Path, branch: &str) -> Result<GitInfo, GitError> {
    let format = "%H%n%an%n%s";
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .arg("log")
        .arg("-1")
        .arg(format!("--pretty=format:{format}"))
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| GitError::Unknown(format!("failed to spawn git log: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::Unknown(stderr.trim().to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.splitn(3, '\n');
    let commit_hash = lines
        .next()
        .ok_or_else(|| GitError::Unknown("empty git log output".to_string()))?
        .to_string();
    let author = lines.next().unwrap_or_default().to_string();
    let commit_message = lines.next().unwrap_or_default().to_string();

    Ok(GitInfo {
        commit_hash,
        commit_message,
        author,
        branch: branch.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #[test]
    fn branch_lines_parse_from_ls_remote_heads_format_excluding_head() {
        let stdout = "abc123\trefs/heads/main\ndef456\trefs/heads/feature/x\nabc123\trefs/heads/HEAD\n";
        let mut branches: Vec<String> = stdout
            .lines()
            .filter_map(|line| line.split('\t').nth(1))
            .filter_map(|r| r.strip_prefix("refs/heads/"))
            .filter(|name| *name != "HEAD")
            .map(str::to_string)
            .collect();
        branches.sort();
        branches.dedup();
        assert_eq!(branches, vec!["feature/x", "main"]);
    }
}
