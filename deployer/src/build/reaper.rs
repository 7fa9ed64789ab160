use std::path::{Path, PathBuf};

/// Deletes every artifact in `existing` other than `keep` (§4.9 per-project
/// reap). Errors are logged and otherwise ignored — a failed deletion must
/// never fail the build that just succeeded.
pub async fn reap_project_artifacts(existing: &[PathBuf], keep: &Path) {
    for artifact in existing {
        if artifact == keep {
            continue;
        }
        if let Err(err) = tokio::fs::remove_file(artifact).await {
            tracing::warn!(path = %artifact.display(), error = %err, "failed to reap stale artifact");
        }
    }
}

/// A file the cleanup sweep considered, for reporting to the caller.
#[derive(Debug, Clone)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub bytes_freed: u64,
}

/// Process-wide housekeeping sweep, independent of any single build: once
/// the total size of `artifacts_dir` exceeds `max_size_mb`, deletes the
/// oldest files (by modified time) until it no longer does (§4.9).
pub async fn cleanup_artifacts(
    artifacts_dir: &Path,
    max_size_mb: u64,
) -> Result<CleanupReport, std::io::Error> {
    let max_bytes = max_size_mb.saturating_mul(1024 * 1024);

    let mut entries = Vec::new();
    let mut total: u64 = 0;
    let mut read_dir = tokio::fs::read_dir(artifacts_dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        total += metadata.len();
        let modified = metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        entries.push((entry.path(), metadata.len(), modified));
    }

    entries.sort_by_key(|(_, _, modified)| *modified);

    let mut removed = Vec::new();
    let mut bytes_freed = 0u64;
    for (path, len, _) in entries {
        if total <= max_bytes {
            break;
        }
        if let Err(err) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove artifact during size sweep");
            continue;
        }
        total = total.saturating_sub(len);
        bytes_freed += len;
        removed.push(path);
    }

    Ok(CleanupReport {
        removed,
        bytes_freed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn write_file(path: &Path, bytes: usize) {
        tokio::fs::write(path, vec![0u8; bytes]).await.unwrap();
    }

    #[tokio::test]
    async fn reap_keeps_only_the_named_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("artifact_2.zip");
        let drop_me = dir.path().join("artifact_1.zip");
        write_file(&keep, 10).await;
        write_file(&drop_me, 10).await;

        reap_project_artifacts(&[keep.clone(), drop_me.clone()], &keep).await;

        assert!(keep.exists());
        assert!(!drop_me.exists());
    }

    #[tokio::test]
    async fn cleanup_removes_oldest_first_until_under_budget() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("artifact_old.zip");
        write_file(&old, 1024 * 1024).await;
        sleep(Duration::from_millis(10)).await;
        let new = dir.path().join("artifact_new.zip");
        write_file(&new, 1024 * 1024).await;

        let report = cleanup_artifacts(dir.path(), 1).await.unwrap();

        assert_eq!(report.removed, vec![old.clone()]);
        assert!(!old.exists());
        assert!(new.exists());
    }

    #[tokio::test]
    async fn cleanup_is_a_noop_under_budget() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("artifact_a.zip"), 10).await;

        let report = cleanup_artifacts(dir.path(), 1).await.unwrap();
        assert!(report.removed.is_empty());
    }
}
