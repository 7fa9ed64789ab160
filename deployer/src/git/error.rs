#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("authentication failed for {url}")]
    Authentication { url: String },
    #[error("branch {branch:?} not found")]
    BranchNotFound { branch: String },
    #[error("host key verification failed for {url}")]
    HostKey { url: String },
    #[error("network error while reaching {url}: {message}")]
    Network { url: String, message: String },
    #[error("git command failed: {0}")]
    Unknown(String),
}

impl GitError {
    /// Classifies raw `git` stderr into a taxonomy variant (§4.2, §7).
    /// git's own messages are the only signal available here — there is no
    /// structured exit-reason from the CLI.
    pub fn classify(url: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if lower.contains("authentication failed")
            || lower.contains("permission denied")
            || lower.contains("could not read username")
        {
            GitError::Authentication {
                url: url.to_string(),
            }
        } else if lower.contains("host key verification failed") {
            GitError::HostKey {
                url: url.to_string(),
            }
        } else if lower.contains("remote branch") && lower.contains("not found") {
            GitError::BranchNotFound {
                branch: stderr.trim().to_string(),
            }
        } else if lower.contains("could not resolve host")
            || lower.contains("connection timed out")
            || lower.contains("unable to access")
        {
            GitError::Network {
                url: url.to_string(),
                message: stderr.trim().to_string(),
            }
        } else {
            GitError::Unknown(stderr.trim().to_string())
        }
    }
}
