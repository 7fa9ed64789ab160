#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error("authentication failed for {user}@{host}")]
    Auth { host: String, user: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("network error connecting to {host}:{port}: {message}")]
    Network {
        host: String,
        port: u16,
        message: String,
    },
}

impl SshError {
    /// Classifies an upstream `ssh2`/io error by message, the same
    /// conservative substring-probe approach used for Git (§4.4, §7) —
    /// libssh2's own error codes don't cleanly separate "bad network" from
    /// "bad credentials" for every failure mode.
    pub fn classify(host: &str, port: u16, user: &str, message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("authentication")
            || lower.contains("auth fail")
            || lower.contains("permission denied")
        {
            SshError::Auth {
                host: host.to_string(),
                user: user.to_string(),
            }
        } else if lower.contains("timed out")
            || lower.contains("connection refused")
            || lower.contains("unreachable")
            || lower.contains("resolve")
        {
            SshError::Network {
                host: host.to_string(),
                port,
                message: message.to_string(),
            }
        } else {
            SshError::Protocol(message.to_string())
        }
    }
}

impl From<std::io::Error> for SshError {
    fn from(err: std::io::Error) -> Self {
        SshError::Protocol(err.to_string())
    }
}
