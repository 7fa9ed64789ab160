use dockhand_common::HealthCheckType;
use serde::Deserialize;

/// A project's health-check block (§3, §4.5).
#[derive(Clone, Debug, Deserialize)]
pub struct HealthCheckConfig {
    pub check_type: HealthCheckType,
    /// `http` only. May contain `localhost`/`127.0.0.1`, rewritten to the
    /// target server's host before the request is made.
    pub url: Option<String>,
    /// `tcp` only.
    pub port: Option<u16>,
    /// `command` only. Run under `cd <upload_path>` on the target server.
    pub command: Option<String>,
    pub timeout_seconds: u64,
    pub retries: u32,
    pub interval_seconds: u64,
}

impl HealthCheckConfig {
    /// Rewrites `localhost`/`127.0.0.1` in the configured URL to
    /// `server_host` (§4.5).
    pub fn resolved_url(&self, server_host: &str) -> Option<String> {
        self.url
            .as_ref()
            .map(|url| url.replace("localhost", server_host).replace("127.0.0.1", server_host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_url_rewrites_localhost() {
        let config = HealthCheckConfig {
            check_type: HealthCheckType::Http,
            url: Some("http://localhost:8080/health".to_string()),
            port: None,
            command: None,
            timeout_seconds: 5,
            retries: 3,
            interval_seconds: 2,
        };
        assert_eq!(
            config.resolved_url("10.0.0.5"),
            Some("http://10.0.0.5:8080/health".to_string())
        );
    }
}
