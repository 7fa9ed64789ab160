#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("health check is misconfigured: {0}")]
    Configuration(String),
}
