#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build script failed with exit code {0}")]
    ScriptFailed(i32),
    #[error("output directory {0:?} not found after build")]
    OutputMissing(String),
    #[error("build was cancelled")]
    Cancelled,
    #[error("packaging failed: {0}")]
    Packaging(String),
    #[error("build command timed out after {0}s")]
    Timeout(u64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
