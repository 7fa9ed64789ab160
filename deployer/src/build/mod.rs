mod builder;
mod config;
mod error;
mod reaper;

pub use builder::{build, digest_file, BuildResult, BuildStatus};
pub use config::BuildConfig;
pub use error::BuildError;
pub use reaper::{cleanup_artifacts, reap_project_artifacts, CleanupReport};
