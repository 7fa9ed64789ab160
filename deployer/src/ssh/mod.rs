mod error;
mod session;

pub use error::SshError;
pub use session::{SshSession, TransferStats};
