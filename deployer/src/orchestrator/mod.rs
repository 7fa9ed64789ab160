mod cancel;
mod fanout;
mod reconcile;
mod rollback;
mod service;
mod types;

pub use fanout::{FailurePolicy, FanoutError};
pub use reconcile::reconcile_on_startup;
pub use rollback::{rollback, RollbackError};
pub use service::DeploymentService;
pub use types::{ProjectConfig, ServerTarget};
