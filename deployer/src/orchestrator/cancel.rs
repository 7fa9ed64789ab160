use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dockhand_common::DeploymentId;
use tokio::sync::Mutex;

/// Cooperative cancellation flags, one per in-flight deployment, checked
/// between stages (§4.7, §5 "Cancellation & timeouts").
#[derive(Default)]
pub struct CancellationRegistry {
    flags: Mutex<HashMap<DeploymentId, Arc<AtomicBool>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, deployment_id: DeploymentId) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.flags.lock().await.insert(deployment_id, flag.clone());
        flag
    }

    pub async fn cancel(&self, deployment_id: DeploymentId) -> bool {
        match self.flags.lock().await.get(&deployment_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub async fn unregister(&self, deployment_id: DeploymentId) {
        self.flags.lock().await.remove(&deployment_id);
    }
}
