use std::collections::HashSet;

use dockhand_common::DeploymentId;
use tokio::sync::Mutex;

/// Bounded admission control over concurrently running deployments (§4.6).
///
/// A plain semaphore would bound the *count* but not let a caller ask "is
/// this deployment already running" atomically with the reservation, so
/// this tracks the actual set of admitted ids instead.
pub struct ConcurrencyGate {
    max_concurrent: usize,
    running: Mutex<HashSet<DeploymentId>>,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("deployment {0} is already running")]
    AlreadyRunning(DeploymentId),
    #[error("no slots available: {running}/{max} deployments in flight")]
    NoSlotsAvailable { running: usize, max: usize },
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Reserves a slot for `deployment_id`. Rejects if the deployment is
    /// already admitted, or if every slot is in use.
    pub async fn acquire(&self, deployment_id: DeploymentId) -> Result<(), GateError> {
        let mut running = self.running.lock().await;
        if running.contains(&deployment_id) {
            return Err(GateError::AlreadyRunning(deployment_id));
        }
        if running.len() >= self.max_concurrent {
            return Err(GateError::NoSlotsAvailable {
                running: running.len(),
                max: self.max_concurrent,
            });
        }
        running.insert(deployment_id);
        Ok(())
    }

    /// Releases a deployment's slot. A no-op if it wasn't held — callers may
    /// release defensively on every exit path.
    pub async fn release(&self, deployment_id: DeploymentId) {
        self.running.lock().await.remove(&deployment_id);
    }

    pub async fn running_count(&self) -> usize {
        self.running.lock().await.len()
    }

    pub async fn available_slots(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.running_count().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_rejects_duplicate_deployment() {
        let gate = ConcurrencyGate::new(2);
        gate.acquire(1).await.unwrap();
        assert!(matches!(
            gate.acquire(1).await,
            Err(GateError::AlreadyRunning(1))
        ));
    }

    #[tokio::test]
    async fn acquire_rejects_once_full() {
        let gate = ConcurrencyGate::new(1);
        gate.acquire(1).await.unwrap();
        assert!(matches!(
            gate.acquire(2).await,
            Err(GateError::NoSlotsAvailable { running: 1, max: 1 })
        ));
    }

    #[tokio::test]
    async fn release_frees_a_slot_for_reuse() {
        let gate = ConcurrencyGate::new(1);
        gate.acquire(1).await.unwrap();
        gate.release(1).await;
        assert_eq!(gate.available_slots().await, 1);
        gate.acquire(2).await.unwrap();
    }
}
