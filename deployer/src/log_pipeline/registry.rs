use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dockhand_common::DeploymentId;

use super::{LogPipeline, LogSink};

/// Process-wide registry of log pipelines, keyed by deployment id (§3
/// "Ownership", §9 "Global mutable state").
///
/// A pipeline is created lazily on first use and must be removed
/// explicitly once its deployment reaches a terminal state — the registry
/// does not do this on its own, since the pipeline may still be in the
/// middle of its final flush.
pub struct LogPipelineRegistry {
    sink: Arc<dyn LogSink>,
    pipelines: Mutex<HashMap<DeploymentId, Arc<LogPipeline>>>,
}

impl LogPipelineRegistry {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, deployment_id: DeploymentId) -> Arc<LogPipeline> {
        let mut pipelines = self.pipelines.lock().unwrap();
        pipelines
            .entry(deployment_id)
            .or_insert_with(|| LogPipeline::new(deployment_id, self.sink.clone()))
            .clone()
    }

    pub fn get(&self, deployment_id: DeploymentId) -> Option<Arc<LogPipeline>> {
        self.pipelines.lock().unwrap().get(&deployment_id).cloned()
    }

    /// Removes the pipeline for a deployment. Callers should flush it first
    /// (`LogPipeline::flush`) — removal here only drops the registry's own
    /// reference.
    pub fn remove(&self, deployment_id: DeploymentId) {
        self.pipelines.lock().unwrap().remove(&deployment_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dockhand_common::LogEntry;

    struct NullSink;

    #[async_trait]
    impl LogSink for NullSink {
        async fn insert_logs(
            &self,
            _deployment_id: DeploymentId,
            _entries: &[LogEntry],
        ) -> Result<(), sqlx::Error> {
            Ok(())
        }
    }

    #[test]
    fn get_or_create_returns_the_same_pipeline_for_a_deployment() {
        let registry = LogPipelineRegistry::new(Arc::new(NullSink));
        let a = registry.get_or_create(1);
        let b = registry.get_or_create(1);
        assert!(Arc::ptr_eq(&a, &b));

        let c = registry.get_or_create(2);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn remove_drops_the_registry_reference() {
        let registry = LogPipelineRegistry::new(Arc::new(NullSink));
        registry.get_or_create(1);
        assert!(registry.get(1).is_some());
        registry.remove(1);
        assert!(registry.get(1).is_none());
    }
}
