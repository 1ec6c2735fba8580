use std::sync::Arc;

use crate::extraction::Strategy;
use crate::registry::{Stage, TaskRegistry};

pub trait ProgressReporter: Send + Sync {
    fn report(&self, stage: Stage, progress: u8);

    fn strategy_changed(&self, _strategy: Strategy) {}
}

/// Reporter for runs whose progress is tracked elsewhere (batch files).
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _stage: Stage, _progress: u8) {}
}

/// Publishes checkpoints straight into the task registry.
pub struct RegistryProgress {
    registry: Arc<TaskRegistry>,
    task_id: String,
}

impl RegistryProgress {
    pub fn new(registry: Arc<TaskRegistry>, task_id: impl Into<String>) -> Self {
        Self {
            registry,
            task_id: task_id.into(),
        }
    }
}

impl ProgressReporter for RegistryProgress {
    fn report(&self, stage: Stage, progress: u8) {
        self.registry.update_progress(&self.task_id, stage, progress);
    }

    fn strategy_changed(&self, strategy: Strategy) {
        self.registry.set_strategy_used(&self.task_id, strategy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{TaskKind, TaskSnapshot};

    #[test]
    fn test_registry_progress_updates_task() {
        let registry = Arc::new(TaskRegistry::new());
        registry
            .create(TaskSnapshot::pending("t", TaskKind::Single, Strategy::Vision, None))
            .unwrap();

        let progress = RegistryProgress::new(Arc::clone(&registry), "t");
        progress.report(Stage::Rasterizing, 35);
        progress.strategy_changed(Strategy::Text);

        let task = registry.get("t").unwrap();
        assert_eq!(task.progress, 35);
        assert_eq!(task.stage, Stage::Rasterizing);
        assert_eq!(task.strategy_used, Strategy::Text);
    }
}
