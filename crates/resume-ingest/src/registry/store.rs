use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::extraction::Strategy;

use super::task::{Stage, TaskEvent, TaskKind, TaskOutcome, TaskSnapshot, TaskStatus};
use super::RegistryError;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Number of tasks per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Thread-safe task map with a broadcast feed of every mutation.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskSnapshot>>,
    events: broadcast::Sender<TaskEvent>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tasks: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TaskSnapshot>> {
        match self.tasks.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Task registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TaskSnapshot>> {
        match self.tasks.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Task registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, task: &TaskSnapshot) {
        // No subscribers is not an error.
        let _ = self.events.send(TaskEvent::from(task));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Inserts a new task. Fails if the id is already taken.
    pub fn create(&self, task: TaskSnapshot) -> Result<(), RegistryError> {
        let mut tasks = self.write();
        if tasks.contains_key(&task.id) {
            return Err(RegistryError::DuplicateKey(task.id));
        }
        log::debug!("Registered task {} ({:?})", task.id, task.kind);
        self.publish(&task);
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Moves a task to `stage` at `progress`.
    ///
    /// Unknown and terminal tasks are left untouched. Progress never moves
    /// backwards and a pending task is promoted to processing.
    pub fn update_progress(&self, id: &str, stage: Stage, progress: u8) {
        let mut tasks = self.write();
        let Some(task) = tasks.get_mut(id) else {
            return;
        };
        if task.is_terminal() {
            return;
        }

        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Processing;
        }
        task.stage = stage;
        task.progress = task.progress.max(progress.min(100));
        task.updated_at = Utc::now();
        self.publish(task);
    }

    /// Records the strategy actually in use after a fallback.
    pub fn set_strategy_used(&self, id: &str, strategy: Strategy) {
        let mut tasks = self.write();
        let Some(task) = tasks.get_mut(id) else {
            return;
        };
        if task.is_terminal() || task.strategy_used == strategy {
            return;
        }
        task.strategy_used = strategy;
        task.updated_at = Utc::now();
        self.publish(task);
    }

    /// Bumps the processed-file count of a batch task.
    pub fn record_file_done(&self, id: &str) {
        let mut tasks = self.write();
        if let Some(task) = tasks.get_mut(id) {
            if let TaskKind::Batch { total, processed } = &mut task.kind {
                *processed = (*processed + 1).min(*total);
                task.updated_at = Utc::now();
                self.publish(task);
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<TaskSnapshot, RegistryError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Performs the single terminal transition of a task.
    pub fn finalize(&self, id: &str, outcome: TaskOutcome) -> Result<(), RegistryError> {
        let mut tasks = self.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        let next = match outcome {
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
        };
        if !task.status.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                id: id.to_string(),
                from: task.status,
                to: next,
            });
        }

        match outcome {
            TaskOutcome::Completed(result) => {
                task.stage = Stage::Completed;
                task.progress = 100;
                task.result = Some(result);
                task.error = None;
            }
            TaskOutcome::Failed(error) => {
                task.stage = Stage::Failed;
                task.result = None;
                task.error = Some(error);
            }
        }
        task.status = next;
        task.updated_at = Utc::now();
        task.finished = Some(Instant::now());

        log::info!("Task {} finished as {}", id, next);
        self.publish(task);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<TaskSnapshot> {
        self.write().remove(id)
    }

    /// Drops terminal tasks that finished at least `retention` ago.
    pub fn reap_finished(&self, retention: Duration) -> usize {
        let mut tasks = self.write();
        let before = tasks.len();
        tasks.retain(|_, task| match task.finished {
            Some(finished) => finished.elapsed() < retention,
            None => true,
        });
        before - tasks.len()
    }

    pub fn counts(&self) -> RegistryCounts {
        self.read()
            .values()
            .fold(RegistryCounts::default(), |mut counts, task| {
                match task.status {
                    TaskStatus::Pending => counts.pending += 1,
                    TaskStatus::Processing => counts.processing += 1,
                    TaskStatus::Completed => counts.completed += 1,
                    TaskStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::task::{BatchItem, TaskResult};
    use std::sync::Arc;

    fn pending(id: &str) -> TaskSnapshot {
        TaskSnapshot::pending(id, TaskKind::Single, Strategy::Vision, None)
    }

    #[test]
    fn test_create_and_get() {
        let registry = TaskRegistry::new();
        registry.create(pending("a")).unwrap();

        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 10);
        assert_eq!(task.stage, Stage::Upload);
    }

    #[test]
    fn test_duplicate_key() {
        let registry = TaskRegistry::new();
        registry.create(pending("a")).unwrap();
        assert_eq!(
            registry.create(pending("a")),
            Err(RegistryError::DuplicateKey("a".to_string()))
        );
    }

    #[test]
    fn test_get_unknown() {
        let registry = TaskRegistry::new();
        assert_eq!(
            registry.get("missing").unwrap_err(),
            RegistryError::NotFound("missing".to_string())
        );
    }

    #[test]
    fn test_update_promotes_and_never_regresses() {
        let registry = TaskRegistry::new();
        registry.create(pending("a")).unwrap();

        registry.update_progress("a", Stage::Rasterizing, 30);
        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.progress, 30);

        registry.update_progress("a", Stage::ExtractingText, 20);
        let task = registry.get("a").unwrap();
        assert_eq!(task.progress, 30);
        assert_eq!(task.stage, Stage::ExtractingText);
    }

    #[test]
    fn test_update_unknown_is_noop() {
        let registry = TaskRegistry::new();
        registry.update_progress("ghost", Stage::Parsing, 50);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finalize_completed() {
        let registry = TaskRegistry::new();
        registry.create(pending("a")).unwrap();
        registry
            .finalize("a", TaskOutcome::Completed(TaskResult::Batch(Vec::new())))
            .unwrap();

        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.result.is_some());
        assert!(task.error.is_none());
    }

    #[test]
    fn test_finalize_failed_keeps_progress() {
        let registry = TaskRegistry::new();
        registry.create(pending("a")).unwrap();
        registry.update_progress("a", Stage::ExtractingText, 55);
        registry
            .finalize("a", TaskOutcome::Failed("boom".to_string()))
            .unwrap();

        let task = registry.get("a").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.progress, 55);
        assert_eq!(task.stage, Stage::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
        assert!(task.result.is_none());
    }

    #[test]
    fn test_second_terminal_transition_rejected() {
        let registry = TaskRegistry::new();
        registry.create(pending("a")).unwrap();
        registry
            .finalize("a", TaskOutcome::Failed("first".to_string()))
            .unwrap();

        let err = registry
            .finalize("a", TaskOutcome::Completed(TaskResult::Batch(Vec::new())))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(registry.get("a").unwrap().error.as_deref(), Some("first"));
    }

    #[test]
    fn test_terminal_ignores_progress_updates() {
        let registry = TaskRegistry::new();
        registry.create(pending("a")).unwrap();
        registry
            .finalize("a", TaskOutcome::Failed("x".to_string()))
            .unwrap();
        registry.update_progress("a", Stage::Parsing, 90);

        let task = registry.get("a").unwrap();
        assert_eq!(task.stage, Stage::Failed);
        assert_eq!(task.progress, 10);
    }

    #[test]
    fn test_batch_file_counter() {
        let registry = TaskRegistry::new();
        registry
            .create(TaskSnapshot::pending(
                "b",
                TaskKind::Batch {
                    total: 2,
                    processed: 0,
                },
                Strategy::Text,
                None,
            ))
            .unwrap();
        for _ in 0..3 {
            registry.record_file_done("b");
        }
        assert_eq!(
            registry.get("b").unwrap().kind,
            TaskKind::Batch {
                total: 2,
                processed: 2
            }
        );
    }

    #[test]
    fn test_reap_only_old_terminal_tasks() {
        let registry = TaskRegistry::new();
        registry.create(pending("running")).unwrap();
        registry.create(pending("done")).unwrap();
        registry
            .finalize(
                "done",
                TaskOutcome::Completed(TaskResult::Batch(vec![BatchItem::failed("x", "y")])),
            )
            .unwrap();

        assert_eq!(registry.reap_finished(Duration::from_secs(3600)), 0);
        assert_eq!(registry.reap_finished(Duration::ZERO), 1);
        assert!(registry.get("done").is_err());
        assert!(registry.get("running").is_ok());
    }

    #[test]
    fn test_events_are_published() {
        let registry = TaskRegistry::new();
        let mut rx = registry.subscribe();
        registry.create(pending("a")).unwrap();
        registry.update_progress("a", Stage::Parsing, 70);

        let created = rx.try_recv().unwrap();
        assert_eq!(created.status, TaskStatus::Pending);
        let updated = rx.try_recv().unwrap();
        assert_eq!(updated.progress, 70);
        assert_eq!(updated.stage, Stage::Parsing);
    }

    #[test]
    fn test_strategy_and_file_counter_are_published() {
        let registry = TaskRegistry::new();
        registry
            .create(TaskSnapshot::pending(
                "b",
                TaskKind::Batch {
                    total: 2,
                    processed: 0,
                },
                Strategy::Vision,
                None,
            ))
            .unwrap();
        let mut rx = registry.subscribe();

        registry.set_strategy_used("b", Strategy::Text);
        registry.set_strategy_used("b", Strategy::Text);
        registry.record_file_done("b");

        let fallback = rx.try_recv().unwrap();
        assert_eq!(fallback.processing_method, Strategy::Text);
        assert_eq!(fallback.processed_files, Some(0));
        let counted = rx.try_recv().unwrap();
        assert_eq!(counted.processed_files, Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_counts() {
        let registry = TaskRegistry::new();
        registry.create(pending("a")).unwrap();
        registry.create(pending("b")).unwrap();
        registry.update_progress("b", Stage::Processing, 15);
        let counts = registry.counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
    }

    #[test]
    fn test_concurrent_reader_sees_monotonic_progress() {
        let registry = Arc::new(TaskRegistry::new());
        registry.create(pending("a")).unwrap();

        let reader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..1000 {
                    let progress = registry.get("a").unwrap().progress;
                    assert!(progress >= last);
                    last = progress;
                }
            })
        };

        for p in 10..=95u8 {
            registry.update_progress("a", Stage::Processing, p);
        }
        reader.join().unwrap();
    }
}
