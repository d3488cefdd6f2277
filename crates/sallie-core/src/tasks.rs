//! Task queue: priority ordering with FIFO tie-break, active tracking and a bounded
//! record of finished tasks.
//!
//! Queue order is `(priority value, created_at, insertion sequence)`, so equal priorities drain
//! oldest first. Finished tasks (completed or failed) move into a ring of
//! [`COMPLETED_HISTORY_LIMIT`] entries; the oldest is evicted first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Finished tasks retained for inspection.
pub const COMPLETED_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    UserInput,
    BackgroundProcessing,
    SystemMaintenance,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::UserInput => "user_input",
            TaskType::BackgroundProcessing => "background_processing",
            TaskType::SystemMaintenance => "system_maintenance",
        }
    }
}

/// Lower numeric value runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl TaskPriority {
    pub fn value(&self) -> u8 {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::High => 1,
            TaskPriority::Normal => 2,
            TaskPriority::Low => 3,
            TaskPriority::Background => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
            TaskPriority::Background => "background",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque payload supplied by the creator.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
    /// Tasks ever created.
    pub created: u64,
    pub completed: u64,
    pub failed: u64,
    /// Queued plus running.
    pub active: usize,
    pub queued: usize,
}

type QueueKey = (u8, DateTime<Utc>, u64);

#[derive(Default)]
struct TaskQueueState {
    queue: BTreeMap<QueueKey, Uuid>,
    queue_keys: HashMap<Uuid, QueueKey>,
    active: HashMap<Uuid, Task>,
    finished: VecDeque<Task>,
    sequence: u64,
    created: u64,
    completed: u64,
    failed: u64,
}

impl TaskQueueState {
    fn dequeue(&mut self, id: &Uuid) {
        if let Some(key) = self.queue_keys.remove(id) {
            self.queue.remove(&key);
        }
    }

    fn finish(&mut self, id: Uuid, apply: impl FnOnce(&mut Task)) -> bool {
        self.dequeue(&id);
        let Some(mut task) = self.active.remove(&id) else {
            return false;
        };
        task.completed_at = Some(Utc::now());
        apply(&mut task);
        self.finished.push_back(task);
        while self.finished.len() > COMPLETED_HISTORY_LIMIT {
            self.finished.pop_front();
        }
        true
    }
}

/// Thread-safe task queue. All operations take a single short-lived lock.
#[derive(Default)]
pub struct TaskManager {
    inner: Mutex<TaskQueueState>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the maps consistent (every mutation is a
    // single insert/remove), so poisoned state is recovered rather than surfaced.
    fn lock(&self) -> MutexGuard<'_, TaskQueueState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates and enqueues a task. Always succeeds.
    pub fn create_task(
        &self,
        task_type: TaskType,
        priority: TaskPriority,
        data: HashMap<String, serde_json::Value>,
    ) -> Task {
        let task = Task {
            id: Uuid::new_v4(),
            task_type,
            priority,
            created_at: Utc::now(),
            completed_at: None,
            data,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        };

        let mut state = self.lock();
        state.sequence += 1;
        let key = (priority.value(), task.created_at, state.sequence);
        state.queue.insert(key, task.id);
        state.queue_keys.insert(task.id, key);
        state.active.insert(task.id, task.clone());
        state.created += 1;
        debug!(
            target: "sallie::tasks",
            task_id = %task.id,
            task_type = task_type.as_str(),
            priority = priority.as_str(),
            "task created"
        );
        task
    }

    /// Pops the most urgent, oldest queued task and marks it running.
    pub fn get_next_task(&self) -> Option<Task> {
        let mut state = self.lock();
        let (_, id) = state.queue.pop_first()?;
        state.queue_keys.remove(&id);
        let task = state.active.get_mut(&id)?;
        task.status = TaskStatus::Running;
        Some(task.clone())
    }

    /// Removes a specific task from the queue and marks it running.
    /// `None` if the task is not queued (already claimed, finished or unknown).
    pub fn claim_task(&self, id: Uuid) -> Option<Task> {
        let mut state = self.lock();
        let key = state.queue_keys.remove(&id)?;
        state.queue.remove(&key);
        let task = state.active.get_mut(&id)?;
        task.status = TaskStatus::Running;
        Some(task.clone())
    }

    /// Marks a task completed. Unknown ids are ignored; returns whether the task existed.
    pub fn complete_task(&self, id: Uuid, result: serde_json::Value) -> bool {
        let mut state = self.lock();
        let found = state.finish(id, |task| {
            task.status = TaskStatus::Completed;
            task.result = Some(result);
        });
        if found {
            state.completed += 1;
        }
        found
    }

    /// Marks a task failed. Unknown ids are ignored; returns whether the task existed.
    pub fn fail_task(&self, id: Uuid, error: impl Into<String>) -> bool {
        let error = error.into();
        let mut state = self.lock();
        let found = state.finish(id, |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(error);
        });
        if found {
            state.failed += 1;
        }
        found
    }

    pub fn get_task(&self, id: Uuid) -> Option<Task> {
        let state = self.lock();
        state
            .active
            .get(&id)
            .or_else(|| state.finished.iter().rev().find(|t| t.id == id))
            .cloned()
    }

    /// Finished tasks, newest first.
    pub fn recent_tasks(&self) -> Vec<Task> {
        self.lock().finished.iter().rev().cloned().collect()
    }

    pub fn get_task_statistics(&self) -> TaskStatistics {
        let state = self.lock();
        TaskStatistics {
            created: state.created,
            completed: state.completed,
            failed: state.failed,
            active: state.active.len(),
            queued: state.queue.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(manager: &TaskManager, priority: TaskPriority) -> Task {
        manager.create_task(TaskType::UserInput, priority, HashMap::new())
    }

    #[test]
    fn test_drain_order_by_priority() {
        let manager = TaskManager::new();
        create(&manager, TaskPriority::Low);
        create(&manager, TaskPriority::Critical);
        create(&manager, TaskPriority::Normal);

        let order: Vec<TaskPriority> = std::iter::from_fn(|| manager.get_next_task())
            .map(|t| t.priority)
            .collect();
        assert_eq!(
            order,
            vec![TaskPriority::Critical, TaskPriority::Normal, TaskPriority::Low]
        );
        assert!(manager.get_next_task().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let manager = TaskManager::new();
        let ids: Vec<Uuid> = (0..5).map(|_| create(&manager, TaskPriority::High).id).collect();
        let drained: Vec<Uuid> = std::iter::from_fn(|| manager.get_next_task())
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, drained);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let manager = TaskManager::new();
        create(&manager, TaskPriority::Normal);
        let before = manager.get_task_statistics();
        assert!(!manager.complete_task(Uuid::new_v4(), serde_json::json!({})));
        assert!(!manager.fail_task(Uuid::new_v4(), "nope"));
        assert_eq!(manager.get_task_statistics(), before);
    }

    #[test]
    fn test_finished_ring_is_bounded() {
        let manager = TaskManager::new();
        let mut first = None;
        for i in 0..(COMPLETED_HISTORY_LIMIT + 20) {
            let task = create(&manager, TaskPriority::Normal);
            if i == 0 {
                first = Some(task.id);
            }
            manager.complete_task(task.id, serde_json::json!(i));
        }
        let recent = manager.recent_tasks();
        assert_eq!(recent.len(), COMPLETED_HISTORY_LIMIT);
        assert_eq!(recent[0].result, Some(serde_json::json!(COMPLETED_HISTORY_LIMIT + 19)));
        assert!(manager.get_task(first.unwrap()).is_none());
    }

    #[test]
    fn test_claim_and_fail_updates_statistics() {
        let manager = TaskManager::new();
        let a = create(&manager, TaskPriority::Normal);
        let b = create(&manager, TaskPriority::Normal);

        let claimed = manager.claim_task(b.id).unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(manager.claim_task(b.id).is_none());

        // Failing a still-queued task removes it from the queue.
        assert!(manager.fail_task(a.id, "resource constrained"));
        assert!(manager.complete_task(b.id, serde_json::json!("ok")));

        let stats = manager.get_task_statistics();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(manager.get_task(a.id).unwrap().error.as_deref(), Some("resource constrained"));
    }
}
