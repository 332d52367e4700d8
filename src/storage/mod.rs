pub mod local;
pub mod queue;
pub mod remote;

pub use local::LocalTaskStore;
pub use queue::{OfflineQueue, QueueEntry, QueuedOperation};
pub use remote::RemoteTaskStore;

use crate::core::error::HybridResult;
use crate::core::task::{Subtask, SubtaskPatch, Task, TaskPatch, TaskStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Filter applied to `getTasks`: status equality, id membership, and a
/// case-insensitive substring search over title/description.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub ids: Option<std::collections::HashSet<i64>>,
    pub search: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&task.id) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let haystack = format!("{} {}", task.title, task.description).to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// What callers provide to create a new task; `id` and sync-tracking fields
/// are assigned by the adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub details: String,
    pub test_strategy: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<crate::core::task::Priority>,
    pub dependencies: std::collections::HashSet<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSubtask {
    pub title: String,
    pub description: String,
    pub details: String,
    pub test_strategy: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<crate::core::task::Priority>,
}

/// Events emitted by a storage adapter, per the external-interfaces section.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    TaskCreated(Task),
    TaskUpdated(Task),
    TaskDeleted(i64),
    SubtaskCreated(Subtask),
    SubtaskUpdated(Subtask),
    SubtaskDeleted { parent_id: i64, sub_id: i64 },
    TasksSaved(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

/// Consumed by the façade and the sync engine. Both the local and remote
/// adapters implement this trait; the engine is agnostic to which is which.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn initialize(&self) -> HybridResult<()>;

    async fn get_tasks(&self, filter: Option<TaskFilter>) -> HybridResult<Vec<Task>>;
    async fn get_task(&self, id: i64) -> HybridResult<Option<Task>>;

    async fn create_task(&self, data: NewTask) -> HybridResult<Task>;
    async fn update_task(&self, id: i64, patch: TaskPatch) -> HybridResult<Task>;
    async fn delete_task(&self, id: i64) -> HybridResult<bool>;

    async fn get_subtasks(&self, parent_id: i64) -> HybridResult<Vec<Subtask>>;
    async fn create_subtask(&self, parent_id: i64, data: NewSubtask) -> HybridResult<Subtask>;
    async fn update_subtask(&self, parent_id: i64, sub_id: i64, patch: SubtaskPatch) -> HybridResult<Subtask>;
    async fn delete_subtask(&self, parent_id: i64, sub_id: i64) -> HybridResult<bool>;

    /// Batch replace. Optional — the remote adapter rejects it as unsupported.
    async fn save_tasks(&self, tasks: Vec<Task>) -> HybridResult<()>;

    async fn validate(&self) -> HybridResult<bool>;
    fn get_provider_info(&self) -> ProviderInfo;

    fn subscribe(&self, listener: Box<dyn Fn(AdapterEvent) + Send + Sync>);
}
