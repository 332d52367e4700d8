use crate::core::error::{HybridResult, StorageError, TaskError};
use crate::core::task::{Subtask, SubtaskPatch, Task, TaskPatch};
use crate::events::EventBus;
use crate::storage::{AdapterEvent, NewSubtask, NewTask, ProviderInfo, StorageAdapter, TaskFilter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::RwLock;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalDocument {
    #[serde(default)]
    tasks: Vec<Task>,
}

struct LocalState {
    tasks: Vec<Task>,
    loaded_mtime: Option<SystemTime>,
}

/// File-backed CRUD store keyed by a path supplied at construction. Mirrors
/// the on-disk document only when its modification time has advanced since
/// the last load, and writes atomically (temp file + rename) so concurrent
/// readers always observe a fully-written document.
pub struct LocalTaskStore {
    path: PathBuf,
    state: RwLock<LocalState>,
    events: EventBus<AdapterEvent>,
}

impl LocalTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(LocalState {
                tasks: Vec::new(),
                loaded_mtime: None,
            }),
            events: EventBus::new(),
        }
    }

    fn current_mtime(&self) -> HybridResult<Option<SystemTime>> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_materialized(&self) -> HybridResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Initialization {
                message: format!("Failed to create local store directory: {e}"),
            })?;
        }
        if !self.path.exists() {
            self.write_document(&LocalDocument::default())?;
        }
        Ok(())
    }

    async fn reload_if_stale(&self) -> HybridResult<()> {
        let on_disk_mtime = self.current_mtime()?;
        let needs_reload = {
            let state = self.state.read().await;
            state.loaded_mtime != on_disk_mtime
        };
        if !needs_reload {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let document: LocalDocument = serde_json::from_str(&content).map_err(|e| StorageError::Corruption {
            message: format!("Local task document is corrupt: {e}"),
        })?;

        let mut state = self.state.write().await;
        state.tasks = document.tasks;
        state.loaded_mtime = on_disk_mtime;
        Ok(())
    }

    fn write_document(&self, document: &LocalDocument) -> HybridResult<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("tasks")
        ));
        let content = serde_json::to_string_pretty(document)?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    async fn flush(&self, state: &LocalState) -> HybridResult<()> {
        let document = LocalDocument {
            tasks: state.tasks.clone(),
        };
        self.write_document(&document)?;
        Ok(())
    }

    fn validate_dependencies(existing: &[Task], self_id: i64, dependencies: &std::collections::HashSet<i64>) -> HybridResult<()> {
        if dependencies.contains(&self_id) {
            return Err(TaskError::InvalidDependencies {
                message: format!("Task {self_id} cannot depend on itself"),
            }
            .into());
        }
        for dep in dependencies {
            if !existing.iter().any(|t| t.id == *dep) {
                return Err(TaskError::InvalidDependencies {
                    message: format!("Dependency {dep} does not refer to an existing task"),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Delete a task, optionally skipping the dependency-cleanup sweep over
    /// sibling tasks (boundary behavior named in the specification).
    pub async fn delete_task_ext(&self, id: i64, skip_dependency_cleanup: bool) -> HybridResult<bool> {
        self.reload_if_stale().await?;
        let mut state = self.state.write().await;

        let existed = state.tasks.iter().any(|t| t.id == id);
        if !existed {
            return Ok(false);
        }
        state.tasks.retain(|t| t.id != id);

        if !skip_dependency_cleanup {
            for task in state.tasks.iter_mut() {
                task.dependencies.remove(&id);
            }
        }

        self.flush(&state).await?;
        drop(state);
        self.events.emit(AdapterEvent::TaskDeleted(id));
        Ok(true)
    }

    /// Insert a task at a caller-chosen id rather than auto-assigning one —
    /// used by the sync engine when ingesting a remote-only task, so the
    /// local record shares the id the remote adapter already resolved.
    pub async fn insert_task_with_id(&self, task: Task) -> HybridResult<Task> {
        task.validate()?;
        self.reload_if_stale().await?;
        let mut state = self.state.write().await;

        if state.tasks.iter().any(|t| t.id == task.id) {
            return Err(TaskError::AlreadyExists { id: task.id.to_string() }.into());
        }
        state.tasks.push(task.clone());
        self.flush(&state).await?;
        drop(state);

        self.events.emit(AdapterEvent::TaskCreated(task.clone()));
        Ok(task)
    }

    /// Stamp sync-tracking fields after a successful mirror in either
    /// direction. `remote_item_id` is only ever set, never overwritten, per
    /// the invariant that it's immutable once assigned.
    pub async fn mark_synced(&self, id: i64, remote_item_id: Option<String>) -> HybridResult<()> {
        self.reload_if_stale().await?;
        let mut state = self.state.write().await;
        let task = state.tasks.iter_mut().find(|t| t.id == id).ok_or_else(|| TaskError::NotFound { id: id.to_string() })?;

        let now = chrono::Utc::now();
        if task.remote_item_id.is_none() {
            task.remote_item_id = remote_item_id;
        }
        task.last_synced_at = Some(now);
        task.sync_status = crate::core::task::TaskSyncStatus::Synced;
        task.last_sync_error = None;

        self.flush(&state).await
    }

    /// Record a failed mirror attempt against the local record without
    /// touching its content fields.
    pub async fn mark_sync_error(&self, id: i64, message: impl Into<String>) -> HybridResult<()> {
        self.reload_if_stale().await?;
        let mut state = self.state.write().await;
        let task = state.tasks.iter_mut().find(|t| t.id == id).ok_or_else(|| TaskError::NotFound { id: id.to_string() })?;

        task.sync_status = crate::core::task::TaskSyncStatus::Error;
        task.last_sync_error = Some(message.into());

        self.flush(&state).await
    }

    /// Accepts either a bare task id or a dotted `parentId.subId` subtask
    /// id, per the addressing rules in the data model.
    pub async fn get_by_task_id(&self, id: crate::core::task::TaskId) -> HybridResult<Option<Task>> {
        use crate::core::task::TaskId;
        match id {
            TaskId::Task(id) => self.get_task(id).await,
            TaskId::Subtask(parent_id, sub_id) => {
                let parent = self.get_task(parent_id).await?;
                Ok(parent.filter(|p| p.get_subtask(sub_id).is_some()))
            }
        }
    }
}

#[async_trait]
impl StorageAdapter for LocalTaskStore {
    async fn initialize(&self) -> HybridResult<()> {
        self.ensure_materialized().await?;
        self.reload_if_stale().await
    }

    async fn get_tasks(&self, filter: Option<TaskFilter>) -> HybridResult<Vec<Task>> {
        self.reload_if_stale().await?;
        let state = self.state.read().await;
        let filter = filter.unwrap_or_default();
        Ok(state.tasks.iter().filter(|t| filter.matches(t)).cloned().collect())
    }

    async fn get_task(&self, id: i64) -> HybridResult<Option<Task>> {
        self.reload_if_stale().await?;
        let state = self.state.read().await;
        Ok(state.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn create_task(&self, data: NewTask) -> HybridResult<Task> {
        if data.title.trim().is_empty() {
            return Err(TaskError::Validation {
                message: "Task title cannot be empty".to_string(),
            }
            .into());
        }

        self.reload_if_stale().await?;
        let mut state = self.state.write().await;

        let new_id = state.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        Self::validate_dependencies(&state.tasks, new_id, &data.dependencies)?;

        let mut task = Task::new(new_id, data.title);
        task.description = data.description;
        task.details = data.details;
        task.test_strategy = data.test_strategy;
        task.status = data.status.unwrap_or_default();
        task.priority = data.priority.unwrap_or_default();
        task.dependencies = data.dependencies;

        state.tasks.push(task.clone());
        self.flush(&state).await?;
        drop(state);

        self.events.emit(AdapterEvent::TaskCreated(task.clone()));
        Ok(task)
    }

    async fn update_task(&self, id: i64, patch: TaskPatch) -> HybridResult<Task> {
        self.reload_if_stale().await?;
        let mut state = self.state.write().await;

        if let Some(dependencies) = &patch.dependencies {
            Self::validate_dependencies(&state.tasks, id, dependencies)?;
        }

        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskError::NotFound { id: id.to_string() })?;

        patch.apply_to(task);
        task.stamp_modified_local();
        let updated = task.clone();

        self.flush(&state).await?;
        drop(state);

        self.events.emit(AdapterEvent::TaskUpdated(updated.clone()));
        Ok(updated)
    }

    async fn delete_task(&self, id: i64) -> HybridResult<bool> {
        self.delete_task_ext(id, false).await
    }

    async fn get_subtasks(&self, parent_id: i64) -> HybridResult<Vec<Subtask>> {
        self.reload_if_stale().await?;
        let state = self.state.read().await;
        let parent = state
            .tasks
            .iter()
            .find(|t| t.id == parent_id)
            .ok_or_else(|| TaskError::NotFound { id: parent_id.to_string() })?;
        Ok(parent.subtasks.clone())
    }

    async fn create_subtask(&self, parent_id: i64, data: NewSubtask) -> HybridResult<Subtask> {
        if data.title.trim().is_empty() {
            return Err(TaskError::Validation {
                message: "Subtask title cannot be empty".to_string(),
            }
            .into());
        }

        self.reload_if_stale().await?;
        let mut state = self.state.write().await;
        let parent = state
            .tasks
            .iter_mut()
            .find(|t| t.id == parent_id)
            .ok_or_else(|| TaskError::NotFound { id: parent_id.to_string() })?;

        let sub_id = parent.subtasks.iter().map(|s| s.sub_id).max().unwrap_or(0) + 1;
        let subtask = Subtask {
            parent_id,
            sub_id,
            remote_item_id: None,
            title: data.title,
            description: data.description,
            details: data.details,
            test_strategy: data.test_strategy,
            status: data.status.unwrap_or_default(),
            priority: data.priority.unwrap_or_default(),
            dependencies: Default::default(),
        };
        parent.subtasks.push(subtask.clone());
        parent.stamp_modified_local();

        self.flush(&state).await?;
        drop(state);

        self.events.emit(AdapterEvent::SubtaskCreated(subtask.clone()));
        Ok(subtask)
    }

    async fn update_subtask(&self, parent_id: i64, sub_id: i64, patch: SubtaskPatch) -> HybridResult<Subtask> {
        self.reload_if_stale().await?;
        let mut state = self.state.write().await;
        let parent = state
            .tasks
            .iter_mut()
            .find(|t| t.id == parent_id)
            .ok_or_else(|| TaskError::NotFound { id: parent_id.to_string() })?;

        let subtask = parent
            .subtasks
            .iter_mut()
            .find(|s| s.sub_id == sub_id)
            .ok_or_else(|| TaskError::NotFound {
                id: format!("{parent_id}.{sub_id}"),
            })?;
        patch.apply_to(subtask);
        let updated = subtask.clone();
        parent.stamp_modified_local();

        self.flush(&state).await?;
        drop(state);

        self.events.emit(AdapterEvent::SubtaskUpdated(updated.clone()));
        Ok(updated)
    }

    async fn delete_subtask(&self, parent_id: i64, sub_id: i64) -> HybridResult<bool> {
        self.reload_if_stale().await?;
        let mut state = self.state.write().await;
        let parent = state
            .tasks
            .iter_mut()
            .find(|t| t.id == parent_id)
            .ok_or_else(|| TaskError::NotFound { id: parent_id.to_string() })?;

        let existed = parent.subtasks.iter().any(|s| s.sub_id == sub_id);
        parent.subtasks.retain(|s| s.sub_id != sub_id);
        if existed {
            parent.stamp_modified_local();
        }

        self.flush(&state).await?;
        drop(state);

        if existed {
            self.events.emit(AdapterEvent::SubtaskDeleted { parent_id, sub_id });
        }
        Ok(existed)
    }

    async fn save_tasks(&self, tasks: Vec<Task>) -> HybridResult<()> {
        for task in &tasks {
            if task.id <= 0 || task.title.trim().is_empty() {
                return Err(TaskError::Validation {
                    message: "Every task must have a positive id and a non-empty title".to_string(),
                }
                .into());
            }
        }

        let mut state = self.state.write().await;
        let count = tasks.len();
        state.tasks = tasks;
        self.flush(&state).await?;
        drop(state);

        self.events.emit(AdapterEvent::TasksSaved(count));
        Ok(())
    }

    async fn validate(&self) -> HybridResult<bool> {
        self.reload_if_stale().await?;
        let state = self.state.read().await;

        let mut seen_ids = std::collections::HashSet::new();
        for task in &state.tasks {
            if !seen_ids.insert(task.id) {
                return Ok(false);
            }
            for dep in &task.dependencies {
                if *dep == task.id || !state.tasks.iter().any(|t| t.id == *dep) {
                    return Ok(false);
                }
            }
            let mut sub_ids = std::collections::HashSet::new();
            for sub in &task.subtasks {
                if !sub_ids.insert(sub.sub_id) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn get_provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "local-file".to_string(),
            version: "1".to_string(),
            capabilities: vec![
                "read".to_string(),
                "write".to_string(),
                "subtasks".to_string(),
                "save_tasks".to_string(),
            ],
        }
    }

    fn subscribe(&self, listener: Box<dyn Fn(AdapterEvent) + Send + Sync>) {
        self.events.subscribe(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewTask;

    fn new_store() -> (tempfile::TempDir, LocalTaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalTaskStore::new(dir.path().join("tasks.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_initialize_materializes_empty_document() {
        let (_dir, store) = new_store();
        store.initialize().await.unwrap();
        let tasks = store.get_tasks(None).await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_first_task_gets_id_one() {
        let (_dir, store) = new_store();
        store.initialize().await.unwrap();
        let task = store
            .create_task(NewTask {
                title: "A".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(task.id, 1);
    }

    #[tokio::test]
    async fn test_create_task_rejects_missing_dependency() {
        let (_dir, store) = new_store();
        store.initialize().await.unwrap();
        let result = store
            .create_task(NewTask {
                title: "A".to_string(),
                dependencies: [99].into_iter().collect(),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_cleans_up_dependencies_by_default() {
        let (_dir, store) = new_store();
        store.initialize().await.unwrap();
        let a = store
            .create_task(NewTask {
                title: "A".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let b = store
            .create_task(NewTask {
                title: "B".to_string(),
                dependencies: [a.id].into_iter().collect(),
                ..Default::default()
            })
            .await
            .unwrap();

        store.delete_task(a.id).await.unwrap();
        let b_after = store.get_task(b.id).await.unwrap().unwrap();
        assert!(!b_after.dependencies.contains(&a.id));
    }

    #[tokio::test]
    async fn test_delete_skips_cleanup_when_requested() {
        let (_dir, store) = new_store();
        store.initialize().await.unwrap();
        let a = store
            .create_task(NewTask {
                title: "A".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let b = store
            .create_task(NewTask {
                title: "B".to_string(),
                dependencies: [a.id].into_iter().collect(),
                ..Default::default()
            })
            .await
            .unwrap();

        store.delete_task_ext(a.id, true).await.unwrap();
        let b_after = store.get_task(b.id).await.unwrap().unwrap();
        assert!(b_after.dependencies.contains(&a.id));
    }

    #[tokio::test]
    async fn test_subtask_ids_are_scoped_to_parent() {
        let (_dir, store) = new_store();
        store.initialize().await.unwrap();
        let a = store
            .create_task(NewTask {
                title: "A".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let sub = store
            .create_subtask(
                a.id,
                NewSubtask {
                    title: "A.1".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(sub.sub_id, 1);
    }

    #[tokio::test]
    async fn test_save_tasks_rejects_empty_title() {
        let (_dir, store) = new_store();
        store.initialize().await.unwrap();
        let bad_task = Task::new(1, "".to_string());
        let result = store.save_tasks(vec![bad_task]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reload_reflects_external_writes() {
        let (dir, store) = new_store();
        store.initialize().await.unwrap();

        let mut task = Task::new(1, "External".to_string());
        task.description = "written outside the adapter".to_string();
        let document = LocalDocument { tasks: vec![task] };
        std::fs::write(dir.path().join("tasks.json"), serde_json::to_string(&document).unwrap()).unwrap();

        let tasks = store.get_tasks(None).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "External");
    }
}
