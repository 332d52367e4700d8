use crate::connectivity::ConnectivityMonitor;
use crate::core::conflict::{Conflict, ConflictResolution};
use crate::core::error::{HybridError, HybridResult, SyncError};
use crate::core::task::{Task, TaskPatch, parse_ts};
use crate::events::EventBus;
use crate::storage::local::LocalTaskStore;
use crate::storage::remote::RemoteTaskStore;
use crate::storage::{NewTask, QueuedOperation, StorageAdapter};
use crate::sync::events::{ConflictSummary, DirectionResult, SyncAction, SyncEvent, SyncResult, TaskSyncResult};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Winner {
    Conflict,
    Local,
    Remote,
}

/// Compare a paired local/remote snapshot per the specification's conflict
/// detection algorithm: conflict iff both sides were modified since the last
/// successful sync, otherwise the strictly-newer side wins with ties
/// resolved to local.
fn compare(local: &Task, remote: &Task) -> Winner {
    let last_sync = local.last_synced_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let local_modified = parse_ts(local.last_modified_local, local.updated_at);
    let remote_modified = parse_ts(remote.last_modified_remote, remote.updated_at);

    if local_modified > last_sync && remote_modified > last_sync {
        Winner::Conflict
    } else if remote_modified > local_modified {
        Winner::Remote
    } else {
        Winner::Local
    }
}

/// A failed remote write is only worth queuing for replay if the connectivity
/// monitor has already flagged the link down and the error itself is the
/// retriable kind (transport hiccup or rate limit) rather than something a
/// retry can never fix (bad auth, unsupported operation).
fn should_requeue(online: bool, error: &HybridError) -> bool {
    if online {
        return false;
    }
    matches!(error, HybridError::Remote(e) if e.is_retriable())
}

fn patch_from_task(task: &Task) -> TaskPatch {
    TaskPatch {
        title: Some(task.title.clone()),
        description: Some(task.description.clone()),
        details: Some(task.details.clone()),
        test_strategy: Some(task.test_strategy.clone()),
        status: Some(task.status),
        priority: Some(task.priority),
        dependencies: Some(task.dependencies.clone()),
    }
}

fn new_task_from(task: &Task) -> NewTask {
    NewTask {
        title: task.title.clone(),
        description: task.description.clone(),
        details: task.details.clone(),
        test_strategy: task.test_strategy.clone(),
        status: Some(task.status),
        priority: Some(task.priority),
        dependencies: task.dependencies.clone(),
    }
}

/// Detects conflicts, resolves them under a configured strategy, and drives
/// full and per-task synchronization passes between the local and remote
/// adapters. All sync activity — full passes and per-task force-syncs alike
/// — is serialized behind a single lock, the simple implementation the
/// concurrency model explicitly allows.
pub struct SyncEngine {
    local: Arc<LocalTaskStore>,
    remote: Arc<RemoteTaskStore>,
    queue: Arc<crate::storage::OfflineQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    conflict_resolution: RwLock<ConflictResolution>,
    conflicts: RwLock<HashMap<i64, Conflict>>,
    activity_lock: Mutex<()>,
    events: EventBus<SyncEvent>,
}

impl SyncEngine {
    pub fn new(
        local: Arc<LocalTaskStore>,
        remote: Arc<RemoteTaskStore>,
        queue: Arc<crate::storage::OfflineQueue>,
        connectivity: Arc<ConnectivityMonitor>,
        conflict_resolution: ConflictResolution,
    ) -> Self {
        Self {
            local,
            remote,
            queue,
            connectivity,
            conflict_resolution: RwLock::new(conflict_resolution),
            conflicts: RwLock::new(HashMap::new()),
            activity_lock: Mutex::new(()),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(SyncEvent) + Send + Sync + 'static) {
        self.events.subscribe(listener);
    }

    pub async fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts.read().await.values().cloned().collect()
    }

    /// Explicit resolution of an already-recorded conflict. Idempotent in the
    /// sense required by the specification: resolving twice fails the second
    /// time with `no-such-conflict`, since the first resolution removes the
    /// record from the live set.
    pub async fn resolve_conflict(&self, task_id: i64, resolution: ConflictResolution) -> HybridResult<()> {
        let _guard = self.activity_lock.lock().await;
        let conflict = {
            let mut conflicts = self.conflicts.write().await;
            conflicts.remove(&task_id)
        };
        let Some(mut conflict) = conflict else {
            return Err(SyncError::NoSuchConflict { task_id }.into());
        };

        self.apply_resolution(&mut conflict, resolution).await?;
        self.events.emit(SyncEvent::ConflictResolved { task_id, resolution });
        Ok(())
    }

    async fn apply_resolution(&self, conflict: &mut Conflict, resolution: ConflictResolution) -> HybridResult<()> {
        let winner = match resolution {
            ConflictResolution::Manual => {
                return Err(SyncError::ResolutionFailed {
                    message: "manual strategy requires an explicit non-manual resolution".to_string(),
                }
                .into());
            }
            ConflictResolution::LocalWins => conflict.local_snapshot.clone(),
            ConflictResolution::RemoteWins => conflict.remote_snapshot.clone(),
            ConflictResolution::NewestWins => match compare(&conflict.local_snapshot, &conflict.remote_snapshot) {
                Winner::Remote => conflict.remote_snapshot.clone(),
                _ => conflict.local_snapshot.clone(),
            },
        };

        self.remote.update_task(conflict.task_id, patch_from_task(&winner)).await?;
        self.local.update_task(conflict.task_id, patch_from_task(&winner)).await?;
        self.local.mark_synced(conflict.task_id, winner.remote_item_id.clone()).await?;
        conflict.resolve(resolution);
        Ok(())
    }

    /// Full pass over both adapters. Serializes with itself and with
    /// per-task force-syncs via the shared activity lock.
    pub async fn sync_all(&self) -> HybridResult<SyncResult> {
        let _guard = self.activity_lock.lock().await;
        self.run_full_pass().await
    }

    /// Non-blocking variant for the auto-sync timer: if a pass is already
    /// running, the tick is skipped rather than queued.
    pub async fn try_sync_all(&self) -> HybridResult<SyncResult> {
        let _guard = self.activity_lock.try_lock().map_err(|_| SyncError::PassInProgress)?;
        self.run_full_pass().await
    }

    async fn run_full_pass(&self) -> HybridResult<SyncResult> {
        let started = std::time::Instant::now();
        self.events.emit(SyncEvent::SyncStarted);
        info!("starting full sync pass");

        let local_tasks = self.local.get_tasks(None).await?;
        let remote_tasks = self.remote.get_tasks(None).await?;

        let local_map: HashMap<i64, Task> = local_tasks.into_iter().map(|t| (t.id, t)).collect();
        let remote_map: HashMap<i64, Task> = remote_tasks.into_iter().map(|t| (t.id, t)).collect();

        let mut flagged: HashSet<i64> = HashSet::new();
        let mut local_to_remote = DirectionResult::default();
        let mut remote_to_local = DirectionResult::default();
        let mut conflicts_detected = Vec::new();

        // Phase 2: iterate local tasks.
        for (id, local_task) in &local_map {
            match remote_map.get(id) {
                None => match self.remote.create_task_for_local_id(*id, new_task_from(local_task)).await {
                    Ok(created) => {
                        let _ = self.local.mark_synced(*id, created.remote_item_id.clone()).await;
                        local_to_remote.created += 1;
                    }
                    Err(e) => {
                        warn!(task_id = id, error = %e, "failed to mirror local task to remote");
                        let _ = self.local.mark_sync_error(*id, e.to_string()).await;
                        local_to_remote.failed += 1;
                    }
                },
                Some(remote_task) => match compare(local_task, remote_task) {
                    Winner::Conflict => {
                        let conflict = Conflict::new(*id, local_task.clone(), remote_task.clone());
                        self.conflicts.write().await.insert(*id, conflict.clone());
                        self.events.emit(SyncEvent::ConflictDetected(conflict.clone()));
                        conflicts_detected.push(conflict);
                        flagged.insert(*id);
                    }
                    Winner::Local => {
                        match self.remote.update_task(*id, patch_from_task(local_task)).await {
                            Ok(updated) => {
                                let _ = self.local.mark_synced(*id, updated.remote_item_id.clone()).await;
                                local_to_remote.updated += 1;
                            }
                            Err(e) => {
                                warn!(task_id = id, error = %e, "failed to push local update to remote");
                                if should_requeue(self.connectivity.is_online(), &e) {
                                    let _ = self
                                        .queue
                                        .enqueue(*id, QueuedOperation::Update, serde_json::to_value(local_task).unwrap_or_default())
                                        .await;
                                }
                                let _ = self.local.mark_sync_error(*id, e.to_string()).await;
                                local_to_remote.failed += 1;
                            }
                        }
                        flagged.insert(*id);
                    }
                    Winner::Remote => {
                        local_to_remote.skipped += 1;
                    }
                },
            }
        }

        // Phase 3: iterate remote tasks not yet flagged.
        for (id, remote_task) in &remote_map {
            if flagged.contains(id) {
                continue;
            }
            match local_map.get(id) {
                None => match self.local.insert_task_with_id(remote_task.clone()).await {
                    Ok(_) => {
                        let _ = self.local.mark_synced(*id, remote_task.remote_item_id.clone()).await;
                        remote_to_local.created += 1;
                    }
                    Err(e) => {
                        warn!(task_id = id, error = %e, "failed to ingest remote-only task");
                        remote_to_local.failed += 1;
                    }
                },
                Some(local_task) => {
                    if matches!(compare(local_task, remote_task), Winner::Remote) {
                        match self.local.update_task(*id, patch_from_task(remote_task)).await {
                            Ok(_) => {
                                let _ = self.local.mark_synced(*id, remote_task.remote_item_id.clone()).await;
                                remote_to_local.updated += 1;
                            }
                            Err(e) => {
                                warn!(task_id = id, error = %e, "failed to pull remote update into local");
                                remote_to_local.failed += 1;
                            }
                        }
                    } else {
                        remote_to_local.skipped += 1;
                    }
                }
            }
        }

        // Phase 4: resolve freshly detected conflicts if a non-manual strategy is configured.
        let strategy = *self.conflict_resolution.read().await;
        let mut resolved = 0u32;
        if strategy != ConflictResolution::Manual {
            for conflict in &conflicts_detected {
                let conflict = self.conflicts.write().await.remove(&conflict.task_id);
                if let Some(mut conflict) = conflict {
                    match self.apply_resolution(&mut conflict, strategy).await {
                        Ok(()) => {
                            resolved += 1;
                            self.events.emit(SyncEvent::ConflictResolved {
                                task_id: conflict.task_id,
                                resolution: strategy,
                            });
                        }
                        Err(e) => {
                            self.conflicts.write().await.insert(conflict.task_id, conflict);
                            warn!(error = %e, "automatic conflict resolution failed");
                        }
                    }
                }
            }
        }

        let remaining = self.conflicts.read().await.len() as u32;
        let result = SyncResult {
            local_to_remote,
            remote_to_local,
            conflicts: ConflictSummary {
                detected: conflicts_detected.len() as u32,
                resolved,
                remaining,
            },
            duration_ms: started.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        };

        info!(
            local_created = result.local_to_remote.created,
            remote_created = result.remote_to_local.created,
            conflicts = result.conflicts.detected,
            "full sync pass finished"
        );
        self.events.emit(SyncEvent::SyncCompleted(result.clone()));
        Ok(result)
    }

    /// Force-sync a single task. Serializes with full passes via the shared
    /// activity lock, per the concurrency model's "simple implementation"
    /// allowance.
    pub async fn sync_task(&self, id: i64) -> HybridResult<TaskSyncResult> {
        let _guard = self.activity_lock.lock().await;

        let local_task = self.local.get_task(id).await?;
        let remote_task = self.remote.get_task(id).await?;

        match (local_task, remote_task) {
            (Some(local_task), None) => match self.remote.create_task_for_local_id(id, new_task_from(&local_task)).await {
                Ok(created) => {
                    self.local.mark_synced(id, created.remote_item_id.clone()).await?;
                    Ok(TaskSyncResult {
                        task_id: id,
                        action: SyncAction::CreatedInRemote,
                        success: true,
                        conflict: None,
                    })
                }
                Err(e) => {
                    self.local.mark_sync_error(id, e.to_string()).await?;
                    Err(e)
                }
            },
            (None, Some(remote_task)) => {
                self.local.insert_task_with_id(remote_task.clone()).await?;
                self.local.mark_synced(id, remote_task.remote_item_id.clone()).await?;
                Ok(TaskSyncResult {
                    task_id: id,
                    action: SyncAction::CreatedInLocal,
                    success: true,
                    conflict: None,
                })
            }
            (Some(local_task), Some(remote_task)) => match compare(&local_task, &remote_task) {
                Winner::Conflict => {
                    let conflict = Conflict::new(id, local_task, remote_task);
                    self.conflicts.write().await.insert(id, conflict.clone());
                    self.events.emit(SyncEvent::ConflictDetected(conflict.clone()));
                    Ok(TaskSyncResult {
                        task_id: id,
                        action: SyncAction::ConflictDetected,
                        success: true,
                        conflict: Some(conflict),
                    })
                }
                Winner::Local => {
                    let updated = self.remote.update_task(id, patch_from_task(&local_task)).await?;
                    self.local.mark_synced(id, updated.remote_item_id.clone()).await?;
                    Ok(TaskSyncResult {
                        task_id: id,
                        action: SyncAction::UpdatedRemoteFromLocal,
                        success: true,
                        conflict: None,
                    })
                }
                Winner::Remote => {
                    self.local.update_task(id, patch_from_task(&remote_task)).await?;
                    self.local.mark_synced(id, remote_task.remote_item_id.clone()).await?;
                    Ok(TaskSyncResult {
                        task_id: id,
                        action: SyncAction::UpdatedLocalFromRemote,
                        success: true,
                        conflict: None,
                    })
                }
            },
            (None, None) => Ok(TaskSyncResult {
                task_id: id,
                action: SyncAction::NoOp,
                success: true,
                conflict: None,
            }),
        }
    }

    /// Drain every ready offline-queue entry, replaying it against the
    /// remote adapter. Called immediately on the offline-to-online
    /// transition, before the next full pass is scheduled.
    pub async fn drain_queue(&self) -> HybridResult<()> {
        for entry in self.queue.ready().await {
            let result = match entry.operation {
                QueuedOperation::Create | QueuedOperation::Update => {
                    if let Ok(task) = serde_json::from_value::<Task>(entry.payload.clone()) {
                        self.remote.update_task(entry.task_id, patch_from_task(&task)).await.map(|_| ())
                    } else {
                        Ok(())
                    }
                }
                QueuedOperation::Delete => self.remote.delete_task(entry.task_id).await.map(|_| ()),
            };

            match result {
                Ok(()) => {
                    self.queue.mark_succeeded(entry.id).await?;
                    let _ = self.local.mark_synced(entry.task_id, None).await;
                }
                Err(e) => {
                    if let Err(dead_letter_err) = self.queue.mark_failed(entry.id, e.to_string()).await {
                        warn!(task_id = entry.task_id, error = %dead_letter_err, "queue entry moved to dead-letter");
                        self.events.emit(SyncEvent::SyncError(dead_letter_err.to_string()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RemoteError;
    use crate::core::task::TaskSyncStatus;
    use chrono::Duration as ChronoDuration;

    fn sample_task(last_synced_at: Option<DateTime<Utc>>, last_modified_local: Option<DateTime<Utc>>, last_modified_remote: Option<DateTime<Utc>>) -> Task {
        Task {
            id: 1,
            remote_item_id: None,
            title: "t".to_string(),
            description: String::new(),
            details: String::new(),
            test_strategy: String::new(),
            status: Default::default(),
            priority: Default::default(),
            dependencies: Default::default(),
            subtasks: Vec::new(),
            last_synced_at,
            last_modified_local,
            last_modified_remote,
            updated_at: None,
            sync_status: TaskSyncStatus::default(),
            last_sync_error: None,
        }
    }

    #[test]
    fn test_compare_detects_conflict_when_both_sides_modified_since_last_sync() {
        let sync_time = Utc::now();
        let local = sample_task(Some(sync_time), Some(sync_time + ChronoDuration::seconds(5)), None);
        let remote = sample_task(None, None, Some(sync_time + ChronoDuration::seconds(10)));
        assert_eq!(compare(&local, &remote), Winner::Conflict);
    }

    /// Scenario: both sides carry the exact same modification instant. Per
    /// the specification's tie-breaking rule, this must resolve to local
    /// rather than alternating or erroring.
    #[test]
    fn test_compare_tie_resolves_to_local() {
        let sync_time = Utc::now();
        let modified = sync_time + ChronoDuration::seconds(5);
        let local = sample_task(Some(sync_time), Some(modified), None);
        let remote = sample_task(None, None, Some(modified));
        assert_eq!(compare(&local, &remote), Winner::Local);
    }

    #[test]
    fn test_compare_remote_newer_wins() {
        let sync_time = Utc::now();
        let local = sample_task(Some(sync_time), Some(sync_time - ChronoDuration::seconds(5)), None);
        let remote = sample_task(None, None, Some(sync_time + ChronoDuration::seconds(5)));
        assert_eq!(compare(&local, &remote), Winner::Remote);
    }

    #[test]
    fn test_should_requeue_only_when_offline_and_retriable() {
        let transport_err: HybridError = RemoteError::Transport { message: "x".into() }.into();
        let auth_err: HybridError = RemoteError::Authentication { message: "x".into() }.into();

        assert!(should_requeue(false, &transport_err));
        assert!(!should_requeue(true, &transport_err));
        assert!(!should_requeue(false, &auth_err));
    }
}
