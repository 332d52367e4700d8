//! End-to-end coverage of the six concrete scenarios the specification
//! walks through: fresh mirror, remote-only ingest, concurrent-edit
//! conflict, offline write + drain, and (tie-breaking aside) newest-wins.
//! Rate-limit backoff is exercised separately against the real transport in
//! `transport::remote_client`'s own test module, since the retry budget
//! lives inside `RemoteClient`, not behind the abstract `Transport` trait
//! these tests mock out.

use crate::connectivity::ConnectivityMonitor;
use crate::core::config::ColumnMapping;
use crate::core::conflict::ConflictResolution;
use crate::core::error::{HybridResult, RemoteError};
use crate::storage::{LocalTaskStore, NewTask, OfflineQueue, RemoteTaskStore, StorageAdapter};
use crate::sync::SyncEngine;
use crate::transport::{HttpMethod, RemoteRequest, Transport};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

struct BoardItem {
    name: String,
    columns: serde_json::Map<String, Value>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// In-memory stand-in for a remote board: enough of the items/column-values
/// wire shape for `RemoteTaskStore` to round-trip through, with real
/// mutation state so GET reflects prior POST/PATCH/DELETE calls.
struct BoardTransport {
    items: Mutex<HashMap<u64, BoardItem>>,
    next_id: AtomicU64,
}

impl BoardTransport {
    fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn seed(&self, id: u64, name: &str) {
        self.items.lock().unwrap().insert(
            id,
            BoardItem {
                name: name.to_string(),
                columns: serde_json::Map::new(),
                updated_at: chrono::Utc::now(),
            },
        );
        if id >= self.next_id.load(Ordering::SeqCst) {
            self.next_id.store(id + 1, Ordering::SeqCst);
        }
    }

    fn item_json(id: u64, item: &BoardItem) -> Value {
        json!({
            "id": id,
            "name": item.name,
            "updated_at": item.updated_at.to_rfc3339(),
            "column_values": item.columns,
            "subitems": [],
        })
    }
}

fn extract_item_id(path: &str) -> u64 {
    path.trim_start_matches("/items/").split('/').next().unwrap_or("0").parse().unwrap_or(0)
}

#[async_trait]
impl Transport for BoardTransport {
    async fn send(&self, request: RemoteRequest) -> HybridResult<Value> {
        match (request.method, request.path.as_str()) {
            (HttpMethod::Get, path) if path.starts_with("/boards/") && path.ends_with("/items") => {
                let items = self.items.lock().unwrap();
                let list: Vec<Value> = items.iter().map(|(id, item)| Self::item_json(*id, item)).collect();
                Ok(json!({ "items": list }))
            }
            (HttpMethod::Post, path) if path.starts_with("/boards/") && path.ends_with("/items") => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let name = request.body.as_ref().and_then(|b| b.get("name")).and_then(Value::as_str).unwrap_or_default().to_string();
                self.items.lock().unwrap().insert(
                    id,
                    BoardItem {
                        name: name.clone(),
                        columns: serde_json::Map::new(),
                        updated_at: chrono::Utc::now(),
                    },
                );
                Ok(json!({ "id": id, "name": name }))
            }
            (HttpMethod::Post, path) if path.ends_with("/column_values") => {
                let id = extract_item_id(path);
                let mut items = self.items.lock().unwrap();
                if let Some(item) = items.get_mut(&id) {
                    if let Some(obj) = request.body.as_ref().and_then(Value::as_object) {
                        for (k, v) in obj {
                            item.columns.insert(k.clone(), v.clone());
                        }
                    }
                    item.updated_at = chrono::Utc::now();
                }
                Ok(Value::Null)
            }
            (HttpMethod::Patch, path) => {
                let id = extract_item_id(path);
                let mut items = self.items.lock().unwrap();
                if let Some(item) = items.get_mut(&id) {
                    if let Some(name) = request.body.as_ref().and_then(|b| b.get("name")).and_then(Value::as_str) {
                        item.name = name.to_string();
                    }
                    item.updated_at = chrono::Utc::now();
                }
                Ok(Value::Null)
            }
            (HttpMethod::Delete, path) => {
                let id = extract_item_id(path);
                self.items.lock().unwrap().remove(&id);
                Ok(Value::Null)
            }
            _ => Ok(Value::Null),
        }
    }
}

/// Wraps a `BoardTransport` but can be told to fail every call with a
/// retriable transport error, for simulating an outage mid-pass.
struct FlakyTransport {
    inner: BoardTransport,
    failing: AtomicBool,
}

impl FlakyTransport {
    fn new() -> Self {
        Self {
            inner: BoardTransport::new(),
            failing: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn send(&self, request: RemoteRequest) -> HybridResult<Value> {
        // Reads still succeed during the simulated outage (the board's list
        // endpoint is cheap and often cached upstream); it's writes that
        // start failing, which is what actually drives a task onto the
        // offline queue.
        if self.failing.load(Ordering::SeqCst) && !matches!(request.method, HttpMethod::Get) {
            return Err(RemoteError::Transport {
                message: "simulated outage".to_string(),
            }
            .into());
        }
        self.inner.send(request).await
    }
}

struct Harness {
    _local_dir: tempfile::TempDir,
    _queue_dir: tempfile::TempDir,
    local: Arc<LocalTaskStore>,
    queue: Arc<OfflineQueue>,
    connectivity: Arc<ConnectivityMonitor>,
}

fn build_harness() -> Harness {
    let local_dir = tempfile::tempdir().unwrap();
    let queue_dir = tempfile::tempdir().unwrap();
    Harness {
        local: Arc::new(LocalTaskStore::new(local_dir.path().join("tasks.json"))),
        queue: Arc::new(OfflineQueue::new(queue_dir.path().join("queue.json"))),
        connectivity: Arc::new(ConnectivityMonitor::new()),
        _local_dir: local_dir,
        _queue_dir: queue_dir,
    }
}

fn engine_with(h: &Harness, remote: Arc<RemoteTaskStore>, resolution: ConflictResolution) -> SyncEngine {
    SyncEngine::new(h.local.clone(), remote, h.queue.clone(), h.connectivity.clone(), resolution)
}

fn remote_store(transport: Arc<dyn Transport>) -> Arc<RemoteTaskStore> {
    Arc::new(RemoteTaskStore::new(transport, "board-1", ColumnMapping::default(), 0))
}

#[tokio::test]
async fn scenario_fresh_mirror_creates_remote_copy_of_every_local_task() {
    let h = build_harness();
    h.local
        .create_task(NewTask {
            title: "write the deploy runbook".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let transport = Arc::new(BoardTransport::new());
    let remote = remote_store(transport);
    let engine = engine_with(&h, remote.clone(), ConflictResolution::NewestWins);

    let result = engine.sync_all().await.unwrap();
    assert_eq!(result.local_to_remote.created, 1);
    assert_eq!(result.conflicts.detected, 0);

    let mirrored = remote.get_tasks(None).await.unwrap();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].title, "write the deploy runbook");

    let local_task = h.local.get_task(mirrored[0].id).await.unwrap().unwrap();
    assert!(local_task.remote_item_id.is_some());
}

#[tokio::test]
async fn scenario_remote_only_task_is_ingested_into_local() {
    let h = build_harness();
    let transport = Arc::new(BoardTransport::new());
    transport.seed(500, "triage the incident backlog");
    let remote = remote_store(transport);
    let engine = engine_with(&h, remote, ConflictResolution::NewestWins);

    let result = engine.sync_all().await.unwrap();
    assert_eq!(result.remote_to_local.created, 1);

    let local_task = h.local.get_task(500).await.unwrap().unwrap();
    assert_eq!(local_task.title, "triage the incident backlog");
    assert_eq!(local_task.sync_status, crate::core::task::TaskSyncStatus::Synced);
}

#[tokio::test]
async fn scenario_concurrent_edit_is_detected_and_auto_resolved() {
    let h = build_harness();
    let local_task = h
        .local
        .create_task(NewTask {
            title: "initial title".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let transport = Arc::new(BoardTransport::new());
    let remote = remote_store(transport);
    let engine = engine_with(&h, remote.clone(), ConflictResolution::NewestWins);

    // First pass mirrors the task and records a baseline last-synced time.
    engine.sync_all().await.unwrap();

    // Independent edits on both sides since the last sync.
    h.local
        .update_task(
            local_task.id,
            crate::core::task::TaskPatch {
                title: Some("local edit".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    remote
        .update_task(
            local_task.id,
            crate::core::task::TaskPatch {
                title: Some("remote edit".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = engine.sync_all().await.unwrap();
    assert_eq!(result.conflicts.detected, 1);
    assert_eq!(result.conflicts.resolved, 1);
    assert_eq!(result.conflicts.remaining, 0);
    assert!(engine.conflicts().await.is_empty());
}

#[tokio::test]
async fn scenario_offline_write_is_queued_then_drained_on_reconnect() {
    let h = build_harness();
    let local_task = h
        .local
        .create_task(NewTask {
            title: "patch the ingestion worker".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let transport = Arc::new(FlakyTransport::new());
    let remote = remote_store(transport.clone());
    let engine = engine_with(&h, remote.clone(), ConflictResolution::NewestWins);

    engine.sync_all().await.unwrap();

    // Outage: connectivity drops and the remote becomes unreachable.
    h.connectivity.set_online(false);
    transport.set_failing(true);
    h.local
        .update_task(
            local_task.id,
            crate::core::task::TaskPatch {
                title: Some("patch the ingestion worker (v2)".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = engine.sync_all().await.unwrap();
    assert_eq!(result.local_to_remote.failed, 1);
    assert_eq!(h.queue.len().await, 1);

    // Reconnect: the outage clears and the queued write replays.
    transport.set_failing(false);
    h.connectivity.set_online(true);
    engine.drain_queue().await.unwrap();

    assert_eq!(h.queue.len().await, 0);
    let mirrored = remote.get_task(local_task.id).await.unwrap().unwrap();
    assert_eq!(mirrored.title, "patch the ingestion worker (v2)");
}

/// Transport whose reads always succeed against the underlying board but
/// whose writes can be switched to fail with a non-retriable auth error,
/// independently of the offline/online flag the engine also consults.
struct FlippableAuthTransport {
    inner: BoardTransport,
    fail_writes: AtomicBool,
}

impl FlippableAuthTransport {
    fn new() -> Self {
        Self {
            inner: BoardTransport::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FlippableAuthTransport {
    async fn send(&self, request: RemoteRequest) -> HybridResult<Value> {
        if self.fail_writes.load(Ordering::SeqCst) && !matches!(request.method, HttpMethod::Get) {
            return Err(RemoteError::Authentication {
                message: "token revoked".to_string(),
            }
            .into());
        }
        self.inner.send(request).await
    }
}

#[tokio::test]
async fn scenario_non_retriable_remote_error_is_not_queued_while_offline() {
    let h = build_harness();
    let local_task = h
        .local
        .create_task(NewTask {
            title: "needs a fresh token".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let transport = Arc::new(FlippableAuthTransport::new());
    let remote = remote_store(transport.clone());
    let engine = engine_with(&h, remote, ConflictResolution::NewestWins);

    // Establish a synced baseline while the transport is still healthy.
    engine.sync_all().await.unwrap();

    // The token is revoked and connectivity happens to be reporting offline
    // at the same moment.
    transport.set_fail_writes(true);
    h.connectivity.set_online(false);
    h.local
        .update_task(
            local_task.id,
            crate::core::task::TaskPatch {
                title: Some("needs a fresh token (edited)".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = engine.sync_all().await.unwrap();
    assert_eq!(result.local_to_remote.failed, 1);

    // An authentication failure is never retriable, so it must not be
    // queued for replay even though connectivity reports offline.
    assert_eq!(h.queue.len().await, 0);
}
