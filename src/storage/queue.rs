use crate::core::error::{HybridResult, QueueError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

const DEFAULT_MAX_RETRIES: u32 = 5;
const BASE_DELAY_SECS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuedOperation {
    Create,
    Update,
    Delete,
}

/// A pending local change awaiting mirroring to the other adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub task_id: i64,
    pub operation: QueuedOperation,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueDocument {
    #[serde(default)]
    entries: Vec<QueueEntry>,
    #[serde(default)]
    dead_letters: Vec<QueueEntry>,
}

struct QueueState {
    entries: Vec<QueueEntry>,
    dead_letters: Vec<QueueEntry>,
}

/// Durable, per-task-FIFO queue of pending local changes. Entries are
/// appended on enqueue and never reordered, so per-task ordering is whatever
/// order callers enqueued in — an update for a task is never drained ahead
/// of an earlier create for the same task.
pub struct OfflineQueue {
    path: PathBuf,
    max_retries: u32,
    state: RwLock<QueueState>,
}

impl OfflineQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_max_retries(path, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(path: impl Into<PathBuf>, max_retries: u32) -> Self {
        Self {
            path: path.into(),
            max_retries,
            state: RwLock::new(QueueState {
                entries: Vec::new(),
                dead_letters: Vec::new(),
            }),
        }
    }

    fn write_document(&self, document: &QueueDocument) -> HybridResult<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("offline-queue")
        ));
        let content = serde_json::to_string_pretty(document)?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    async fn flush(&self, state: &QueueState) -> HybridResult<()> {
        let document = QueueDocument {
            entries: state.entries.clone(),
            dead_letters: state.dead_letters.clone(),
        };
        self.write_document(&document)
    }

    /// Read the persistent state at startup. An absent file is treated as an
    /// empty queue; a file that fails to parse is `corrupt-queue`.
    pub async fn load(&self) -> HybridResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let document: QueueDocument = serde_json::from_str(&content).map_err(|e| QueueError::Corrupt {
            message: format!("Offline queue document is corrupt: {e}"),
        })?;
        let mut state = self.state.write().await;
        state.entries = document.entries;
        state.dead_letters = document.dead_letters;
        Ok(())
    }

    pub async fn enqueue(&self, task_id: i64, operation: QueuedOperation, payload: Value) -> HybridResult<Uuid> {
        let now = Utc::now();
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            task_id,
            operation,
            payload,
            enqueued_at: now,
            retry_count: 0,
            next_attempt_at: now,
            last_error: None,
        };
        let id = entry.id;

        let mut state = self.state.write().await;
        state.entries.push(entry);
        self.flush(&state).await?;
        Ok(id)
    }

    /// Entries due for another attempt, oldest first.
    pub async fn ready(&self) -> Vec<QueueEntry> {
        let now = Utc::now();
        let state = self.state.read().await;
        state.entries.iter().filter(|e| e.next_attempt_at <= now).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn mark_succeeded(&self, id: Uuid) -> HybridResult<()> {
        let mut state = self.state.write().await;
        let existed = state.entries.iter().any(|e| e.id == id);
        if !existed {
            return Err(QueueError::NotFound { id: id.to_string() }.into());
        }
        state.entries.retain(|e| e.id != id);
        self.flush(&state).await
    }

    /// Increment the retry count and reschedule with exponential backoff and
    /// jitter. Once `retryCount` exceeds `maxRetries` the entry moves to the
    /// dead-letter sublist — retained on disk, no longer retried.
    pub async fn mark_failed(&self, id: Uuid, err: impl Into<String>) -> HybridResult<()> {
        let mut state = self.state.write().await;
        let index = state
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| QueueError::NotFound { id: id.to_string() })?;

        let entry = &mut state.entries[index];
        entry.retry_count += 1;
        entry.last_error = Some(err.into());
        entry.next_attempt_at = Utc::now() + backoff_delay(entry.retry_count);

        if entry.retry_count > self.max_retries {
            let dead = state.entries.remove(index);
            state.dead_letters.push(dead);
            self.flush(&state).await?;
            return Err(QueueError::DeadLettered { id: id.to_string() }.into());
        }

        self.flush(&state).await
    }

    pub async fn dead_letters(&self) -> Vec<QueueEntry> {
        self.state.read().await.dead_letters.clone()
    }

    /// Operator interface: move a dead-lettered entry back onto the active
    /// queue with its retry budget reset.
    pub async fn requeue(&self, id: Uuid) -> HybridResult<()> {
        let mut state = self.state.write().await;
        let index = state
            .dead_letters
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| QueueError::NotFound { id: id.to_string() })?;

        let mut entry = state.dead_letters.remove(index);
        entry.retry_count = 0;
        entry.next_attempt_at = Utc::now();
        entry.last_error = None;
        state.entries.push(entry);

        self.flush(&state).await
    }

    /// Operator interface: permanently discard a dead-lettered entry.
    pub async fn drop_dead_letter(&self, id: Uuid) -> HybridResult<()> {
        let mut state = self.state.write().await;
        let existed = state.dead_letters.iter().any(|e| e.id == id);
        if !existed {
            return Err(QueueError::NotFound { id: id.to_string() }.into());
        }
        state.dead_letters.retain(|e| e.id != id);
        self.flush(&state).await
    }
}

fn backoff_delay(retry_count: u32) -> chrono::Duration {
    let exp_secs = BASE_DELAY_SECS * 2i64.pow(retry_count.saturating_sub(1));
    let jitter_ms = (rand::random::<f32>() * 250.0) as i64;
    chrono::Duration::seconds(exp_secs) + chrono::Duration::milliseconds(jitter_ms)
}
