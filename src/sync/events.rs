use crate::core::conflict::{Conflict, ConflictResolution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectionResult {
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub detected: u32,
    pub resolved: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub local_to_remote: DirectionResult,
    pub remote_to_local: DirectionResult,
    pub conflicts: ConflictSummary,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    CreatedInRemote,
    CreatedInLocal,
    UpdatedRemoteFromLocal,
    UpdatedLocalFromRemote,
    ConflictDetected,
    NoOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSyncResult {
    pub task_id: i64,
    pub action: SyncAction,
    pub success: bool,
    pub conflict: Option<Conflict>,
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    SyncStarted,
    SyncCompleted(SyncResult),
    ConflictDetected(Conflict),
    ConflictResolved { task_id: i64, resolution: ConflictResolution },
    SyncError(String),
}
