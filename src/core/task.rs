use crate::core::error::TaskError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Task status, mirroring the enumerated values in the remote board's status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Review,
    Done,
    Blocked,
    Cancelled,
    Deferred,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Deferred => "deferred",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" | "in_progress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "done" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            "deferred" => Ok(TaskStatus::Deferred),
            other => Err(TaskError::Validation {
                message: format!("Invalid task status: {other}"),
            }),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(TaskError::Validation {
                message: format!("Invalid priority: {other}"),
            }),
        }
    }
}

/// Per-task sync-tracking state, distinct from the engine's global run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskSyncStatus {
    #[default]
    Pending,
    Synced,
    Conflict,
    Error,
}

/// Addresses either a top-level task or a `(parentId, subId)` subtask.
///
/// String form is `"<parentId>.<subId>"` for subtasks, or a bare integer for
/// top-level tasks — a string without a `.` is always a top-level id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskId {
    Task(i64),
    Subtask(i64, i64),
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TaskError::Validation {
            message: format!("Invalid task id: {s}"),
        };

        match s.split_once('.') {
            None => {
                let id: i64 = s.parse().map_err(|_| invalid())?;
                if id <= 0 {
                    return Err(invalid());
                }
                Ok(TaskId::Task(id))
            }
            Some((parent, sub)) => {
                let parent_id: i64 = parent.parse().map_err(|_| invalid())?;
                let sub_id: i64 = sub.parse().map_err(|_| invalid())?;
                if parent_id <= 0 || sub_id <= 0 {
                    return Err(invalid());
                }
                Ok(TaskId::Subtask(parent_id, sub_id))
            }
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskId::Task(id) => write!(f, "{id}"),
            TaskId::Subtask(parent, sub) => write!(f, "{parent}.{sub}"),
        }
    }
}

/// Same shape as [`Task`] minus nested subtasks and independent dependency
/// validation — the local adapter does not re-validate a subtask's
/// `dependencies` the way it does for top-level tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub parent_id: i64,
    pub sub_id: i64,
    pub remote_item_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub test_strategy: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub dependencies: HashSet<i64>,
}

impl Subtask {
    pub fn id(&self) -> TaskId {
        TaskId::Subtask(self.parent_id, self.sub_id)
    }
}

/// A record identified by an integer `id`, local-scope unique and
/// monotonically assigned by the local adapter, and optionally a remote
/// `remote_item_id` assigned by the remote store on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub remote_item_id: Option<String>,

    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub test_strategy: String,

    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub dependencies: HashSet<i64>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_modified_local: Option<DateTime<Utc>>,
    pub last_modified_remote: Option<DateTime<Utc>>,
    /// Legacy fallback timestamp used when the more specific fields above are
    /// absent — preserved verbatim from the source system's mixed timestamp
    /// representation (see design notes on timestamp parsing).
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sync_status: TaskSyncStatus,
    pub last_sync_error: Option<String>,
}

impl Task {
    /// Construct a new task with the given title, ready for local insertion.
    /// Caller (the local adapter) is responsible for assigning `id`.
    pub fn new(id: i64, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            remote_item_id: None,
            title,
            description: String::new(),
            details: String::new(),
            test_strategy: String::new(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            dependencies: HashSet::new(),
            subtasks: Vec::new(),
            last_synced_at: None,
            last_modified_local: Some(now),
            last_modified_remote: None,
            updated_at: Some(now),
            sync_status: TaskSyncStatus::Pending,
            last_sync_error: None,
        }
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.title.trim().is_empty() {
            return Err(TaskError::Validation {
                message: "Task title cannot be empty".to_string(),
            });
        }
        if self.dependencies.contains(&self.id) {
            return Err(TaskError::InvalidDependencies {
                message: format!("Task {} cannot depend on itself", self.id),
            });
        }
        Ok(())
    }

    pub fn get_subtask(&self, sub_id: i64) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.sub_id == sub_id)
    }

    pub fn stamp_modified_local(&mut self) {
        self.last_modified_local = Some(Utc::now());
    }
}

/// Partial update applied by `updateTask` — fields present are merged over
/// the existing record; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub test_strategy: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub dependencies: Option<HashSet<i64>>,
}

impl TaskPatch {
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(details) = &self.details {
            task.details = details.clone();
        }
        if let Some(test_strategy) = &self.test_strategy {
            task.test_strategy = test_strategy.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(dependencies) = &self.dependencies {
            task.dependencies = dependencies.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub test_strategy: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

impl SubtaskPatch {
    pub fn apply_to(&self, subtask: &mut Subtask) {
        if let Some(title) = &self.title {
            subtask.title = title.clone();
        }
        if let Some(description) = &self.description {
            subtask.description = description.clone();
        }
        if let Some(details) = &self.details {
            subtask.details = details.clone();
        }
        if let Some(test_strategy) = &self.test_strategy {
            subtask.test_strategy = test_strategy.clone();
        }
        if let Some(status) = self.status {
            subtask.status = status;
        }
        if let Some(priority) = self.priority {
            subtask.priority = priority;
        }
    }
}

/// Resolve the normalized instant used for conflict detection and ordering:
/// prefer the specific field, fall back to `updatedAt`, default to epoch.
/// Never compare the string representations directly.
pub fn parse_ts(specific: Option<DateTime<Utc>>, updated_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    specific.or(updated_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_new() {
        let task = Task::new(1, "Test task".to_string());
        assert_eq!(task.title, "Test task");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.id, 1);
        assert!(task.remote_item_id.is_none());
    }

    #[test]
    fn test_task_status_roundtrip() {
        for s in ["pending", "in-progress", "review", "done", "blocked", "cancelled", "deferred"] {
            let status: TaskStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
    }

    #[test]
    fn test_priority_from_str_invalid() {
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_task_id_parses_bare_integer_as_task() {
        assert_eq!("7".parse::<TaskId>().unwrap(), TaskId::Task(7));
    }

    #[test]
    fn test_task_id_parses_dotted_as_subtask() {
        assert_eq!("3.2".parse::<TaskId>().unwrap(), TaskId::Subtask(3, 2));
    }

    #[test]
    fn test_task_id_rejects_non_positive() {
        assert!("0".parse::<TaskId>().is_err());
        assert!("-1".parse::<TaskId>().is_err());
        assert!("3.0".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_task_validate_rejects_empty_title() {
        let task = Task::new(1, "".to_string());
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_task_validate_rejects_self_dependency() {
        let mut task = Task::new(1, "Test".to_string());
        task.dependencies.insert(1);
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_task_patch_merges_only_present_fields() {
        let mut task = Task::new(1, "Original".to_string());
        task.description = "orig desc".to_string();

        let patch = TaskPatch {
            status: Some(TaskStatus::Done),
            ..Default::default()
        };
        patch.apply_to(&mut task);

        assert_eq!(task.title, "Original");
        assert_eq!(task.description, "orig desc");
        assert_eq!(task.status, TaskStatus::Done);
    }

    #[test]
    fn test_parse_ts_fallback_chain() {
        let now = Utc::now();
        assert_eq!(parse_ts(Some(now), None), now);
        assert_eq!(parse_ts(None, Some(now)), now);
        assert_eq!(parse_ts(None, None), DateTime::<Utc>::UNIX_EPOCH);
    }
}
