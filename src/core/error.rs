use thiserror::Error;

/// Top-level error type for the sync engine and its dependencies.
#[derive(Error, Debug)]
pub enum HybridError {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Offline queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Task-level errors (kind 4 "not-found" and kind 5 "invalid dependency").
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task not found: {id}")]
    NotFound { id: String },

    #[error("Task already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid dependencies: {message}")]
    InvalidDependencies { message: String },
}

/// Local-adapter and on-disk storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Data corruption detected: {message}")]
    Corruption { message: String },

    #[error("Storage initialization failed: {message}")]
    Initialization { message: String },
}

/// Configuration errors (kind 1) — fatal at initialization.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {message}")]
    InvalidFormat { message: String },

    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Remote-adapter and transport errors (kinds 2 and 3).
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Operation not supported by this adapter: {operation}")]
    Unsupported { operation: String },
}

impl RemoteError {
    /// Transport and rate-limit errors are retriable; everything else is not.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RemoteError::Transport { .. } | RemoteError::RateLimit { .. })
    }
}

/// Offline-queue errors (kind 7, queue flavor).
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue is corrupt: {message}")]
    Corrupt { message: String },

    #[error("No such queue entry: {id}")]
    NotFound { id: String },

    #[error("Entry exhausted its retry budget and moved to dead-letter: {id}")]
    DeadLettered { id: String },
}

/// Sync-engine errors. Conflict detection itself never raises (kind 6);
/// these cover resolution-path failures only.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No conflict recorded for task {task_id}")]
    NoSuchConflict { task_id: i64 },

    #[error("Conflict resolution failed: {message}")]
    ResolutionFailed { message: String },

    #[error("Sync pass already in progress")]
    PassInProgress,

    #[error("No remote adapter is configured")]
    RemoteNotConfigured,

    #[error("Invalid offline-queue entry id: {id}")]
    InvalidQueueEntryId { id: String },
}

pub type HybridResult<T> = Result<T, HybridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display() {
        let error = TaskError::NotFound { id: "5".to_string() };
        assert_eq!(error.to_string(), "Task not found: 5");
    }

    #[test]
    fn test_remote_error_retriable() {
        assert!(RemoteError::Transport { message: "x".into() }.is_retriable());
        assert!(RemoteError::RateLimit { message: "x".into() }.is_retriable());
        assert!(!RemoteError::Authentication { message: "x".into() }.is_retriable());
    }

    #[test]
    fn test_error_conversion() {
        let task_error = TaskError::NotFound { id: "5".to_string() };
        let hybrid_error: HybridError = task_error.into();
        assert!(matches!(hybrid_error, HybridError::Task(_)));
    }

    #[test]
    fn test_hybrid_result_type() {
        let result: HybridResult<String> = Ok("ok".to_string());
        assert!(result.is_ok());
    }
}
