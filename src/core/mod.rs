pub mod config;
pub mod conflict;
pub mod error;
pub mod logging;
pub mod task;

pub use config::{AppConfig, HybridConfig, RemoteConfig, load_config, validate_config};
pub use conflict::{Conflict, ConflictResolution};
pub use error::{
    ConfigError, HybridError, HybridResult, QueueError, RemoteError, StorageError, SyncError, TaskError,
};
pub use logging::init_logging;
pub use task::{Priority, Subtask, Task, TaskId, TaskPatch, TaskStatus, TaskSyncStatus};
