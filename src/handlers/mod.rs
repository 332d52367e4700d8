pub mod system;
pub mod sync;
pub mod task;

use crate::connectivity::ConnectivityMonitor;
use crate::core::config::AppConfig;
use crate::facade::HybridTaskStore;
use crate::storage::OfflineQueue;
use crate::sync::SyncEngine;
use std::path::PathBuf;
use std::sync::Arc;

/// Bundles the composition root's built graph for the command handlers.
/// Handlers never construct adapters themselves — that's `main`'s job.
pub struct AppContext {
    pub facade: Arc<HybridTaskStore>,
    pub engine: Option<Arc<SyncEngine>>,
    pub queue: Arc<OfflineQueue>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub config: AppConfig,
    /// Resolved path the config was (or would be) loaded from — used by
    /// `system config set/reset` to persist changes back.
    pub config_path: PathBuf,
}
