use crate::core::conflict::ConflictResolution;
use crate::core::error::{ConfigError, HybridResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Which adapter is consulted first for reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryProvider {
    #[default]
    Local,
    Remote,
}

/// `persistence.hybridConfig.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    #[serde(default)]
    pub primary_provider: PrimaryProvider,
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,
    #[serde(default = "default_sync_on_write")]
    pub sync_on_write: bool,
    #[serde(default = "default_conflict_resolution")]
    pub conflict_resolution: ConflictResolution,
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            primary_provider: PrimaryProvider::default(),
            auto_sync: default_auto_sync(),
            sync_on_write: default_sync_on_write(),
            conflict_resolution: default_conflict_resolution(),
            sync_interval: default_sync_interval(),
            retry_attempts: default_retry_attempts(),
            timeout: default_timeout(),
        }
    }
}

/// `remote.columnMapping` — logical field name to remote column id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default = "default_column_status")]
    pub status: String,
    #[serde(default = "default_column_title")]
    pub title: String,
    #[serde(default = "default_column_description")]
    pub description: String,
    #[serde(default = "default_column_details")]
    pub details: String,
    /// Optional custom task-id column. When configured and populated on a
    /// remote item, this is authoritative over the remote item id (resolved
    /// open question, see DESIGN.md).
    pub task_id: Option<String>,
    #[serde(default = "default_column_priority")]
    pub priority: String,
    #[serde(default = "default_column_test_strategy")]
    pub test_strategy: String,
    #[serde(default = "default_column_dependencies")]
    pub dependencies: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            status: default_column_status(),
            title: default_column_title(),
            description: default_column_description(),
            details: default_column_details(),
            task_id: None,
            priority: default_column_priority(),
            test_strategy: default_column_test_strategy(),
            dependencies: default_column_dependencies(),
        }
    }
}

/// `remote.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub board_id: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub column_mapping: ColumnMapping,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Resolved from the `HYBRIDTASK_REMOTE_TOKEN` environment variable, never
    /// read from the config file.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            board_id: None,
            base_url: default_base_url(),
            column_mapping: ColumnMapping::default(),
            cache_ttl: default_cache_ttl(),
            max_concurrent: default_max_concurrent(),
            token: None,
        }
    }
}

/// Root configuration record, the "frozen options record" supplied to the
/// engine per the specification's scope boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            output_format: default_output_format(),
            hybrid: HybridConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn local_tasks_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("offline-queue.json")
    }

    /// Whether the remote adapter is expected to be usable — either it's the
    /// primary, or a board has been configured at all.
    pub fn remote_enabled(&self) -> bool {
        self.hybrid.primary_provider == PrimaryProvider::Remote || self.remote.board_id.is_some()
    }
}

pub const REMOTE_TOKEN_ENV_VAR: &str = "HYBRIDTASK_REMOTE_TOKEN";

/// Load configuration from a TOML file (if given) and apply environment
/// variable overrides.
pub fn load_config(config_path: Option<PathBuf>) -> HybridResult<AppConfig> {
    let mut config = if let Some(path) = config_path {
        load_config_from_file(&path)?
    } else {
        AppConfig::default()
    };

    override_from_env(&mut config);

    Ok(config)
}

/// Persist configuration back to its TOML file, creating parent directories
/// as needed. The remote token is never written — it stays environment-only.
pub fn save_config(path: &PathBuf, config: &AppConfig) -> HybridResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Validation {
            message: format!("Failed to create config directory: {e}"),
        })?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidFormat {
        message: format!("Failed to serialize configuration: {e}"),
    })?;

    std::fs::write(path, content).map_err(|e| ConfigError::Validation {
        message: format!("Failed to write config file: {e}"),
    })?;

    Ok(())
}

fn load_config_from_file(path: &PathBuf) -> HybridResult<AppConfig> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_string_lossy().to_string(),
        }
        .into());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidFormat {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&content)
        .map_err(|e| ConfigError::InvalidFormat {
            message: format!("Failed to parse TOML: {e}"),
        })
        .map_err(Into::into)
}

fn override_from_env(config: &mut AppConfig) {
    if let Ok(data_dir) = std::env::var("HYBRIDTASK_DATA_DIR") {
        config.data_dir = PathBuf::from(data_dir);
    }
    if let Ok(log_level) = std::env::var("HYBRIDTASK_LOG_LEVEL") {
        config.log_level = log_level;
    }
    if let Ok(output_format) = std::env::var("HYBRIDTASK_OUTPUT_FORMAT") {
        config.output_format = output_format;
    }
    if let Ok(board_id) = std::env::var("HYBRIDTASK_BOARD_ID") {
        config.remote.board_id = Some(board_id);
    }
    if let Ok(token) = std::env::var(REMOTE_TOKEN_ENV_VAR) {
        config.remote.token = Some(token);
    }
}

/// Validate configuration. Required fields, enum values, and numeric ranges
/// per the error taxonomy's "configuration error" kind.
pub fn validate_config(config: &AppConfig) -> HybridResult<()> {
    if !config.data_dir.exists() {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| ConfigError::Validation {
            message: format!("Failed to create data directory: {e}"),
        })?;
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(ConfigError::Validation {
            message: format!("Invalid log level: {}", config.log_level),
        }
        .into());
    }

    let valid_formats = ["text", "json"];
    if !valid_formats.contains(&config.output_format.as_str()) {
        return Err(ConfigError::Validation {
            message: format!("Invalid output format: {}", config.output_format),
        }
        .into());
    }

    if !(60..=3600).contains(&config.hybrid.sync_interval) {
        return Err(ConfigError::Validation {
            message: format!(
                "syncInterval must be between 60 and 3600 seconds, got {}",
                config.hybrid.sync_interval
            ),
        }
        .into());
    }

    if config.hybrid.retry_attempts > 10 {
        return Err(ConfigError::Validation {
            message: format!(
                "retryAttempts must be between 0 and 10, got {}",
                config.hybrid.retry_attempts
            ),
        }
        .into());
    }

    if config.remote_enabled() {
        if config.remote.board_id.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "remote.boardId".to_string(),
            }
            .into());
        }
        if config.remote.token.is_none() {
            return Err(ConfigError::MissingRequired {
                key: REMOTE_TOKEN_ENV_VAR.to_string(),
            }
            .into());
        }
    }

    Ok(())
}

/// Build the default internal→remote status label table, and its inverse.
pub fn default_status_labels() -> HashMap<crate::core::task::TaskStatus, &'static str> {
    use crate::core::task::TaskStatus::*;
    HashMap::from([
        (Pending, "Not Started"),
        (InProgress, "Working on it"),
        (Review, "Under Review"),
        (Done, "Done"),
        (Blocked, "Stuck"),
        (Cancelled, "Cancelled"),
        (Deferred, "Deferred"),
    ])
}

pub fn default_priority_labels() -> HashMap<crate::core::task::Priority, &'static str> {
    use crate::core::task::Priority::*;
    HashMap::from([(Low, "Low"), (Medium, "Medium"), (High, "High"), (Critical, "Critical")])
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("hybridtask")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_output_format() -> String {
    "text".to_string()
}
fn default_auto_sync() -> bool {
    false
}
fn default_sync_on_write() -> bool {
    true
}
fn default_conflict_resolution() -> ConflictResolution {
    ConflictResolution::Manual
}
fn default_sync_interval() -> u64 {
    300
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_timeout() -> u64 {
    30_000
}
fn default_cache_ttl() -> u64 {
    30_000
}
fn default_base_url() -> String {
    "https://api.board.example/v1".to_string()
}
fn default_max_concurrent() -> usize {
    4
}
fn default_column_status() -> String {
    "status".to_string()
}
fn default_column_title() -> String {
    "title".to_string()
}
fn default_column_description() -> String {
    "description".to_string()
}
fn default_column_details() -> String {
    "details".to_string()
}
fn default_column_priority() -> String {
    "priority".to_string()
}
fn default_column_test_strategy() -> String {
    "test_strategy".to_string()
}
fn default_column_dependencies() -> String {
    "dependencies".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid_when_remote_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data_dir = dir.path().to_path_buf();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_remote_enabled_requires_board_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.hybrid.primary_provider = PrimaryProvider::Remote;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::HybridError::Config(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_remote_enabled_requires_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.remote.board_id = Some("board-1".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::HybridError::Config(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_sync_interval_out_of_range_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.hybrid.sync_interval = 10;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_from_missing_file_errors() {
        let result = load_config(Some(PathBuf::from("/nonexistent/hybridtask.toml")));
        assert!(result.is_err());
    }
}
