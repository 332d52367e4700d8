use crate::core::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Strategy used to resolve a conflict, and the resolution actually applied
/// once one has been chosen (the same enumeration serves both purposes, per
/// the specification's data model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    Manual,
    LocalWins,
    RemoteWins,
    NewestWins,
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictResolution::Manual => "manual",
            ConflictResolution::LocalWins => "local-wins",
            ConflictResolution::RemoteWins => "remote-wins",
            ConflictResolution::NewestWins => "newest-wins",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConflictResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(ConflictResolution::Manual),
            "local-wins" | "local_wins" => Ok(ConflictResolution::LocalWins),
            "remote-wins" | "remote_wins" => Ok(ConflictResolution::RemoteWins),
            "newest-wins" | "newest_wins" => Ok(ConflictResolution::NewestWins),
            other => Err(format!("Invalid conflict resolution strategy: {other}")),
        }
    }
}

/// Created when both sides mutated a task since its `lastSyncedAt`; removed
/// from the live conflict set on resolution. At most one exists per task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub task_id: i64,
    pub detected_at: DateTime<Utc>,
    pub local_snapshot: Task,
    pub remote_snapshot: Task,
    pub resolution: Option<ConflictResolution>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn new(task_id: i64, local_snapshot: Task, remote_snapshot: Task) -> Self {
        Self {
            task_id,
            detected_at: Utc::now(),
            local_snapshot,
            remote_snapshot,
            resolution: None,
            resolved_at: None,
        }
    }

    pub fn resolve(&mut self, resolution: ConflictResolution) {
        self.resolution = Some(resolution);
        self.resolved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_resolution_roundtrip() {
        for s in ["manual", "local-wins", "remote-wins", "newest-wins"] {
            let r: ConflictResolution = s.parse().unwrap();
            assert_eq!(r.to_string(), s);
        }
    }

    #[test]
    fn test_conflict_lifecycle() {
        let local = Task::new(5, "Local".to_string());
        let remote = Task::new(5, "Remote".to_string());
        let mut conflict = Conflict::new(5, local, remote);
        assert!(conflict.resolution.is_none());

        conflict.resolve(ConflictResolution::LocalWins);
        assert_eq!(conflict.resolution, Some(ConflictResolution::LocalWins));
        assert!(conflict.resolved_at.is_some());
    }
}
