//! Per-operation outcomes and the batch result they accumulate into.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Task, TaskId};

/// Authoritative post-mutation state the client should merge in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerUpdate {
    /// Maps the client's idempotency key to the server id it was assigned
    Create {
        client_id: String,
        server_id: TaskId,
        task: Task,
    },
    Update {
        task_id: TaskId,
        task: Task,
    },
    Delete {
        task_id: TaskId,
    },
}

/// Batch-local, non-fatal outcome the client has to reconcile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Conflict {
    /// Target does not exist or belongs to another owner
    NotFound {
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<TaskId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        message: String,
    },
    /// Server moved past the version the client based its update on
    VersionConflict {
        task_id: TaskId,
        client_version: i64,
        server_version: i64,
        server_task: Task,
    },
    /// The operation could not be processed at all; echoes it as submitted
    Error {
        operation: Value,
        message: String,
    },
}

impl Conflict {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Error { .. } => "error",
        }
    }
}

/// What applying one operation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Already reflected on the server; counted, nothing to push back
    Synced { key: String },
    /// Applied; counted and pushed back to the client
    Applied(ServerUpdate),
    /// Not applied; reported to the client
    Conflict(Conflict),
    /// Dropped without being counted or reported
    Ignored,
}

/// Three-bucket response returned for every batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Always true: per-operation failures are conflicts, not request errors
    pub success: bool,
    pub synced_count: usize,
    pub conflicts: Vec<Conflict>,
    pub server_updates: Vec<ServerUpdate>,
}

impl Default for SyncResult {
    fn default() -> Self {
        Self {
            success: true,
            synced_count: 0,
            conflicts: Vec::new(),
            server_updates: Vec::new(),
        }
    }
}

impl SyncResult {
    /// Append one outcome, preserving submission order
    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Synced { .. } => self.synced_count += 1,
            SyncOutcome::Applied(update) => {
                self.synced_count += 1;
                self.server_updates.push(update);
            }
            SyncOutcome::Conflict(conflict) => self.conflicts.push(conflict),
            SyncOutcome::Ignored => {}
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTask;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_fills_buckets_in_order() {
        let task = Task::new("alice", NewTask::titled("Buy milk"));
        let mut result = SyncResult::default();

        result.record(SyncOutcome::Synced {
            key: "c0".to_string(),
        });
        result.record(SyncOutcome::Applied(ServerUpdate::Delete { task_id: task.id }));
        result.record(SyncOutcome::Ignored);
        result.record(SyncOutcome::Conflict(Conflict::NotFound {
            task_id: Some(task.id),
            client_id: None,
            message: "first".to_string(),
        }));
        result.record(SyncOutcome::Conflict(Conflict::NotFound {
            task_id: None,
            client_id: Some("c2".to_string()),
            message: "second".to_string(),
        }));

        assert!(result.success);
        assert_eq!(result.synced_count, 2);
        assert_eq!(result.server_updates.len(), 1);
        let messages: Vec<_> = result
            .conflicts
            .iter()
            .map(|conflict| match conflict {
                Conflict::NotFound { message, .. } => message.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn serializes_tagged_entries() {
        let task = Task::new("alice", NewTask::titled("Buy milk").with_client_id("c1"));
        let mut result = SyncResult::default();
        result.record(SyncOutcome::Applied(ServerUpdate::Create {
            client_id: "c1".to_string(),
            server_id: task.id,
            task: task.clone(),
        }));
        result.record(SyncOutcome::Conflict(Conflict::VersionConflict {
            task_id: task.id,
            client_version: 1,
            server_version: 2,
            server_task: task.clone(),
        }));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["synced_count"], 1);
        assert_eq!(json["server_updates"][0]["type"], "create");
        assert_eq!(json["server_updates"][0]["server_id"], task.id.as_str());
        assert_eq!(json["conflicts"][0]["type"], "version_conflict");
        assert_eq!(json["conflicts"][0]["server_version"], 2);

        let parsed: SyncResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, result);
    }
}
