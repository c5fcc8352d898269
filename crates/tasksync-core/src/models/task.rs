//! Task model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A server-assigned task identifier, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// A task owned by a single user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier
    pub id: TaskId,
    /// Owning user; every lookup is scoped by this value
    pub owner_id: String,
    /// Client-generated idempotency key, unique per owner among live tasks
    pub client_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    /// Optimistic-concurrency token. Starts at 1, +1 per successful mutation.
    pub version: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft delete flag
    #[serde(skip_serializing)]
    #[serde(default)]
    pub is_deleted: bool,
}

impl Task {
    /// Build a fresh version-1 task for `owner_id` from creation fields
    #[must_use]
    pub fn new(owner_id: impl Into<String>, fields: NewTask) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: TaskId::new(),
            owner_id: owner_id.into(),
            client_id: fields.client_id,
            title: fields.title,
            description: fields.description,
            completed: fields.completed,
            version: 1,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }
}

/// Fields accepted when creating a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl NewTask {
    /// Creation fields with only a title set
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Attach an idempotency key
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Partial update: only `Some` fields are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl TaskChanges {
    /// True when no field would be written
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.completed.is_none()
    }

    /// Apply present fields onto `task`, leaving absent fields unchanged
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_unique() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        let parsed: TaskId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_task_new_starts_at_version_one() {
        let task = Task::new("user-1", NewTask::titled("Buy milk").with_client_id("c1"));
        assert_eq!(task.version, 1);
        assert_eq!(task.owner_id, "user-1");
        assert_eq!(task.client_id.as_deref(), Some("c1"));
        assert!(!task.completed);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_changes_apply_only_present_fields() {
        let mut task = Task::new("user-1", NewTask::titled("Buy milk"));
        task.description = Some("2 litres".to_string());

        let changes = TaskChanges {
            completed: Some(true),
            ..TaskChanges::default()
        };
        changes.apply_to(&mut task);

        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.description.as_deref(), Some("2 litres"));
        assert!(task.completed);
    }

    #[test]
    fn test_task_json_hides_tombstone_flag() {
        let task = Task::new("user-1", NewTask::titled("Buy milk"));
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("is_deleted").is_none());
        assert_eq!(json["version"], 1);
        assert_eq!(json["id"], task.id.as_str());
    }
}
