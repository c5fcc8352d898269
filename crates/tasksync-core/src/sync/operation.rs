//! Client sync operations: the loose wire form and its validated variants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::models::{NewTask, TaskChanges, TaskId};
use crate::util::normalize_text_option;

/// Operation as submitted by a client, before validation.
///
/// Kept verbatim so a rejected operation can be echoed back inside an
/// `error` conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub payload: OperationPayload,
}

/// Kind-specific fields; which ones are required depends on `type`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl OperationRequest {
    /// Build a create request
    pub fn create(client_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Create.as_str().to_string(),
            client_id: Some(client_id.into()),
            payload: OperationPayload {
                title: Some(title.into()),
                ..OperationPayload::default()
            },
        }
    }

    /// Build an update request addressed by server id
    pub fn update(id: &TaskId, version: i64, changes: TaskChanges) -> Self {
        Self {
            kind: OperationKind::Update.as_str().to_string(),
            client_id: None,
            payload: OperationPayload {
                id: Some(id.as_str()),
                title: changes.title,
                description: changes.description,
                completed: changes.completed,
                version: Some(version),
            },
        }
    }

    /// Build a delete request addressed by server id
    pub fn delete(id: &TaskId) -> Self {
        Self {
            kind: OperationKind::Delete.as_str().to_string(),
            client_id: None,
            payload: OperationPayload {
                id: Some(id.as_str()),
                ..OperationPayload::default()
            },
        }
    }
}

impl From<OperationRequest> for Value {
    fn from(request: OperationRequest) -> Self {
        let OperationPayload {
            id,
            title,
            description,
            completed,
            version,
        } = request.payload;
        let payload: Map<String, Value> = [
            ("id", id.map(Value::from)),
            ("title", title.map(Value::from)),
            ("description", description.map(Value::from)),
            ("completed", completed.map(Value::from)),
            ("version", version.map(Value::from)),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect();

        let mut object = Map::new();
        object.insert("type".to_string(), Value::from(request.kind));
        if let Some(client_id) = request.client_id {
            object.insert("client_id".to_string(), Value::from(client_id));
        }
        object.insert("payload".to_string(), Value::Object(payload));
        Value::Object(object)
    }
}

/// Operation kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "unknown operation type `{other}`"
            ))),
        }
    }
}

/// How an update or delete names its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    /// Server-assigned id
    Id(TaskId),
    /// Idempotency key of an earlier create, used when the client has not
    /// yet learned the server id
    ClientId(String),
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::ClientId(client_id) => write!(f, "client_id:{client_id}"),
        }
    }
}

/// A validated operation carrying only the fields its kind needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOperation {
    Create {
        client_id: String,
        fields: NewTask,
    },
    Update {
        target: TaskRef,
        version: i64,
        changes: TaskChanges,
    },
    Delete {
        target: TaskRef,
    },
}

impl SyncOperation {
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }
}

impl TryFrom<&OperationRequest> for SyncOperation {
    type Error = Error;

    fn try_from(request: &OperationRequest) -> Result<Self, Self::Error> {
        let payload = &request.payload;
        let client_id = normalize_text_option(request.client_id.clone());

        match request.kind.parse::<OperationKind>()? {
            OperationKind::Create => {
                let client_id = client_id.ok_or_else(|| {
                    Error::InvalidInput("create requires a client_id".to_string())
                })?;
                let title = normalize_text_option(payload.title.clone()).ok_or_else(|| {
                    Error::InvalidInput("create requires a non-empty title".to_string())
                })?;
                Ok(Self::Create {
                    fields: NewTask {
                        title,
                        description: payload.description.clone(),
                        completed: payload.completed.unwrap_or(false),
                        client_id: Some(client_id.clone()),
                    },
                    client_id,
                })
            }
            OperationKind::Update => {
                let target = target(payload, client_id, OperationKind::Update)?;
                let version = payload.version.ok_or_else(|| {
                    Error::InvalidInput("update requires the last known version".to_string())
                })?;
                if version < 1 {
                    return Err(Error::InvalidInput(format!(
                        "version must be positive, got {version}"
                    )));
                }
                if payload
                    .title
                    .as_deref()
                    .is_some_and(|title| title.trim().is_empty())
                {
                    return Err(Error::InvalidInput("title cannot be empty".to_string()));
                }
                Ok(Self::Update {
                    target,
                    version,
                    changes: TaskChanges {
                        title: payload.title.as_deref().map(|title| title.trim().to_string()),
                        description: payload.description.clone(),
                        completed: payload.completed,
                    },
                })
            }
            OperationKind::Delete => Ok(Self::Delete {
                target: target(payload, client_id, OperationKind::Delete)?,
            }),
        }
    }
}

/// Resolve the addressed task, preferring the server id
fn target(
    payload: &OperationPayload,
    client_id: Option<String>,
    kind: OperationKind,
) -> Result<TaskRef, Error> {
    if let Some(raw) = normalize_text_option(payload.id.clone()) {
        return raw
            .parse::<TaskId>()
            .map(TaskRef::Id)
            .map_err(|_| Error::InvalidInput(format!("`{raw}` is not a valid task id")));
    }
    client_id
        .map(TaskRef::ClientId)
        .ok_or_else(|| Error::InvalidInput(format!("{kind} requires payload.id or client_id")))
}
