//! Batch reconciliation of offline client operations.

use serde::Deserialize;
use serde_json::Value;

use super::operation::{OperationRequest, SyncOperation, TaskRef};
use super::policy::{MissingDeletePolicy, SyncPolicy};
use super::result::{Conflict, ServerUpdate, SyncOutcome, SyncResult};
use crate::db::TaskStore;
use crate::error::{Error, Result};
use crate::models::{NewTask, Task, TaskChanges};
use crate::util::compact_text;

/// Applies ordered operation batches for one owner against a `TaskStore`.
///
/// Holds no state between calls beyond the injected store and policy.
#[derive(Clone)]
pub struct SyncEngine<S> {
    store: S,
    policy: SyncPolicy,
}

impl<S: TaskStore> SyncEngine<S> {
    /// Create an engine with the default policy
    pub fn new(store: S) -> Self {
        Self::with_policy(store, SyncPolicy::default())
    }

    pub const fn with_policy(store: S, policy: SyncPolicy) -> Self {
        Self { store, policy }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Process `operations` strictly in submission order.
    ///
    /// Each element is decoded on its own, so one malformed entry cannot
    /// sink the rest of the batch. Never fails: an operation that cannot be
    /// applied becomes an `error` conflict echoing it, and the batch moves on.
    pub async fn process<I>(&self, owner_id: &str, operations: I) -> SyncResult
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut result = SyncResult::default();
        let mut total = 0usize;
        let mut ignored = 0usize;

        for (index, raw) in operations.into_iter().map(Into::<Value>::into).enumerate() {
            total += 1;
            let outcome = match self.apply(owner_id, &raw).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(
                        index,
                        kind = raw.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
                        error = %error,
                        "Sync operation failed"
                    );
                    SyncOutcome::Conflict(Conflict::Error {
                        message: compact_text(&error.to_string()),
                        operation: raw,
                    })
                }
            };
            if let SyncOutcome::Conflict(conflict) = &outcome {
                tracing::debug!(index, conflict = conflict.kind(), "Sync operation conflicted");
            }
            if matches!(outcome, SyncOutcome::Ignored) {
                ignored += 1;
            }
            result.record(outcome);
        }

        tracing::info!(
            operations = total,
            synced = result.synced_count,
            conflicts = result.conflicts.len(),
            server_updates = result.server_updates.len(),
            ignored,
            "Processed sync batch"
        );
        result
    }

    async fn apply(&self, owner_id: &str, raw: &Value) -> Result<SyncOutcome> {
        let request = OperationRequest::deserialize(raw)
            .map_err(|error| Error::InvalidInput(format!("malformed operation: {error}")))?;

        match SyncOperation::try_from(&request)? {
            SyncOperation::Create { client_id, fields } => {
                self.apply_create(owner_id, client_id, fields).await
            }
            SyncOperation::Update {
                target,
                version,
                changes,
            } => self.apply_update(owner_id, &target, version, &changes).await,
            SyncOperation::Delete { target } => self.apply_delete(owner_id, &target).await,
        }
    }

    async fn apply_create(
        &self,
        owner_id: &str,
        client_id: String,
        fields: NewTask,
    ) -> Result<SyncOutcome> {
        if let Some(existing) = self.store.find_by_client_id(owner_id, &client_id).await? {
            tracing::debug!(task_id = %existing.id, "Create replayed, already synced");
            return Ok(SyncOutcome::Synced { key: client_id });
        }

        match self.store.insert(owner_id, fields).await {
            Ok(task) => Ok(SyncOutcome::Applied(ServerUpdate::Create {
                client_id,
                server_id: task.id,
                task,
            })),
            Err(error) => {
                // A concurrent batch may have claimed the key after our lookup
                if self
                    .store
                    .find_by_client_id(owner_id, &client_id)
                    .await?
                    .is_some()
                {
                    return Ok(SyncOutcome::Synced { key: client_id });
                }
                Err(error)
            }
        }
    }

    async fn apply_update(
        &self,
        owner_id: &str,
        target: &TaskRef,
        client_version: i64,
        changes: &TaskChanges,
    ) -> Result<SyncOutcome> {
        let Some(stored) = self.resolve(owner_id, target).await? else {
            return Ok(not_found(target));
        };

        if self
            .policy
            .version_check
            .is_stale(stored.version, client_version)
        {
            return Ok(version_conflict(client_version, stored));
        }

        match self.store.mutate(&stored, changes).await {
            Ok(task) => Ok(SyncOutcome::Applied(ServerUpdate::Update {
                task_id: task.id,
                task,
            })),
            Err(Error::StaleVersion { .. }) => {
                tracing::debug!(task_id = %stored.id, "Lost update race, reporting conflict");
                match self.store.find_by_id(owner_id, &stored.id).await? {
                    Some(current) => Ok(version_conflict(client_version, current)),
                    None => Ok(not_found(target)),
                }
            }
            Err(error) => Err(error),
        }
    }

    async fn apply_delete(&self, owner_id: &str, target: &TaskRef) -> Result<SyncOutcome> {
        // Foreign and nonexistent ids take the same path
        let Some(stored) = self.resolve(owner_id, target).await? else {
            return Ok(self.missing_delete(target));
        };

        match self.store.delete(&stored).await {
            Ok(()) => Ok(SyncOutcome::Applied(ServerUpdate::Delete {
                task_id: stored.id,
            })),
            Err(Error::NotFound(_)) => Ok(self.missing_delete(target)),
            Err(error) => Err(error),
        }
    }

    async fn resolve(&self, owner_id: &str, target: &TaskRef) -> Result<Option<Task>> {
        match target {
            TaskRef::Id(id) => self.store.find_by_id(owner_id, id).await,
            TaskRef::ClientId(client_id) => {
                self.store.find_by_client_id(owner_id, client_id).await
            }
        }
    }

    fn missing_delete(&self, target: &TaskRef) -> SyncOutcome {
        match self.policy.missing_delete {
            MissingDeletePolicy::Ignore => SyncOutcome::Ignored,
            MissingDeletePolicy::CountAsSynced => SyncOutcome::Synced {
                key: target.to_string(),
            },
        }
    }
}

fn not_found(target: &TaskRef) -> SyncOutcome {
    let (task_id, client_id) = match target {
        TaskRef::Id(id) => (Some(*id), None),
        TaskRef::ClientId(client_id) => (None, Some(client_id.clone())),
    };
    SyncOutcome::Conflict(Conflict::NotFound {
        task_id,
        client_id,
        message: "Task not found on server".to_string(),
    })
}

fn version_conflict(client_version: i64, server_task: Task) -> SyncOutcome {
    SyncOutcome::Conflict(Conflict::VersionConflict {
        task_id: server_task.id,
        client_version,
        server_version: server_task.version,
        server_task,
    })
}
