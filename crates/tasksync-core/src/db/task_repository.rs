//! Task repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{NewTask, Task, TaskChanges, TaskId};
use libsql::{params_from_iter, Connection, Value};

const TASK_COLUMNS: &str =
    "id, owner_id, client_id, title, description, completed, version, created_at, updated_at, is_deleted";

/// Ownership-scoped task storage.
///
/// Every lookup takes the owner; a task belonging to someone else is
/// indistinguishable from a missing one. Soft-deleted tasks are never returned.
#[allow(async_fn_in_trait)]
pub trait TaskStore {
    /// Find a live task by its client idempotency key
    async fn find_by_client_id(&self, owner_id: &str, client_id: &str) -> Result<Option<Task>>;

    /// Find a live task by server id
    async fn find_by_id(&self, owner_id: &str, id: &TaskId) -> Result<Option<Task>>;

    /// Insert a new task at version 1
    async fn insert(&self, owner_id: &str, fields: NewTask) -> Result<Task>;

    /// Apply `changes` to `task` and bump its version by one.
    ///
    /// The write only lands if the stored row is still at `task.version`;
    /// otherwise `Error::StaleVersion` is returned and nothing changes.
    async fn mutate(&self, task: &Task, changes: &TaskChanges) -> Result<Task>;

    /// Soft delete a task
    async fn delete(&self, task: &Task) -> Result<()>;

    /// List live tasks for an owner, newest first
    async fn list(&self, owner_id: &str, limit: usize, offset: usize) -> Result<Vec<Task>>;
}

/// libSQL implementation of `TaskStore`
pub struct LibSqlTaskRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTaskRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_one(&self, sql: &str, params: Vec<Value>) -> Result<Option<Task>> {
        let mut rows = self.conn.query(sql, params_from_iter(params)).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_task(&row)?)),
            None => Ok(None),
        }
    }

    /// Parse a task from a database row
    fn parse_task(row: &libsql::Row) -> Result<Task> {
        let id: String = row.get(0)?;
        Ok(Task {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid task id in storage: {id}")))?,
            owner_id: row.get(1)?,
            client_id: optional_text(row.get_value(2)?),
            title: row.get(3)?,
            description: optional_text(row.get_value(4)?),
            completed: row.get::<i32>(5)? != 0,
            version: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            is_deleted: row.get::<i32>(9)? != 0,
        })
    }
}

impl TaskStore for LibSqlTaskRepository<'_> {
    async fn find_by_client_id(&self, owner_id: &str, client_id: &str) -> Result<Option<Task>> {
        self.query_one(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE owner_id = ? AND client_id = ? AND is_deleted = 0"
            ),
            vec![text(owner_id), text(client_id)],
        )
        .await
    }

    async fn find_by_id(&self, owner_id: &str, id: &TaskId) -> Result<Option<Task>> {
        self.query_one(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE id = ? AND owner_id = ? AND is_deleted = 0"
            ),
            vec![Value::Text(id.as_str()), text(owner_id)],
        )
        .await
    }

    async fn insert(&self, owner_id: &str, fields: NewTask) -> Result<Task> {
        let task = Task::new(owner_id, fields);

        self.conn
            .execute(
                &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
                params_from_iter(vec![
                    Value::Text(task.id.as_str()),
                    text(&task.owner_id),
                    optional_value(task.client_id.as_deref()),
                    text(&task.title),
                    optional_value(task.description.as_deref()),
                    flag(task.completed),
                    Value::Integer(task.version),
                    Value::Integer(task.created_at),
                    Value::Integer(task.updated_at),
                    flag(task.is_deleted),
                ]),
            )
            .await?;

        Ok(task)
    }

    async fn mutate(&self, task: &Task, changes: &TaskChanges) -> Result<Task> {
        let mut next = task.clone();
        changes.apply_to(&mut next);
        next.version = task.version + 1;
        next.updated_at = chrono::Utc::now()
            .timestamp_millis()
            .max(task.updated_at);

        let rows = self
            .conn
            .execute(
                "UPDATE tasks
                 SET title = ?, description = ?, completed = ?, version = ?, updated_at = ?
                 WHERE id = ? AND owner_id = ? AND version = ? AND is_deleted = 0",
                params_from_iter(vec![
                    text(&next.title),
                    optional_value(next.description.as_deref()),
                    flag(next.completed),
                    Value::Integer(next.version),
                    Value::Integer(next.updated_at),
                    Value::Text(task.id.as_str()),
                    text(&task.owner_id),
                    Value::Integer(task.version),
                ]),
            )
            .await?;

        if rows == 0 {
            return Err(Error::StaleVersion {
                task_id: task.id.to_string(),
                expected: task.version,
            });
        }

        Ok(next)
    }

    async fn delete(&self, task: &Task) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE tasks SET is_deleted = 1, updated_at = ?
                 WHERE id = ? AND owner_id = ? AND is_deleted = 0",
                params_from_iter(vec![
                    Value::Integer(now),
                    Value::Text(task.id.as_str()),
                    text(&task.owner_id),
                ]),
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(task.id.to_string()));
        }

        Ok(())
    }

    async fn list(&self, owner_id: &str, limit: usize, offset: usize) -> Result<Vec<Task>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks
                     WHERE owner_id = ? AND is_deleted = 0
                     ORDER BY created_at DESC, id DESC
                     LIMIT ? OFFSET ?"
                ),
                params_from_iter(vec![
                    text(owner_id),
                    Value::Integer(limit as i64),
                    Value::Integer(offset as i64),
                ]),
            )
            .await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(Self::parse_task(&row)?);
        }
        Ok(tasks)
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn optional_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

fn optional_text(value: Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_find() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());

        let task = repo
            .insert(
                "alice",
                NewTask {
                    title: "Buy milk".to_string(),
                    description: Some("2 litres".to_string()),
                    completed: false,
                    client_id: Some("c1".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(task.version, 1);

        let by_id = repo.find_by_id("alice", &task.id).await.unwrap().unwrap();
        assert_eq!(by_id, task);

        let by_client = repo
            .find_by_client_id("alice", "c1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_client.id, task.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lookups_are_owner_scoped() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());

        let task = repo
            .insert("alice", NewTask::titled("Private").with_client_id("c1"))
            .await
            .unwrap();

        assert!(repo.find_by_id("bob", &task.id).await.unwrap().is_none());
        assert!(repo.find_by_client_id("bob", "c1").await.unwrap().is_none());

        // Bob may reuse the same idempotency key
        let bobs = repo
            .insert("bob", NewTask::titled("Mine").with_client_id("c1"))
            .await
            .unwrap();
        assert_ne!(bobs.id, task.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mutate_applies_partial_changes_and_bumps_version() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());

        let mut fields = NewTask::titled("Buy milk");
        fields.description = Some("2 litres".to_string());
        let task = repo.insert("alice", fields).await.unwrap();

        let changes = TaskChanges {
            completed: Some(true),
            ..TaskChanges::default()
        };
        let updated = repo.mutate(&task, &changes).await.unwrap();

        assert_eq!(updated.version, 2);
        assert!(updated.completed);
        assert_eq!(updated.title, "Buy milk");
        assert_eq!(updated.description.as_deref(), Some("2 litres"));
        assert!(updated.updated_at >= task.updated_at);
        assert_eq!(updated.created_at, task.created_at);

        let stored = repo.find_by_id("alice", &task.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mutate_rejects_stale_read() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());

        let task = repo
            .insert("alice", NewTask::titled("Buy milk"))
            .await
            .unwrap();
        let changes = TaskChanges {
            title: Some("Buy oat milk".to_string()),
            ..TaskChanges::default()
        };
        repo.mutate(&task, &changes).await.unwrap();

        // Second writer still holds the version-1 snapshot
        let err = repo.mutate(&task, &changes).await.unwrap_err();
        assert!(matches!(err, Error::StaleVersion { expected: 1, .. }));

        let stored = repo.find_by_id("alice", &task.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_hides_task_and_releases_client_id() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());

        let task = repo
            .insert("alice", NewTask::titled("Old").with_client_id("c1"))
            .await
            .unwrap();
        repo.delete(&task).await.unwrap();

        assert!(repo.find_by_id("alice", &task.id).await.unwrap().is_none());
        assert!(repo.find_by_client_id("alice", "c1").await.unwrap().is_none());
        assert!(matches!(
            repo.delete(&task).await.unwrap_err(),
            Error::NotFound(_)
        ));

        repo.insert("alice", NewTask::titled("New").with_client_id("c1"))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_newest_first_with_paging() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());

        for title in ["one", "two", "three"] {
            repo.insert("alice", NewTask::titled(title)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        repo.insert("bob", NewTask::titled("other")).await.unwrap();

        let page = repo.list("alice", 2, 0).await.unwrap();
        let titles: Vec<_> = page.iter().map(|task| task.title.as_str()).collect();
        assert_eq!(titles, vec!["three", "two"]);

        let rest = repo.list("alice", 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].title, "one");
    }
}
