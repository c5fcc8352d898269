//! Shared task store handle used by the API and CLI.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, LibSqlTaskRepository, TaskStore};
use crate::models::{NewTask, Task, TaskChanges, TaskId};
use crate::Result;

/// Thread-safe, clonable `TaskStore` over a single libSQL connection.
///
/// Each call takes the connection lock for its own duration only, so
/// batches from different requests interleave between store calls.
#[derive(Clone)]
pub struct TaskService {
    db: Arc<Mutex<Database>>,
}

impl TaskService {
    /// Open a task store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %db_path.display(), "Opening task store");
        let db = Database::open(&db_path).await?;
        Ok(Self::from_database(db))
    }

    /// Open an in-memory task store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db))
    }

    /// Wrap an already opened database.
    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }
}

impl TaskStore for TaskService {
    async fn find_by_client_id(&self, owner_id: &str, client_id: &str) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.find_by_client_id(owner_id, client_id).await
    }

    async fn find_by_id(&self, owner_id: &str, id: &TaskId) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.find_by_id(owner_id, id).await
    }

    async fn insert(&self, owner_id: &str, fields: NewTask) -> Result<Task> {
        let db = self.db.lock().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.insert(owner_id, fields).await
    }

    async fn mutate(&self, task: &Task, changes: &TaskChanges) -> Result<Task> {
        let db = self.db.lock().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.mutate(task, changes).await
    }

    async fn delete(&self, task: &Task) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.delete(task).await
    }

    async fn list(&self, owner_id: &str, limit: usize, offset: usize) -> Result<Vec<Task>> {
        let db = self.db.lock().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.list(owner_id, limit, offset).await
    }
}
