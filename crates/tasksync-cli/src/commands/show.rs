use std::path::Path;

use tasksync_core::db::TaskStore;
use tasksync_core::{Task, TaskId};

use crate::commands::common::{format_task_details, normalize_owner, open_store};
use crate::error::CliError;

pub async fn run_show(owner: &str, id: &str, db_path: &Path) -> Result<(), CliError> {
    let task = find_task(owner, id, db_path).await?;
    for line in format_task_details(&task) {
        println!("{line}");
    }
    Ok(())
}

pub async fn find_task(owner: &str, id: &str, db_path: &Path) -> Result<Task, CliError> {
    let owner = normalize_owner(owner)?;
    let id = id.trim();
    if id.is_empty() {
        return Err(CliError::EmptyTaskId);
    }
    let task_id = id
        .parse::<TaskId>()
        .map_err(|_| CliError::TaskNotFound(id.to_string()))?;

    let store = open_store(db_path).await?;
    store
        .find_by_id(&owner, &task_id)
        .await?
        .ok_or_else(|| CliError::TaskNotFound(id.to_string()))
}
