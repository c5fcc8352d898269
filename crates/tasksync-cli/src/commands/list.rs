use std::path::Path;

use tasksync_core::db::TaskStore;

use crate::commands::common::{
    format_task_lines, normalize_owner, open_store, task_to_list_item, TaskListItem,
};
use crate::error::CliError;

pub async fn run_list(
    owner: &str,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let owner = normalize_owner(owner)?;
    let store = open_store(db_path).await?;
    let tasks = store.list(&owner, limit, 0).await?;

    if as_json {
        let json_items = tasks
            .iter()
            .map(task_to_list_item)
            .collect::<Vec<TaskListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if tasks.is_empty() {
        println!("No tasks.");
    } else {
        for line in format_task_lines(&tasks) {
            println!("{line}");
        }
    }

    Ok(())
}
