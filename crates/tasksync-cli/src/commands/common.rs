use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tasksync_core::services::TaskService;
use tasksync_core::sync::{Conflict, ServerUpdate, SyncResult};
use tasksync_core::Task;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub client_id: Option<String>,
    pub title: String,
    pub completed: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

// A batch file is either the bare operations array or the HTTP request body.
// Entries are left untyped; the engine validates each one separately.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchInput {
    Wrapped { operations: Vec<Value> },
    Bare(Vec<Value>),
}

pub fn parse_batch(raw: &str) -> Result<Vec<Value>, CliError> {
    if raw.trim().is_empty() {
        return Err(CliError::EmptyBatch);
    }

    let input = serde_json::from_str::<BatchInput>(raw).map_err(|_| {
        CliError::InvalidBatch(
            "expected a JSON array of operations or an object with an `operations` array"
                .to_string(),
        )
    })?;
    Ok(match input {
        BatchInput::Wrapped { operations } | BatchInput::Bare(operations) => operations,
    })
}

pub fn read_batch_input(file: Option<&Path>) -> Result<String, CliError> {
    match file {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                return Err(CliError::EmptyBatch);
            }
            let mut buffer = String::new();
            stdin.lock().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

pub fn normalize_owner(owner: &str) -> Result<String, CliError> {
    let trimmed = owner.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyOwner)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn task_to_list_item(task: &Task) -> TaskListItem {
    let now_ms = Utc::now().timestamp_millis();
    TaskListItem {
        id: task.id.to_string(),
        client_id: task.client_id.clone(),
        title: task.title.clone(),
        completed: task.completed,
        version: task.version,
        created_at: task.created_at,
        updated_at: task.updated_at,
        relative_time: format_relative_time(task.updated_at, now_ms),
    }
}

pub fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let id = task.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let mark = if task.completed { "[x]" } else { "[ ]" };
            let title = title_preview(&task.title, 40);
            let relative_time = format_relative_time(task.updated_at, now_ms);
            format!(
                "{short_id:<13}  {mark} {title:<40}  v{:<3} {relative_time}",
                task.version
            )
        })
        .collect()
}

pub fn format_task_details(task: &Task) -> Vec<String> {
    let mut lines = vec![
        format!("id:          {}", task.id),
        format!("title:       {}", task.title),
        format!("completed:   {}", task.completed),
        format!("version:     {}", task.version),
        format!("created:     {}", format_timestamp(task.created_at)),
        format!("updated:     {}", format_timestamp(task.updated_at)),
    ];
    if let Some(client_id) = task.client_id.as_deref() {
        lines.insert(1, format!("client_id:   {client_id}"));
    }
    if let Some(description) = task.description.as_deref() {
        lines.push(format!("description: {description}"));
    }
    lines
}

pub fn format_sync_summary(result: &SyncResult) -> Vec<String> {
    let mut lines = vec![format!(
        "synced={}  conflicts={}  server_updates={}",
        result.synced_count,
        result.conflicts.len(),
        result.server_updates.len()
    )];

    lines.extend(result.server_updates.iter().map(|update| match update {
        ServerUpdate::Create {
            client_id,
            server_id,
            ..
        } => format!("created   {client_id} -> {server_id}"),
        ServerUpdate::Update { task_id, task } => {
            format!("updated   {task_id} (v{})", task.version)
        }
        ServerUpdate::Delete { task_id } => format!("deleted   {task_id}"),
    }));

    lines.extend(result.conflicts.iter().map(|conflict| match conflict {
        Conflict::NotFound {
            task_id,
            client_id,
            message,
        } => {
            let target = task_id
                .map(|id| id.to_string())
                .or_else(|| client_id.clone())
                .unwrap_or_default();
            format!("conflict  not_found {target}: {message}")
        }
        Conflict::VersionConflict {
            task_id,
            client_version,
            server_version,
            ..
        } => format!(
            "conflict  version_conflict {task_id}: client=v{client_version} server=v{server_version}"
        ),
        Conflict::Error { operation, message } => {
            let kind = operation
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            format!("conflict  error ({kind}): {message}")
        }
    }));

    lines
}

pub fn title_preview(title: &str, max_chars: usize) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < year {
        format!("{}w ago", diff / week)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TASKSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasksync")
        .join("tasksync.db")
}

pub async fn open_store(path: &Path) -> Result<TaskService, CliError> {
    Ok(TaskService::open_path(path).await?)
}
