use std::path::Path;

use tasksync_core::sync::{MissingDeletePolicy, SyncEngine, SyncPolicy, SyncResult, VersionCheck};

use crate::commands::common::{
    format_sync_summary, normalize_owner, open_store, parse_batch, read_batch_input,
};
use crate::error::CliError;

pub fn policy_from_flags(strict: bool, count_missing_deletes: bool) -> SyncPolicy {
    SyncPolicy {
        version_check: if strict {
            VersionCheck::Strict
        } else {
            VersionCheck::Permissive
        },
        missing_delete: if count_missing_deletes {
            MissingDeletePolicy::CountAsSynced
        } else {
            MissingDeletePolicy::Ignore
        },
    }
}

pub async fn run_sync(
    owner: &str,
    file: Option<&Path>,
    policy: SyncPolicy,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let raw = read_batch_input(file)?;
    let result = apply_batch(owner, &raw, policy, db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_sync_summary(&result) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn apply_batch(
    owner: &str,
    raw: &str,
    policy: SyncPolicy,
    db_path: &Path,
) -> Result<SyncResult, CliError> {
    let owner = normalize_owner(owner)?;
    let operations = parse_batch(raw)?;

    let store = open_store(db_path).await?;
    let engine = SyncEngine::with_policy(store, policy);
    Ok(engine.process(&owner, operations).await)
}
