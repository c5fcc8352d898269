//! Engine policy knobs

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::versioning::VersionCheck;
use crate::error::Error;

/// What a DELETE for a task that is already gone (or never existed) reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDeletePolicy {
    /// Neither counted as synced nor reported as a conflict
    #[default]
    Ignore,
    /// Counted as synced, like a replayed create
    CountAsSynced,
}

impl FromStr for MissingDeletePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "count_as_synced" | "synced" => Ok(Self::CountAsSynced),
            other => Err(Error::InvalidInput(format!(
                "missing delete policy must be `ignore` or `count_as_synced`, got `{other}`"
            ))),
        }
    }
}

/// Behaviour switches for `SyncEngine`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub version_check: VersionCheck,
    pub missing_delete: MissingDeletePolicy,
}
