//! Optimistic-concurrency rules for task versions.
//!
//! A task starts at version 1 and every successful mutation increments it by
//! exactly one; the store enforces this with a conditional write. The engine
//! only decides whether a client's last-seen version is still acceptable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Comparison applied between the stored version and the client's
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionCheck {
    /// Conflict only when the server is ahead of the client
    #[default]
    Permissive,
    /// Conflict unless both versions are equal
    Strict,
}

impl VersionCheck {
    /// True when an update based on `client` must be rejected
    pub const fn is_stale(self, stored: i64, client: i64) -> bool {
        match self {
            Self::Permissive => stored > client,
            Self::Strict => stored != client,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permissive => "permissive",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for VersionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionCheck {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "strict" => Ok(Self::Strict),
            other => Err(Error::InvalidInput(format!(
                "version check must be `permissive` or `strict`, got `{other}`"
            ))),
        }
    }
}
