use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tasksync_core::sync::{MissingDeletePolicy, SyncPolicy, VersionCheck};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub auth_clock_skew: Duration,
    pub sync_max_operations: usize,
    pub sync_policy: SyncPolicy,
    pub rate_limit_window: Duration,
    pub sync_rate_limit_per_window: u32,
    pub tasks_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("sync_max_operations", &self.sync_max_operations)
            .field("sync_policy", &self.sync_policy)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "sync_rate_limit_per_window",
                &self.sync_rate_limit_per_window,
            )
            .field(
                "tasks_rate_limit_per_window",
                &self.tasks_rate_limit_per_window,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "TASKSYNC_API_BIND_ADDR", "127.0.0.1:8080");
        let db_path = PathBuf::from(value_or_default(
            &lookup,
            "TASKSYNC_DB_PATH",
            "tasksync.db",
        ));

        let jwt_secret = required_trimmed(&lookup, "TASKSYNC_JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid(
                "TASKSYNC_JWT_SECRET must be at least 32 bytes".to_string(),
            ));
        }
        let jwt_issuer = optional_trimmed(&lookup, "TASKSYNC_JWT_ISSUER");

        let auth_clock_skew_secs = bounded(&lookup, "TASKSYNC_JWT_LEEWAY_SECS", 60, 0..=300)?;
        let sync_max_operations =
            bounded(&lookup, "TASKSYNC_SYNC_MAX_OPERATIONS", 500, 1..=10_000)?;
        let rate_limit_window_secs =
            bounded(&lookup, "TASKSYNC_RATE_LIMIT_WINDOW_SECS", 60, 10..=3_600)?;
        let sync_rate_limit_per_window =
            bounded(&lookup, "TASKSYNC_SYNC_RATE_LIMIT_PER_WINDOW", 30, 1..=1_000)?;
        let tasks_rate_limit_per_window =
            bounded(&lookup, "TASKSYNC_TASKS_RATE_LIMIT_PER_WINDOW", 240, 1..=10_000)?;

        let version_check = value_or_default(&lookup, "TASKSYNC_VERSION_CHECK", "permissive")
            .parse::<VersionCheck>()
            .map_err(|error| {
                ConfigError::Invalid(format!("TASKSYNC_VERSION_CHECK: {error}"))
            })?;
        let missing_delete = value_or_default(&lookup, "TASKSYNC_MISSING_DELETE", "ignore")
            .parse::<MissingDeletePolicy>()
            .map_err(|error| {
                ConfigError::Invalid(format!("TASKSYNC_MISSING_DELETE: {error}"))
            })?;

        Ok(Self {
            bind_addr,
            db_path,
            jwt_secret,
            jwt_issuer,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            sync_max_operations,
            sync_policy: SyncPolicy {
                version_check,
                missing_delete,
            },
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            sync_rate_limit_per_window,
            tasks_rate_limit_per_window,
        })
    }
}

/// Integer variable with a default, rejected outside `range`
fn bounded<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display,
{
    let describe = || {
        format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        )
    };
    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(describe()))?,
        None => default,
    };
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(describe()));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef-secret";

    fn config_from(map: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_jwt_secret() {
        let map: HashMap<&str, &str> = HashMap::new();
        let err = config_from(&map).unwrap_err();
        assert!(err.to_string().contains("TASKSYNC_JWT_SECRET"));
    }

    #[test]
    fn config_rejects_short_secret() {
        let map = HashMap::from([("TASKSYNC_JWT_SECRET", "short")]);
        let err = config_from(&map).unwrap_err();
        assert!(err.to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn config_applies_defaults() {
        let map = HashMap::from([("TASKSYNC_JWT_SECRET", SECRET)]);
        let config = config_from(&map).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("tasksync.db"));
        assert_eq!(config.auth_clock_skew, Duration::from_secs(60));
        assert_eq!(config.sync_max_operations, 500);
        assert_eq!(config.sync_policy, SyncPolicy::default());
        assert_eq!(config.sync_rate_limit_per_window, 30);
        assert_eq!(config.jwt_issuer, None);
    }

    #[test]
    fn config_parses_sync_policy() {
        let map = HashMap::from([
            ("TASKSYNC_JWT_SECRET", SECRET),
            ("TASKSYNC_VERSION_CHECK", "strict"),
            ("TASKSYNC_MISSING_DELETE", "count_as_synced"),
        ]);
        let config = config_from(&map).unwrap();

        assert_eq!(config.sync_policy.version_check, VersionCheck::Strict);
        assert_eq!(
            config.sync_policy.missing_delete,
            MissingDeletePolicy::CountAsSynced
        );
    }

    #[test]
    fn config_rejects_out_of_range_values() {
        let map = HashMap::from([
            ("TASKSYNC_JWT_SECRET", SECRET),
            ("TASKSYNC_SYNC_MAX_OPERATIONS", "0"),
        ]);
        let err = config_from(&map).unwrap_err();
        assert!(err.to_string().contains("[1, 10000]"));

        let map = HashMap::from([
            ("TASKSYNC_JWT_SECRET", SECRET),
            ("TASKSYNC_RATE_LIMIT_WINDOW_SECS", "soon"),
        ]);
        assert!(config_from(&map).is_err());
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let map = HashMap::from([("TASKSYNC_JWT_SECRET", SECRET)]);
        let config = config_from(&map).unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains(SECRET));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
