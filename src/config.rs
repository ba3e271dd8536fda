//! Cache configuration: per-command TTLs, mutation invalidation rules and retry policy.
//!
//! Both tables are plain data. The built-in defaults live in [`DEFAULT_TTLS`]
//! and [`DEFAULT_INVALIDATIONS`]; a YAML (or JSON) file can replace them.
//!
//! ```yaml
//! default_ttl_ms: 30000
//! ttl:
//!   get_status: 5000
//!   get_settings: 300000
//! invalidation:
//!   update_settings: [get_settings, get_status]
//! retry:
//!   max_retries: 3
//!   initial_delay_ms: 1000
//!   max_delay_ms: 10000
//!   backoff_factor: 2.0
//! ```

use crate::resilience::retry::RetryConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Environment variable naming a config file for [`CommandCacheConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "COMMAND_CACHE_CONFIG";

/// TTL used for commands absent from the TTL table.
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Freshness per read command, in milliseconds.
pub const DEFAULT_TTLS: &[(&str, u64)] = &[
    ("get_status", 5_000),
    ("get_items", 30_000),
    ("get_item", 30_000),
    ("search_items", 15_000),
    ("get_stats", 60_000),
    ("get_settings", 300_000),
    ("get_profile", 300_000),
];

/// Read commands evicted after each mutation succeeds.
pub const DEFAULT_INVALIDATIONS: &[(&str, &[&str])] = &[
    ("create_item", &["get_items", "search_items", "get_stats"]),
    ("update_item", &["get_items", "get_item", "search_items", "get_stats"]),
    ("delete_item", &["get_items", "get_item", "search_items", "get_stats"]),
    ("import_items", &["get_items", "get_item", "search_items", "get_stats"]),
    ("update_settings", &["get_settings", "get_status"]),
    ("update_profile", &["get_profile"]),
    ("logout", &["get_profile", "get_settings", "get_status"]),
];

/// Command name -> TTL in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TtlTable(BTreeMap<String, u64>);

impl TtlTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_static(entries: &[(&str, u64)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(cmd, ms)| (cmd.to_string(), *ms))
                .collect(),
        )
    }

    pub fn with(mut self, command: impl Into<String>, ttl_ms: u64) -> Self {
        self.0.insert(command.into(), ttl_ms);
        self
    }

    pub fn get(&self, command: &str) -> Option<Duration> {
        self.0.get(command).map(|ms| Duration::from_millis(*ms))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Mutation command -> read commands whose cached entries it invalidates.
///
/// Invalidation is coarse: every argument variant of a listed read command is
/// evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidationMap(BTreeMap<String, Vec<String>>);

impl InvalidationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_static(entries: &[(&str, &[&str])]) -> Self {
        Self(
            entries
                .iter()
                .map(|(mutation, reads)| {
                    (
                        mutation.to_string(),
                        reads.iter().map(|r| r.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }

    pub fn with<I, S>(mut self, mutation: impl Into<String>, reads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(mutation.into(), reads.into_iter().map(Into::into).collect());
        self
    }

    /// Read commands affected by `mutation`; empty for unknown mutations.
    pub fn dependents(&self, mutation: &str) -> &[String] {
        self.0.get(mutation).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_mutation(&self, command: &str) -> bool {
        self.0.contains_key(command)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandCacheConfig {
    pub default_ttl_ms: u64,
    pub ttl: TtlTable,
    pub invalidation: InvalidationMap,
    /// Retry policy wrapped around backend calls; `None` disables retries.
    pub retry: Option<RetryConfig>,
}

impl Default for CommandCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            ttl: TtlTable::from_static(DEFAULT_TTLS),
            invalidation: InvalidationMap::from_static(DEFAULT_INVALIDATIONS),
            retry: Some(RetryConfig::default()),
        }
    }
}

impl CommandCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No TTL overrides, no invalidation rules, no retries.
    pub fn empty() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            ttl: TtlTable::new(),
            invalidation: InvalidationMap::new(),
            retry: None,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = crate::utils::millis(ttl);
        self
    }

    pub fn with_ttl_table(mut self, ttl: TtlTable) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_invalidation(mut self, invalidation: InvalidationMap) -> Self {
        self.invalidation = invalidation;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// TTL for `command`, falling back to the default TTL.
    pub fn ttl_for(&self, command: &str) -> Duration {
        self.ttl.get(command).unwrap_or_else(|| self.default_ttl())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ref retry) = self.retry {
            retry.validate()?;
        }
        for (mutation, reads) in self.invalidation.iter() {
            if reads.iter().any(|r| r == mutation) {
                return Err(Error::configuration_with_context(
                    format!("mutation '{}' lists itself as a dependent read", mutation),
                    ErrorContext::new()
                        .with_field_path(format!("invalidation.{}", mutation))
                        .with_source("config_validator"),
                ));
            }
        }
        Ok(())
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext == "json")
            .unwrap_or(false);
        let config: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate().map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: context.with_details(format!("file: {}", path.display())),
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Loads the file named by `COMMAND_CACHE_CONFIG`, or the defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(path.trim()),
            Ok(_) => {
                warn!(var = CONFIG_ENV_VAR, "config variable is empty, using defaults");
                Ok(Self::default())
            }
            Err(_) => Ok(Self::default()),
        }
    }
}
