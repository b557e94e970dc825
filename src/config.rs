//! Configuration management for Quarry.
//!
//! Handles loading configuration from TOML files and environment variables,
//! and deriving per-call configurations from overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::service::QueryTarget;

/// Prefix of the environment variables read by [`ClientConfig::apply_env`].
pub const ENV_PREFIX: &str = "QUARRY_";

/// Main configuration structure for Quarry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Where and how queries run.
    #[serde(default)]
    pub query: QueryConfig,

    /// Cache locations and policy.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Status polling intervals.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Query target and submission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Database used when SQL does not qualify table names.
    pub database: Option<String>,

    /// Workgroup queries run in.
    pub workgroup: Option<String>,

    /// Output location for query results.
    pub output_location: Option<String>,

    /// Normalize SQL whitespace before submission and fingerprinting.
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Cancel the remote execution when waiting is interrupted.
    #[serde(default = "default_true")]
    pub kill_on_interrupt: bool,
}

fn default_true() -> bool {
    true
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            database: None,
            workgroup: None,
            output_location: None,
            normalize: true,
            kill_on_interrupt: true,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch for both caches.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Look up previous executions before submitting.
    #[serde(default = "default_true")]
    pub read: bool,

    /// Record executions and results.
    #[serde(default = "default_true")]
    pub write: bool,

    /// Storage URI of the local cache. No local cache if unset.
    pub local: Option<String>,

    /// Storage URI of the remote cache. No remote cache if unset.
    pub remote: Option<String>,

    /// Serve failed and cancelled executions from the cache instead of
    /// running them again.
    #[serde(default)]
    pub reuse_failed: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read: true,
            write: true,
            local: None,
            remote: None,
            reuse_failed: false,
        }
    }
}

impl CacheConfig {
    /// Returns true if cached executions may be looked up.
    pub fn reads(&self) -> bool {
        self.enabled && self.read
    }

    /// Returns true if executions may be recorded.
    pub fn writes(&self) -> bool {
        self.enabled && self.write
    }
}

/// Polling intervals, in milliseconds.
///
/// Delays follow the Fibonacci sequence in units of `initial_delay_ms`,
/// capped at `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

const MIN_POLL_DELAY_MS: u64 = 1;

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl PollingConfig {
    /// Creates polling settings with the given delays.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay_ms: initial_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    /// Delay before the second status request.
    ///
    /// Never shorter than one millisecond, so the backoff always grows.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms.max(MIN_POLL_DELAY_MS))
    }

    /// Upper bound of the delay between status requests.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(MIN_POLL_DELAY_MS))
            .max(self.initial_delay())
    }

    /// Rejects delays that would poll without backing off.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(QuarryError::config(
                "polling.initial_delay_ms must be greater than 0",
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(QuarryError::config(format!(
                "polling.max_delay_ms ({}) must not be less than polling.initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        Ok(())
    }
}

/// Per-call changes to a [`ClientConfig`].
///
/// Unset fields keep the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub database: Option<String>,
    pub workgroup: Option<String>,
    pub output_location: Option<String>,
    pub normalize: Option<bool>,
    pub kill_on_interrupt: Option<bool>,
    pub cache_enabled: Option<bool>,
    pub cache_read: Option<bool>,
    pub cache_write: Option<bool>,
    pub reuse_failed: Option<bool>,
}

impl ConfigOverrides {
    /// Creates empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn workgroup(mut self, workgroup: impl Into<String>) -> Self {
        self.workgroup = Some(workgroup.into());
        self
    }

    pub fn output_location(mut self, output_location: impl Into<String>) -> Self {
        self.output_location = Some(output_location.into());
        self
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = Some(normalize);
        self
    }

    pub fn kill_on_interrupt(mut self, kill_on_interrupt: bool) -> Self {
        self.kill_on_interrupt = Some(kill_on_interrupt);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    pub fn cache_read(mut self, read: bool) -> Self {
        self.cache_read = Some(read);
        self
    }

    pub fn cache_write(mut self, write: bool) -> Self {
        self.cache_write = Some(write);
        self
    }

    pub fn reuse_failed(mut self, reuse_failed: bool) -> Self {
        self.reuse_failed = Some(reuse_failed);
        self
    }
}

impl ClientConfig {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quarry")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file, then applies the environment.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| QuarryError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            QuarryError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.polling.validate()?;
        Ok(config)
    }

    /// Applies `QUARRY_*` variables, which take precedence over the file.
    ///
    /// `lookup` returns the value of a variable, if set.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let flag = |name: &str| -> Result<Option<bool>> {
            var(name)
                .map(|value| parse_bool(&format!("{ENV_PREFIX}{name}"), &value))
                .transpose()
        };

        if let Some(database) = var("DATABASE") {
            self.query.database = Some(database);
        }
        if let Some(workgroup) = var("WORKGROUP") {
            self.query.workgroup = Some(workgroup);
        }
        if let Some(output_location) = var("OUTPUT_LOCATION") {
            self.query.output_location = Some(output_location);
        }
        if let Some(normalize) = flag("NORMALIZE")? {
            self.query.normalize = normalize;
        }
        if let Some(kill) = flag("KILL_ON_INTERRUPT")? {
            self.query.kill_on_interrupt = kill;
        }
        if let Some(local) = var("CACHE_LOCAL") {
            self.cache.local = Some(local);
        }
        if let Some(remote) = var("CACHE_REMOTE") {
            self.cache.remote = Some(remote);
        }
        if let Some(reuse_failed) = flag("CACHE_REUSE_FAILED")? {
            self.cache.reuse_failed = reuse_failed;
        }
        Ok(())
    }

    /// Returns a copy with the overrides applied. `self` is left unchanged.
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Self {
        let mut config = self.clone();
        if let Some(database) = &overrides.database {
            config.query.database = Some(database.clone());
        }
        if let Some(workgroup) = &overrides.workgroup {
            config.query.workgroup = Some(workgroup.clone());
        }
        if let Some(output_location) = &overrides.output_location {
            config.query.output_location = Some(output_location.clone());
        }
        if let Some(normalize) = overrides.normalize {
            config.query.normalize = normalize;
        }
        if let Some(kill) = overrides.kill_on_interrupt {
            config.query.kill_on_interrupt = kill;
        }
        if let Some(enabled) = overrides.cache_enabled {
            config.cache.enabled = enabled;
        }
        if let Some(read) = overrides.cache_read {
            config.cache.read = read;
        }
        if let Some(write) = overrides.cache_write {
            config.cache.write = write;
        }
        if let Some(reuse_failed) = overrides.reuse_failed {
            config.cache.reuse_failed = reuse_failed;
        }
        config
    }

    /// Returns the target queries are submitted to.
    pub fn target(&self) -> QueryTarget {
        QueryTarget {
            database: self.query.database.clone(),
            workgroup: self.query.workgroup.clone(),
            output_location: self.query.output_location.clone(),
        }
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| QuarryError::config(format!("Failed to serialize config: {e}")))
    }
}

/// Parses a boolean environment value.
fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(QuarryError::config(format!(
            "Invalid boolean value for {name}: '{value}'"
        ))),
    }
}
