//! Configuration constants and settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// Concurrency Configuration
//
// Clones transfer whole histories, so they get the base parallelism. Updates
// (pull/fetch/reset) are cheaper and get half again as many slots. Config jobs
// hit the API rather than git and get half the base.

// Default concurrency cap to stay under the hosting API's concurrent request limits
pub const GIT_CONCURRENT_CAP: usize = 12;

/// Determines the base parallelism for a bulk run
///
/// Priority order:
/// 1. explicit value (from `--parallel` or the config file) → N
/// 2. Smart default → min(CPU_CORES + 2, 12)
pub fn get_parallelism(explicit: Option<usize>) -> usize {
    if let Some(n) = explicit {
        return n.max(1);
    }

    let cpu_count = num_cpus::get();
    (cpu_count + 2).min(GIT_CONCURRENT_CAP)
}

/// Capacity of the update group (pull/fetch/reset) for a base parallelism
pub fn update_capacity(parallelism: usize) -> usize {
    (parallelism + parallelism / 2).max(1)
}

/// Capacity of the config group for a base parallelism
pub fn config_capacity(parallelism: usize) -> usize {
    (parallelism / 2).max(1)
}

// Remote API defaults
pub const DEFAULT_PROVIDER: &str = "github";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_CLONE_URL_TEMPLATE: &str = "https://github.com/{org}/{repo}.git";
pub const USER_AGENT: &str = concat!("fleet-sync/", env!("CARGO_PKG_VERSION"));
pub const LIST_PAGE_SIZE: usize = 100;
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// Retry defaults
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

// Worker pool defaults
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

// Orchestrator loop timers
pub const RENDER_INTERVAL_MS: u64 = 500;
pub const CHECKPOINT_INTERVAL_SECS: u64 = 30;

// Git subprocess timeout, per operation
pub const GIT_OPERATION_TIMEOUT_SECS: u64 = 600;

// Checkpoint location: `<data dir>/fleet-sync/state`, or `./.fleet-sync/state`
// on platforms without a data directory
pub const APP_DIR_NAME: &str = "fleet-sync";
pub const STATE_DIR_NAME: &str = ".fleet-sync";

// Display formatting constants
pub const PATH_DISPLAY_WIDTH: usize = 30;
pub const NAME_DISPLAY_WIDTH: usize = 20;
pub const ERROR_MESSAGE_MAX_LENGTH: usize = 60;
pub const DETAILED_FAILURE_LIMIT: usize = 10;

/// Retry settings (optional `[retry]` section in config.toml)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt before a request gives up
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Settings loaded from `~/.config/fleet-sync/config.toml`
///
/// Every field has a default so a missing or partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub provider: String,
    pub api_url: String,
    /// Clone URL with `{org}` and `{repo}` placeholders
    pub clone_url_template: String,
    /// Resolve clone URLs through the API instead of the template
    pub resolve_clone_url: bool,
    /// Checkpoint directory; defaults to `<data dir>/fleet-sync/state`
    pub state_dir: Option<PathBuf>,
    pub parallelism: Option<usize>,
    pub retry: RetrySettings,
    pub queue_capacity: usize,
    pub render_interval_ms: u64,
    pub checkpoint_interval_secs: u64,
    pub git_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            clone_url_template: DEFAULT_CLONE_URL_TEMPLATE.to_string(),
            resolve_clone_url: false,
            state_dir: None,
            parallelism: None,
            retry: RetrySettings::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            render_interval_ms: RENDER_INTERVAL_MS,
            checkpoint_interval_secs: CHECKPOINT_INTERVAL_SECS,
            git_timeout_secs: GIT_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fleet-sync").join("config.toml"))
    }

    /// Loads the config from `path`; a missing file yields the defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("read config: {}", path.display()));
            }
        };
        toml::from_str(&text).with_context(|| format!("parse config: {}", path.display()))
    }

    /// Loads the config from the default location, if there is one
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Checkpoint directory; independent of the target path
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        match dirs::data_local_dir() {
            Some(dir) => dir.join(APP_DIR_NAME).join("state"),
            None => PathBuf::from(STATE_DIR_NAME).join("state"),
        }
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms.max(10))
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs.max(1))
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs.max(1))
    }
}
