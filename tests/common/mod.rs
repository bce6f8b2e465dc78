//! Common test utilities and helpers
#![allow(dead_code, unused_imports)]

pub mod git;
pub mod handlers;

pub use self::git::{create_upstreams, is_git_available, setup_git_repo};
pub use self::handlers::ScriptedHandler;

use fleet_sync::core::{DisplayMode, RetrySettings, SyncConfig};
use fleet_sync::commands::BulkSyncOptions;
use std::path::Path;

/// Default config with checkpoints kept under `state_dir`
pub fn isolated_config(state_dir: &Path) -> SyncConfig {
    SyncConfig {
        state_dir: Some(state_dir.to_path_buf()),
        ..SyncConfig::default()
    }
}

/// Config whose clone URLs point into a local directory of upstreams
pub fn local_config(upstream_dir: &Path, state_dir: &Path) -> SyncConfig {
    SyncConfig {
        clone_url_template: format!("{}/{{repo}}", upstream_dir.display()),
        git_timeout_secs: 60,
        retry: fast_retry(2),
        ..isolated_config(state_dir)
    }
}

/// Retry settings with millisecond backoff
pub fn fast_retry(max_retries: u32) -> RetrySettings {
    RetrySettings {
        max_retries,
        base_delay_ms: 5,
        max_delay_ms: 20,
    }
}

pub fn quiet_options(target: &Path, organization: &str) -> BulkSyncOptions {
    BulkSyncOptions::new(target, organization)
        .parallelism(2)
        .display(DisplayMode::Quiet)
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
