//! # fleet-sync
//!
//! `fleet-sync` clones and refreshes every repository of an organization
//! against a remote hosting API. It powers the `fleet-sync` CLI tool.
//!
//! ## Core Features
//!
//! - **Bounded Concurrency**: Separate worker groups for clone, update and config jobs.
//! - **Resumable Runs**: A checkpoint on disk records pending, completed and failed
//!   repositories so an interrupted run picks up where it stopped.
//! - **Rate-Limit Aware**: API calls wait out exhausted quota windows and retry
//!   transient failures with capped exponential backoff.
//! - **Progress Display**: Quiet, compact and detailed renderings of run progress.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleet_sync::commands::bulk::{BulkSync, BulkSyncOptions};
//! use fleet_sync::core::{cancel_pair, SyncConfig};
//! use fleet_sync::git::RepoExecutor;
//! use fleet_sync::remote::StaticLister;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::default();
//!     let (_handle, cancel) = cancel_pair();
//!     let lister = Arc::new(StaticLister::new(vec!["api".into(), "web".into()]));
//!     let executor = Arc::new(RepoExecutor::from_config(&config, "acme", None));
//!     let sync = BulkSync::new(config, lister, executor, cancel);
//!     sync.run_bulk_sync(BulkSyncOptions::new("./acme", "acme")).await?;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod core;
pub mod git;
pub mod pool;
pub mod remote;
pub mod state;
pub mod utils;
