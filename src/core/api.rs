//! Public API for the core module.
//!
//! This module provides the stable public API for core functionality including:
//! - Configuration loading
//! - Error classification and remediation
//! - Cancellation
//! - Progress tracking and run summaries
//!
//! Internal implementation details are not exposed through this API.

// Configuration
pub use super::config::{get_parallelism, RetrySettings, SyncConfig, GIT_CONCURRENT_CAP};

// Errors
pub use super::errors::{remediation, ErrorClass, SyncError};

// Cancellation
pub use super::shutdown::{cancel_on_ctrl_c, cancel_pair, CancelHandle, CancelSignal};

// Progress and reporting
pub use super::stats::{failure_report, next_steps, RunSummary};
pub use super::sync::{DisplayMode, ProgressEntry, ProgressStatus, ProgressTracker};
