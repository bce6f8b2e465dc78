//! Error classification, remediation hints and run-level errors
//!
//! Failures are classified into an [`ErrorClass`] where they happen (HTTP
//! status, io error kind, git diagnostics). Remediation text is derived from
//! the class alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pool::PoolError;
use crate::remote::ApiError;
use crate::state::StateError;

/// Broad category of a failure, used to pick a remediation hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Target directory exists but is not a usable repository
    DirectoryExists,
    /// Credentials missing, expired or lacking scope
    Authentication,
    /// Repository missing upstream or not visible to the token
    NotFound,
    /// Network or subprocess timed out
    Timeout,
    /// Local clone has a broken or missing remote
    RemoteMisconfigured,
    /// Filesystem permissions prevented the operation
    PermissionDenied,
    /// Run was cancelled while the job was in flight
    Cancelled,
    #[default]
    Other,
}

impl ErrorClass {
    /// Classifies a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorClass::Authentication,
            404 | 410 => ErrorClass::NotFound,
            408 | 504 => ErrorClass::Timeout,
            _ => ErrorClass::Other,
        }
    }

    /// Classifies a filesystem error
    pub fn from_io(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::PermissionDenied => ErrorClass::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => ErrorClass::DirectoryExists,
            std::io::ErrorKind::NotFound => ErrorClass::NotFound,
            std::io::ErrorKind::TimedOut => ErrorClass::Timeout,
            _ => ErrorClass::Other,
        }
    }

    /// Short label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClass::DirectoryExists => "directory exists",
            ErrorClass::Authentication => "authentication failed",
            ErrorClass::NotFound => "not found",
            ErrorClass::Timeout => "timeout",
            ErrorClass::RemoteMisconfigured => "remote misconfigured",
            ErrorClass::PermissionDenied => "permission denied",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::Other => "error",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Suggested next steps for a failed repository
pub fn remediation(class: ErrorClass, organization: &str, repo: &str, path: &Path) -> Vec<String> {
    let path = path.display();
    match class {
        ErrorClass::DirectoryExists => vec![
            "Directory exists but is not a valid git repository".to_string(),
            format!("Remove it: rm -rf \"{path}\""),
            "Then resume the run".to_string(),
        ],
        ErrorClass::Authentication => vec![
            "Authentication failed - check your API token".to_string(),
            "Set a token: export GITHUB_TOKEN=\"<personal access token>\"".to_string(),
            "Make sure the token can read the organization's repositories".to_string(),
        ],
        ErrorClass::NotFound => vec![
            "Repository not found or not visible to this token".to_string(),
            format!("Verify it still exists: {organization}/{repo}"),
        ],
        ErrorClass::Timeout => vec![
            "Network connection issue".to_string(),
            format!("Retry with: fleet-sync sync --org {organization} --resume"),
        ],
        ErrorClass::RemoteMisconfigured => vec![
            "Git remote configuration issue".to_string(),
            format!("Check the remote URL: git -C \"{path}\" remote -v"),
            format!("Or remove and re-clone: rm -rf \"{path}\""),
        ],
        ErrorClass::PermissionDenied => vec![
            "Permission denied".to_string(),
            "Ensure you have write access to the target directory".to_string(),
        ],
        ErrorClass::Cancelled => vec!["Run was interrupted - resume it with --resume".to_string()],
        ErrorClass::Other => vec![
            "Check the error message above for details".to_string(),
            "Run with --verbose for detailed logs".to_string(),
        ],
    }
}

/// Errors that end a whole bulk run
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "target path mismatch for {organization}: checkpoint has {}, requested {}",
        .recorded.display(),
        .requested.display()
    )]
    StateMismatch {
        organization: String,
        recorded: PathBuf,
        requested: PathBuf,
    },

    #[error(
        "existing checkpoint found for {organization} at {}. Use --resume to continue or `fleet-sync state clean --org {organization}` to start fresh",
        .target.display()
    )]
    CheckpointExists {
        organization: String,
        target: PathBuf,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to start worker pool: {0}")]
    PoolStart(PoolError),

    #[error("worker pool rejected job: {0}")]
    Pool(PoolError),

    #[error("failed to list repositories for {organization}: {source}")]
    Listing {
        organization: String,
        #[source]
        source: ApiError,
    },

    #[error("refusing invalid repository name {name:?} listed for {organization}")]
    InvalidRepositoryName { organization: String, name: String },

    #[error("authentication failed on {repository}, aborting run: {message}")]
    Authentication { repository: String, message: String },

    #[error("operation cancelled; state saved for --resume")]
    Cancelled,

    #[error("{failed} of {total} repositories failed")]
    RunFailed { failed: usize, total: usize },
}
