//! Pool-level and per-job errors

use std::path::PathBuf;
use thiserror::Error;

use super::job::{GroupKind, Operation};
use crate::core::ErrorClass;
use crate::remote::ApiError;

/// Errors from the worker pool itself; all of them end the run
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("cannot start pool: {0}")]
    Start(String),

    #[error("pool has not been started")]
    NotStarted,

    #[error("{0:?} queue is full")]
    QueueFull(GroupKind),

    #[error("pool is stopped")]
    Stopped,

    #[error("pool cancelled")]
    Cancelled,
}

/// Failure of a single job; recorded, never fatal to sibling jobs
#[derive(Debug, Error)]
pub enum JobError {
    #[error("git {operation} failed in {}: {message}", .path.display())]
    Git {
        operation: Operation,
        path: PathBuf,
        message: String,
        class: ErrorClass,
    },

    #[error("{} exists but is not a git repository", .path.display())]
    LocalState { operation: Operation, path: PathBuf },

    #[error("{operation} failed at {}: {source}", .path.display())]
    Io {
        operation: Operation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{0} operation is not implemented")]
    Unsupported(Operation),

    #[error("job cancelled")]
    Cancelled,

    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Classification used for remediation and run-abort decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            JobError::Git { class, .. } => *class,
            JobError::LocalState { .. } => ErrorClass::DirectoryExists,
            JobError::Io { source, .. } => ErrorClass::from_io(source.kind()),
            JobError::Api(api) => api.class(),
            JobError::Unsupported(_) | JobError::Panicked(_) => ErrorClass::Other,
            JobError::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// API authentication failures make every other job pointless
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            JobError::Api(ApiError::Remote {
                status: 401 | 403,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16) -> JobError {
        JobError::Api(ApiError::Remote {
            status,
            message: "nope".to_string(),
            documentation_url: None,
        })
    }

    #[test]
    fn test_auth_errors_abort_the_run() {
        assert!(remote(401).is_run_fatal());
        assert!(remote(403).is_run_fatal());
        assert!(!remote(404).is_run_fatal());
        assert!(!JobError::Cancelled.is_run_fatal());
    }

    #[test]
    fn test_job_error_classes() {
        assert_eq!(remote(404).class(), ErrorClass::NotFound);
        let local = JobError::LocalState {
            operation: Operation::Pull,
            path: PathBuf::from("/tmp/x"),
        };
        assert_eq!(local.class(), ErrorClass::DirectoryExists);
        assert!(local.to_string().contains("/tmp/x"));
        assert_eq!(JobError::Unsupported(Operation::Config).class(), ErrorClass::Other);
    }
}
