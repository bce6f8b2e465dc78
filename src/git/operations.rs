//! Git subprocess invocation and the repository operations built on it

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::core::config::ERROR_MESSAGE_MAX_LENGTH;
use crate::core::{CancelSignal, ErrorClass};
use crate::pool::{JobError, Operation};
use crate::utils::truncate_message;

// Git command arguments
const GIT_CLONE_ARGS: &[&str] = &["clone", "--quiet"];
const GIT_PULL_ARGS: &[&str] = &["pull", "--ff-only"];
const GIT_FETCH_ARGS: &[&str] = &["fetch", "--all", "--prune", "--quiet"];
const GIT_RESET_ARGS: &[&str] = &["reset", "--hard", "HEAD"];

// Status messages
const STATUS_CLONED: &str = "cloned";
const STATUS_PULLED: &str = "pulled";
const STATUS_UP_TO_DATE: &str = "up to date";
const STATUS_FETCHED: &str = "fetched";

/// Captured output of a finished git process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum GitRunError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("git cancelled")]
    Cancelled,
}

/// Runs git in `dir` with a timeout
///
/// The child is killed if the timeout elapses or `cancel` fires. Terminal
/// credential prompts are disabled so a missing credential fails instead of
/// hanging.
pub async fn run_git<I, S>(
    dir: &Path,
    args: I,
    timeout: Duration,
    cancel: &CancelSignal,
) -> Result<GitOutput, GitRunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::select! {
        result = tokio::time::timeout(timeout, command.output()) => match result {
            Ok(output) => output?,
            Err(_) => return Err(GitRunError::TimedOut(timeout)),
        },
        _ = cancel.cancelled() => return Err(GitRunError::Cancelled),
    };

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Classifies git's diagnostics for a failed command
pub fn classify_git_failure(stderr: &str) -> ErrorClass {
    let lower = stderr.to_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied (publickey)")
        || lower.contains("terminal prompts disabled")
    {
        ErrorClass::Authentication
    } else if lower.contains("not found") || lower.contains("does not exist") {
        ErrorClass::NotFound
    } else if lower.contains("already exists and is not an empty directory")
        || lower.contains("not a git repository")
    {
        ErrorClass::DirectoryExists
    } else if lower.contains("no such remote")
        || lower.contains("does not appear to be a git repository")
        || lower.contains("no remote repository specified")
        || lower.contains("no tracking information")
    {
        ErrorClass::RemoteMisconfigured
    } else if lower.contains("timed out")
        || lower.contains("could not resolve host")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
    {
        ErrorClass::Timeout
    } else if lower.contains("permission denied") {
        ErrorClass::PermissionDenied
    } else {
        ErrorClass::Other
    }
}

/// Collapses git's multi-line diagnostics into a short single line
pub fn clean_git_message(stderr: &str) -> String {
    let cleaned = stderr
        .lines()
        .map(|line| line.trim().trim_start_matches("fatal:").trim_start_matches("error:").trim())
        .filter(|line| !line.is_empty() && !line.starts_with("hint:"))
        .collect::<Vec<_>>()
        .join(" ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return "git exited with an error".to_string();
    }
    truncate_message(&cleaned, ERROR_MESSAGE_MAX_LENGTH * 2)
}

fn run_error(operation: Operation, path: &Path, err: GitRunError) -> JobError {
    match err {
        GitRunError::Cancelled => JobError::Cancelled,
        GitRunError::TimedOut(_) => JobError::Git {
            operation,
            path: path.to_path_buf(),
            message: err.to_string(),
            class: ErrorClass::Timeout,
        },
        GitRunError::Spawn(source) => JobError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        },
    }
}

fn failed(operation: Operation, path: &Path, output: &GitOutput) -> JobError {
    JobError::Git {
        operation,
        path: path.to_path_buf(),
        message: clean_git_message(&output.stderr),
        class: classify_git_failure(&output.stderr),
    }
}

/// Rejects paths that exist but are not a git working tree
fn ensure_repository(operation: Operation, path: &Path) -> Result<(), JobError> {
    if path.is_dir() && path.join(".git").exists() {
        Ok(())
    } else {
        Err(JobError::LocalState {
            operation,
            path: path.to_path_buf(),
        })
    }
}

/// Clones `url` into `dest`, removing a partial checkout if interrupted
pub async fn clone_repository(
    url: &str,
    dest: &Path,
    timeout: Duration,
    cancel: &CancelSignal,
) -> Result<String, JobError> {
    let operation = Operation::Clone;
    if dest.exists() {
        return Err(JobError::LocalState {
            operation,
            path: dest.to_path_buf(),
        });
    }
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|source| JobError::Io {
        operation,
        path: parent.to_path_buf(),
        source,
    })?;

    let mut args: Vec<&OsStr> = GIT_CLONE_ARGS.iter().map(OsStr::new).collect();
    args.push(OsStr::new(url));
    args.push(dest.as_os_str());

    match run_git(parent, args, timeout, cancel).await {
        Ok(output) if output.success => Ok(STATUS_CLONED.to_string()),
        Ok(output) => Err(failed(operation, dest, &output)),
        Err(err) => {
            if dest.exists() {
                if let Err(e) = std::fs::remove_dir_all(dest) {
                    tracing::warn!("failed to remove partial clone {}: {e}", dest.display());
                }
            }
            Err(run_error(operation, dest, err))
        }
    }
}

pub async fn pull_repository(
    path: &Path,
    timeout: Duration,
    cancel: &CancelSignal,
) -> Result<String, JobError> {
    ensure_repository(Operation::Pull, path)?;
    let output = run_git(path, GIT_PULL_ARGS, timeout, cancel)
        .await
        .map_err(|e| run_error(Operation::Pull, path, e))?;
    if !output.success {
        return Err(failed(Operation::Pull, path, &output));
    }
    if output.stdout.to_lowercase().contains("already up to date") {
        Ok(STATUS_UP_TO_DATE.to_string())
    } else {
        Ok(STATUS_PULLED.to_string())
    }
}

pub async fn fetch_repository(
    path: &Path,
    timeout: Duration,
    cancel: &CancelSignal,
) -> Result<String, JobError> {
    ensure_repository(Operation::Fetch, path)?;
    let output = run_git(path, GIT_FETCH_ARGS, timeout, cancel)
        .await
        .map_err(|e| run_error(Operation::Fetch, path, e))?;
    if output.success {
        Ok(STATUS_FETCHED.to_string())
    } else {
        Err(failed(Operation::Fetch, path, &output))
    }
}

/// Hard-resets to HEAD, then pulls; a failed reset skips the pull
pub async fn reset_repository(
    path: &Path,
    timeout: Duration,
    cancel: &CancelSignal,
) -> Result<String, JobError> {
    ensure_repository(Operation::Reset, path)?;
    let output = run_git(path, GIT_RESET_ARGS, timeout, cancel)
        .await
        .map_err(|e| run_error(Operation::Reset, path, e))?;
    if !output.success {
        return Err(failed(Operation::Reset, path, &output));
    }

    let pulled = pull_repository(path, timeout, cancel).await?;
    Ok(format!("reset, {pulled}"))
}
