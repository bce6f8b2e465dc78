//! Jobs, results and the handler seam between the pool and the executor

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::error::JobError;
use crate::core::config::STATE_DIR_NAME;
use crate::core::CancelSignal;

/// Work performed for one repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Clone,
    Pull,
    Fetch,
    Reset,
    Config,
}

/// Worker group a job is dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Clone,
    Update,
    Config,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Clone => "clone",
            Operation::Pull => "pull",
            Operation::Fetch => "fetch",
            Operation::Reset => "reset",
            Operation::Config => "config",
        }
    }

    pub fn group(&self) -> GroupKind {
        match self {
            Operation::Clone => GroupKind::Clone,
            Operation::Pull | Operation::Fetch | Operation::Reset => GroupKind::Update,
            Operation::Config => GroupKind::Config,
        }
    }

    /// Operation for a repository at `path`: clone when absent, else per strategy
    pub fn plan(path: &Path, strategy: Strategy) -> Self {
        if path.exists() {
            strategy.operation()
        } else {
            Operation::Clone
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How existing local repositories are refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Pull,
    Fetch,
    Reset,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Pull => "pull",
            Strategy::Fetch => "fetch",
            Strategy::Reset => "reset",
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Strategy::Pull => Operation::Pull,
            Strategy::Fetch => Operation::Fetch,
            Strategy::Reset => Operation::Reset,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pull" => Ok(Strategy::Pull),
            "fetch" => Ok(Strategy::Fetch),
            "reset" => Ok(Strategy::Reset),
            other => Err(format!("unknown strategy '{other}' (expected pull, fetch or reset)")),
        }
    }
}

/// Whether `name` is safe to join onto a target directory
///
/// Rejects empty names, `.` and `..`, anything containing a path separator,
/// and names that would shadow the fallback checkpoint directory.
pub fn is_valid_repository_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with(STATE_DIR_NAME)
        && !Path::new(name).is_absolute()
}

/// One unit of work: one repository, one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub repository: String,
    pub operation: Operation,
    pub path: PathBuf,
    pub strategy: Strategy,
}

impl Job {
    /// Builds the job for `repository` under `target_path`
    pub fn plan(repository: &str, target_path: &Path, strategy: Strategy) -> Self {
        let path = target_path.join(repository);
        Self {
            repository: repository.to_string(),
            operation: Operation::plan(&path, strategy),
            path,
            strategy,
        }
    }
}

/// Outcome of one job; exactly one per submitted job
#[derive(Debug)]
pub struct JobResult {
    pub job: Job,
    /// Success message or the failure
    pub outcome: Result<String, JobError>,
    pub duration: Duration,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Performs the work for a job
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs `job`; `cancel` fires when the run is cancelled
    async fn handle(&self, job: &Job, cancel: &CancelSignal) -> Result<String, JobError>;
}
