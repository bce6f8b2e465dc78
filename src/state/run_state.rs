//! The checkpoint model of a bulk run
//!
//! Each repository name lives in exactly one of `pending`, `completed` or
//! `failed`. Only the orchestrator's result loop mutates a [`RunState`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::ErrorClass;
use crate::pool::{Operation, Strategy};

pub const STATE_VERSION: u32 = 1;

fn default_version() -> u32 {
    STATE_VERSION
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run parameters recorded in the checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    pub strategy: Strategy,
    pub parallelism: usize,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedEntry {
    pub name: String,
    pub path: PathBuf,
    pub operation: Operation,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "first_attempt")]
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub name: String,
    pub path: PathBuf,
    pub operation: Operation,
    pub error: String,
    #[serde(default)]
    pub class: ErrorClass,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "first_attempt")]
    pub attempts: u32,
}

fn first_attempt() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default = "default_version")]
    pub version: u32,
    pub provider: String,
    pub organization: String,
    pub target_path: PathBuf,
    #[serde(flatten)]
    pub settings: RunSettings,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub completed: BTreeMap<String, CompletedEntry>,
    #[serde(default)]
    pub failed: BTreeMap<String, FailedEntry>,
}

impl RunState {
    /// Fresh running state with every repository pending
    pub fn new(
        provider: &str,
        organization: &str,
        target_path: &Path,
        settings: RunSettings,
        repositories: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let mut state = Self {
            version: STATE_VERSION,
            provider: provider.to_string(),
            organization: organization.to_string(),
            target_path: target_path.to_path_buf(),
            settings,
            status: RunStatus::Running,
            started_at: now,
            updated_at: now,
            pending: Vec::new(),
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
        };
        state.append_pending(repositories);
        state
    }

    pub fn total(&self) -> usize {
        self.pending.len() + self.completed.len() + self.failed.len()
    }

    /// Every repository the checkpoint knows: pending, then completed, then failed
    pub fn repositories(&self) -> Vec<String> {
        self.pending
            .iter()
            .chain(self.completed.keys())
            .chain(self.failed.keys())
            .cloned()
            .collect()
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.completed.contains_key(name)
    }

    pub fn is_failed(&self, name: &str) -> bool {
        self.failed.contains_key(name)
    }

    fn is_pending(&self, name: &str) -> bool {
        self.pending.iter().any(|p| p == name)
    }

    /// Appends names not yet known to the checkpoint; returns how many were added
    pub fn append_pending<I>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut known: HashSet<String> = self.pending.iter().cloned().collect();
        known.extend(self.completed.keys().cloned());
        known.extend(self.failed.keys().cloned());

        let mut added = 0;
        for name in names {
            if known.insert(name.clone()) {
                self.pending.push(name);
                added += 1;
            }
        }
        added
    }

    /// Attempt number the next result for `name` will carry
    pub fn next_attempt(&self, name: &str) -> u32 {
        self.failed.get(name).map_or(1, |entry| entry.attempts + 1)
    }

    /// Records a success; returns false if `name` was already completed
    pub fn add_completed(&mut self, name: &str, path: &Path, operation: Operation, message: &str) -> bool {
        if self.is_completed(name) {
            return false;
        }
        let attempts = self.next_attempt(name);
        self.pending.retain(|p| p != name);
        self.failed.remove(name);
        self.completed.insert(
            name.to_string(),
            CompletedEntry {
                name: name.to_string(),
                path: path.to_path_buf(),
                operation,
                message: message.to_string(),
                timestamp: Utc::now(),
                attempts,
            },
        );
        true
    }

    /// Records a failure, replacing an earlier failure of the same repository;
    /// returns false if `name` was already completed
    pub fn add_failed(
        &mut self,
        name: &str,
        path: &Path,
        operation: Operation,
        error: &str,
        class: ErrorClass,
        attempt: u32,
    ) -> bool {
        if self.is_completed(name) {
            return false;
        }
        self.pending.retain(|p| p != name);
        self.failed.insert(
            name.to_string(),
            FailedEntry {
                name: name.to_string(),
                path: path.to_path_buf(),
                operation,
                error: error.to_string(),
                class,
                timestamp: Utc::now(),
                attempts: attempt.max(1),
            },
        );
        true
    }

    /// Pending names that are neither completed nor failed
    pub fn remaining(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter(|name| !self.is_completed(name) && !self.is_failed(name))
            .cloned()
            .collect()
    }

    /// Share of completed repositories, 0-100
    pub fn progress_percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.completed.len() as f64 / total as f64 * 100.0
    }

    /// Merges the live repository list into the checkpoint and returns the
    /// names to process
    ///
    /// Completed names are skipped. Names unknown to the checkpoint are
    /// appended to `pending`. Failed names are included only when
    /// `retry_failed` is set.
    pub fn reconcile(&mut self, upstream: &[String], retry_failed: bool) -> Vec<String> {
        let added = self.append_pending(upstream.iter().cloned());
        if added > 0 {
            tracing::info!("{added} new repositories appeared upstream since the checkpoint");
        }

        let mut work = self.remaining();
        if retry_failed {
            work.extend(self.failed.keys().cloned());
        }
        work
    }

    fn transition(&mut self, to: RunStatus) -> bool {
        if self.status.is_terminal() {
            tracing::debug!("ignoring {} -> {} transition", self.status, to);
            return false;
        }
        self.status = to;
        self.updated_at = Utc::now();
        true
    }

    pub fn mark_completed(&mut self) -> bool {
        self.transition(RunStatus::Completed)
    }

    pub fn mark_failed(&mut self) -> bool {
        self.transition(RunStatus::Failed)
    }

    pub fn mark_cancelled(&mut self) -> bool {
        self.transition(RunStatus::Cancelled)
    }

    /// Starts a new run generation over a terminal checkpoint
    pub fn reopen(&mut self) {
        self.status = RunStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Failed entries ordered by name
    pub fn failures(&self) -> impl Iterator<Item = &FailedEntry> {
        self.failed.values()
    }

    #[cfg(test)]
    fn check_disjoint(&self) -> bool {
        let pending: HashSet<&String> = self.pending.iter().collect();
        pending.len() == self.pending.len()
            && self.completed.keys().all(|n| !pending.contains(n) && !self.failed.contains_key(n))
            && self.failed.keys().all(|n| !pending.contains(n))
    }
}
