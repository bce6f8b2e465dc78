//! Per-repository progress entries.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl ProgressStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            ProgressStatus::Queued => "⏸️",
            ProgressStatus::Running => "🔄",
            ProgressStatus::Done => "🟢",
            ProgressStatus::Failed => "🔴",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ProgressStatus::Done | ProgressStatus::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEntry {
    pub repository: String,
    pub status: ProgressStatus,
    pub message: String,
    /// Completion of this repository's work, 0.0 to 1.0
    pub fraction: f32,
    pub last_update: Instant,
}

impl ProgressEntry {
    pub(crate) fn queued(repository: &str, now: Instant) -> Self {
        Self {
            repository: repository.to_string(),
            status: ProgressStatus::Queued,
            message: "queued".to_string(),
            fraction: 0.0,
            last_update: now,
        }
    }

    pub(crate) fn set(&mut self, status: ProgressStatus, message: &str, fraction: f32) {
        self.status = status;
        self.message = message.to_string();
        self.fraction = fraction.clamp(0.0, 1.0);
        self.last_update = Instant::now();
    }
}
