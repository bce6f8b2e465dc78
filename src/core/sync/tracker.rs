//! Progress aggregation for a bulk run.
//!
//! The orchestrator's result loop is the only writer. Renders may run
//! concurrently with it; entries live in a `DashMap` so readers never block
//! the writer for longer than one shard lock.

use dashmap::DashMap;
use std::time::Instant;

use crate::core::stats::RunSummary;
use crate::core::sync::renderer::{DisplayMode, HudRenderer, ProgressCounts};
use crate::core::sync::state::{ProgressEntry, ProgressStatus};

pub struct ProgressTracker {
    entries: DashMap<String, ProgressEntry>,
    order: Vec<String>,
    renderer: HudRenderer,
    started: Instant,
}

impl ProgressTracker {
    /// Seeds one queued entry per repository
    pub fn new(repositories: &[String], mode: DisplayMode) -> Self {
        let now = Instant::now();
        let entries = DashMap::with_capacity(repositories.len());
        let mut order = Vec::with_capacity(repositories.len());
        for name in repositories {
            if entries
                .insert(name.clone(), ProgressEntry::queued(name, now))
                .is_none()
            {
                order.push(name.clone());
            }
        }
        Self {
            entries,
            order,
            renderer: HudRenderer::new(mode),
            started: now,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.renderer.mode()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn update(&self, repository: &str, status: ProgressStatus, message: &str, fraction: f32) {
        match self.entries.get_mut(repository) {
            Some(mut entry) => entry.set(status, message, fraction),
            None => tracing::debug!("progress update for untracked repository {repository}"),
        }
    }

    pub fn complete(&self, repository: &str, message: &str) {
        self.update(repository, ProgressStatus::Done, message, 1.0);
    }

    pub fn set_error(&self, repository: &str, message: &str) {
        self.update(repository, ProgressStatus::Failed, message, 1.0);
    }

    pub fn entry(&self, repository: &str) -> Option<ProgressEntry> {
        self.entries.get(repository).map(|entry| entry.clone())
    }

    pub fn counts(&self) -> ProgressCounts {
        let mut counts = ProgressCounts {
            total: self.order.len(),
            ..Default::default()
        };
        for entry in self.entries.iter() {
            match entry.status {
                ProgressStatus::Queued => counts.queued += 1,
                ProgressStatus::Running => counts.running += 1,
                ProgressStatus::Done => counts.done += 1,
                ProgressStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Text snapshot in the configured display mode
    pub fn render(&self) -> String {
        let entries: Vec<ProgressEntry> = self
            .order
            .iter()
            .filter_map(|name| self.entry(name))
            .collect();
        self.renderer
            .render(&self.counts(), &entries, self.started.elapsed())
    }

    /// Final tally
    pub fn summary(&self) -> RunSummary {
        let counts = self.counts();
        RunSummary {
            succeeded: counts.done,
            failed: counts.failed,
            total: counts.total,
            elapsed: self.started.elapsed(),
        }
    }
}
