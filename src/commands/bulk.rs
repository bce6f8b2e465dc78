//! Bulk sync orchestrator
//!
//! Resolves fresh-vs-resumed state, feeds jobs to the worker pool, and records
//! every result into the checkpoint from a single event loop that also drives
//! progress rendering, periodic checkpointing and cancellation.

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::core::config::get_parallelism;
use crate::core::{
    failure_report, next_steps, CancelSignal, DisplayMode, ProgressStatus, ProgressTracker,
    RunSummary, SyncConfig, SyncError,
};
use crate::pool::{is_valid_repository_name, Job, JobError, JobHandler, JobResult, JobResults, PoolConfig, PoolError, Strategy, WorkerPool};
use crate::remote::{ApiError, RepositoryLister};
use crate::state::{RunSettings, RunState, StateError, StateManager};

const HUD_TEMPLATE: &str = "{wide_msg}";

/// Parameters of one bulk run
#[derive(Debug, Clone)]
pub struct BulkSyncOptions {
    pub target_path: PathBuf,
    pub organization: String,
    pub strategy: Strategy,
    /// Falls back to the config file, then to the CPU-based default
    pub parallelism: Option<usize>,
    /// Falls back to the config file's retry settings
    pub max_retries: Option<u32>,
    pub resume: bool,
    pub display: DisplayMode,
    /// Requeue repositories that failed in an earlier run when resuming
    pub retry_failed: bool,
}

impl BulkSyncOptions {
    pub fn new(target_path: impl Into<PathBuf>, organization: &str) -> Self {
        Self {
            target_path: target_path.into(),
            organization: organization.to_string(),
            strategy: Strategy::default(),
            parallelism: None,
            max_retries: None,
            resume: false,
            display: DisplayMode::default(),
            retry_failed: true,
        }
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    pub fn retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }
}

/// Drives bulk runs for one set of collaborators
pub struct BulkSync {
    config: SyncConfig,
    lister: Arc<dyn RepositoryLister>,
    handler: Arc<dyn JobHandler>,
    cancel: CancelSignal,
}

enum Event {
    Cancelled,
    Result(Option<JobResult>),
    Submitted(Result<(), PoolError>),
    Render,
    Checkpoint,
}

impl BulkSync {
    pub fn new(
        config: SyncConfig,
        lister: Arc<dyn RepositoryLister>,
        handler: Arc<dyn JobHandler>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            config,
            lister,
            handler,
            cancel,
        }
    }

    /// State manager over the configured checkpoint directory
    pub fn state_manager(&self) -> StateManager {
        StateManager::new(self.config.state_dir())
    }

    /// Runs one bulk sync to completion, failure or cancellation
    ///
    /// Returns the run summary when every repository succeeded. Otherwise the
    /// checkpoint is kept and the error reports how many repositories failed.
    pub async fn run_bulk_sync(&self, options: BulkSyncOptions) -> Result<RunSummary, SyncError> {
        let started = Instant::now();
        let target = absolute(&options.target_path);
        let manager = self.state_manager();
        let settings = RunSettings {
            strategy: options.strategy,
            parallelism: get_parallelism(options.parallelism.or(self.config.parallelism)),
            max_retries: options.max_retries.unwrap_or(self.config.retry.max_retries),
        };

        let (mut state, work) = self.resolve_state(&manager, &target, settings, &options).await?;

        if work.is_empty() {
            tracing::info!("nothing to do for {}", options.organization);
            let summary = RunSummary {
                succeeded: state.completed.len(),
                failed: state.failed.len(),
                total: state.total(),
                elapsed: started.elapsed(),
            };
            return self.finish(&manager, &mut state, summary, options.display);
        }

        manager.save(&state)?;
        tracing::info!(
            "syncing {} repositories for {} into {} ({} parallel)",
            work.len(),
            options.organization,
            target.display(),
            state.settings.parallelism
        );

        let tracker = seed_tracker(&state, &work, options.display);
        let mut pool = WorkerPool::new(
            PoolConfig::from_parallelism(state.settings.parallelism, self.config.queue_capacity),
            self.cancel.clone(),
        );
        pool.start().map_err(SyncError::PoolStart)?;
        let mut results = pool
            .results()
            .ok_or_else(|| SyncError::PoolStart(PoolError::Start("results already taken".to_string())))?;

        let bar = hud_bar(options.display);
        let strategy = state.settings.strategy;
        let mut jobs = work.iter().map(|name| Job::plan(name, &target, strategy));
        let mut next_job = jobs.next();
        let mut submitted = 0usize;
        let mut received = 0usize;

        let mut render = tokio::time::interval(self.config.render_interval());
        let checkpoint_every = self.config.checkpoint_interval();
        let mut checkpoint =
            tokio::time::interval_at(tokio::time::Instant::now() + checkpoint_every, checkpoint_every);

        while next_job.is_some() || received < submitted {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Event::Cancelled,
                result = results.next(), if received < submitted => Event::Result(result),
                sent = submit_next(&pool, next_job.clone(), Arc::clone(&self.handler)), if next_job.is_some() => {
                    Event::Submitted(sent)
                }
                _ = render.tick() => Event::Render,
                _ = checkpoint.tick() => Event::Checkpoint,
            };

            match event {
                Event::Cancelled => {
                    return self
                        .cancelled(&manager, &mut state, &tracker, &mut pool, results, &bar)
                        .await;
                }
                Event::Result(None) => {
                    // Workers exited early; every in-flight job is lost
                    tracing::warn!("worker pool closed with {} results outstanding", submitted - received);
                    break;
                }
                Event::Result(Some(result)) => {
                    received += 1;
                    if let Some(fatal) = record(&mut state, &tracker, result, &self.cancel) {
                        bar.finish_and_clear();
                        state.mark_failed();
                        pool.abort().await;
                        drain(&mut state, &tracker, results, &self.cancel).await;
                        manager.save(&state)?;
                        return Err(fatal);
                    }
                }
                Event::Submitted(Ok(())) => {
                    if let Some(job) = next_job.take() {
                        tracker.update(&job.repository, ProgressStatus::Running, job.operation.as_str(), 0.0);
                    }
                    submitted += 1;
                    next_job = jobs.next();
                }
                Event::Submitted(Err(PoolError::Cancelled)) => {
                    return self
                        .cancelled(&manager, &mut state, &tracker, &mut pool, results, &bar)
                        .await;
                }
                Event::Submitted(Err(err)) => {
                    bar.finish_and_clear();
                    state.mark_failed();
                    pool.stop().await;
                    drain(&mut state, &tracker, results, &self.cancel).await;
                    manager.save(&state)?;
                    return Err(SyncError::Pool(err));
                }
                Event::Render => bar.set_message(tracker.render()),
                Event::Checkpoint => {
                    state.touch();
                    if let Err(e) = manager.save(&state) {
                        tracing::warn!("periodic checkpoint failed: {e}");
                    }
                }
            }
        }

        pool.stop().await;
        bar.finish_and_clear();
        let mut summary = tracker.summary();
        summary.elapsed = started.elapsed();
        self.finish(&manager, &mut state, summary, options.display)
    }

    /// Loads or creates the checkpoint and returns it with the names to process
    async fn resolve_state(
        &self,
        manager: &StateManager,
        target: &Path,
        settings: RunSettings,
        options: &BulkSyncOptions,
    ) -> Result<(RunState, Vec<String>), SyncError> {
        let provider = self.config.provider.as_str();
        let organization = options.organization.as_str();

        if manager.has(provider, organization) {
            if options.resume {
                let mut state = manager.load(provider, organization)?;
                if state.target_path != target {
                    return Err(SyncError::StateMismatch {
                        organization: organization.to_string(),
                        recorded: state.target_path.clone(),
                        requested: target.to_path_buf(),
                    });
                }
                warn_on_drift(&state.settings, &settings);
                state.settings = settings;
                if state.status.is_terminal() {
                    state.reopen();
                }

                let upstream = self.list(organization).await?;
                let work = state.reconcile(&upstream, options.retry_failed);
                tracing::info!(
                    "resuming {organization}: {} completed, {} failed, {} to process",
                    state.completed.len(),
                    state.failed.len(),
                    work.len()
                );
                return Ok((state, work));
            }

            match manager.load(provider, organization) {
                Ok(existing) if existing.target_path == target => {
                    return Err(SyncError::CheckpointExists {
                        organization: organization.to_string(),
                        target: target.to_path_buf(),
                    });
                }
                Ok(existing) => tracing::info!(
                    "discarding stale checkpoint for {} (was {})",
                    organization,
                    existing.target_path.display()
                ),
                Err(StateError::Corrupt { path, .. }) => {
                    tracing::warn!("discarding unreadable checkpoint {}", path.display())
                }
                Err(e) => return Err(e.into()),
            }
            manager.delete(provider, organization)?;
        } else if options.resume {
            return Err(StateError::NotFound {
                provider: provider.to_string(),
                organization: organization.to_string(),
            }
            .into());
        }

        let upstream = self.list(organization).await?;
        let state = manager.create(provider, organization, target, settings, upstream);
        let work = state.remaining();
        Ok((state, work))
    }

    async fn list(&self, organization: &str) -> Result<Vec<String>, SyncError> {
        match self.lister.list(organization, &self.cancel).await {
            Ok(names) => {
                if let Some(name) = names.iter().find(|name| !is_valid_repository_name(name)) {
                    return Err(SyncError::InvalidRepositoryName {
                        organization: organization.to_string(),
                        name: name.clone(),
                    });
                }
                Ok(names)
            }
            Err(ApiError::Cancelled) => Err(SyncError::Cancelled),
            Err(source) => Err(SyncError::Listing {
                organization: organization.to_string(),
                source,
            }),
        }
    }

    async fn cancelled(
        &self,
        manager: &StateManager,
        state: &mut RunState,
        tracker: &ProgressTracker,
        pool: &mut WorkerPool,
        results: JobResults,
        bar: &ProgressBar,
    ) -> Result<RunSummary, SyncError> {
        bar.finish_and_clear();
        tracing::warn!("cancellation requested, stopping workers");
        pool.stop().await;
        drain(state, tracker, results, &self.cancel).await;
        state.mark_cancelled();
        manager.save(state)?;
        tracing::info!(
            "checkpoint saved with {} repositories left",
            state.pending.len() + state.failed.len()
        );
        Err(SyncError::Cancelled)
    }

    /// Final transition: delete the checkpoint on full success, keep it otherwise
    fn finish(
        &self,
        manager: &StateManager,
        state: &mut RunState,
        summary: RunSummary,
        display: DisplayMode,
    ) -> Result<RunSummary, SyncError> {
        let quiet = display == DisplayMode::Quiet;
        if !quiet && summary.total > 0 {
            println!("{summary}");
        }

        if state.pending.is_empty() && state.failed.is_empty() {
            state.mark_completed();
            manager.delete(&state.provider, &state.organization)?;
            return Ok(summary);
        }

        state.mark_failed();
        manager.save(state)?;
        if !quiet {
            let report = failure_report(&state.organization, state.failures());
            if !report.is_empty() {
                println!("\n{report}");
            }
            println!("\n{}", next_steps(&state.organization, &state.target_path));
        }
        Err(SyncError::RunFailed {
            failed: state.failed.len(),
            total: state.total(),
        })
    }
}

/// Tracks every repository the checkpoint knows so resumed runs report the
/// whole organization; failures being retried start out queued
fn seed_tracker(state: &RunState, work: &[String], mode: DisplayMode) -> ProgressTracker {
    let tracker = ProgressTracker::new(&state.repositories(), mode);
    for (name, entry) in &state.completed {
        tracker.complete(name, &entry.message);
    }
    for (name, entry) in &state.failed {
        if !work.contains(name) {
            tracker.set_error(name, &entry.error);
        }
    }
    tracker
}

async fn submit_next(
    pool: &WorkerPool,
    job: Option<Job>,
    handler: Arc<dyn JobHandler>,
) -> Result<(), PoolError> {
    match job {
        Some(job) => pool.submit(job, handler).await,
        None => std::future::pending().await,
    }
}

/// Applies one result to the checkpoint and tracker; returns an error when the
/// result makes the rest of the run pointless
fn record(
    state: &mut RunState,
    tracker: &ProgressTracker,
    result: JobResult,
    cancel: &CancelSignal,
) -> Option<SyncError> {
    let JobResult { job, outcome, duration } = result;
    match outcome {
        Ok(message) => {
            tracing::debug!("{} {} in {:.1}s", job.repository, message, duration.as_secs_f64());
            state.add_completed(&job.repository, &job.path, job.operation, &message);
            tracker.complete(&job.repository, &message);
            None
        }
        Err(JobError::Cancelled) => {
            if !cancel.is_cancelled() {
                tracing::debug!("{} skipped by pool shutdown", job.repository);
            }
            tracker.update(&job.repository, ProgressStatus::Queued, "cancelled", 0.0);
            None
        }
        Err(err) => {
            let message = err.to_string();
            tracing::debug!("{} failed: {message}", job.repository);
            let attempt = state.next_attempt(&job.repository);
            state.add_failed(&job.repository, &job.path, job.operation, &message, err.class(), attempt);
            tracker.set_error(&job.repository, &message);
            err.is_run_fatal().then(|| SyncError::Authentication {
                repository: job.repository,
                message,
            })
        }
    }
}

/// Records whatever the stopped pool still reports; run-fatal results are
/// recorded like any other failure here
async fn drain(state: &mut RunState, tracker: &ProgressTracker, mut results: JobResults, cancel: &CancelSignal) {
    while let Some(result) = results.next().await {
        let _ = record(state, tracker, result, cancel);
    }
}

fn warn_on_drift(recorded: &RunSettings, requested: &RunSettings) {
    if recorded.strategy != requested.strategy {
        tracing::warn!(
            "strategy changed since the checkpoint: {} -> {}",
            recorded.strategy,
            requested.strategy
        );
    }
    if recorded.parallelism != requested.parallelism {
        tracing::warn!(
            "parallelism changed since the checkpoint: {} -> {}",
            recorded.parallelism,
            requested.parallelism
        );
    }
    if recorded.max_retries != requested.max_retries {
        tracing::warn!(
            "max retries changed since the checkpoint: {} -> {}",
            recorded.max_retries,
            requested.max_retries
        );
    }
}

fn hud_bar(display: DisplayMode) -> ProgressBar {
    if display == DisplayMode::Quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template(HUD_TEMPLATE) {
        Ok(style) => bar.set_style(style),
        Err(e) => tracing::debug!("falling back to default progress style: {e}"),
    }
    bar
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
