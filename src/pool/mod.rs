//! Bounded-concurrency worker pool
//!
//! Jobs are dispatched to one of three worker groups (clone, update, config),
//! each with its own queue and a fixed number of worker tasks. Every submitted
//! job produces exactly one [`JobResult`] on the results stream, including jobs
//! that fail, panic, or are skipped because the pool was cancelled.

pub mod error;
pub mod job;

pub use error::{JobError, PoolError};
pub use job::{is_valid_repository_name, GroupKind, Job, JobHandler, JobResult, Operation, Strategy};

use futures::{FutureExt, Stream};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::config::{config_capacity, update_capacity, DEFAULT_QUEUE_CAPACITY};
use crate::core::CancelSignal;

/// Worker counts and queue size for each group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub clone_workers: usize,
    pub update_workers: usize,
    pub config_workers: usize,
    /// Jobs each group buffers before `submit` waits
    pub queue_capacity: usize,
}

impl PoolConfig {
    /// Derives group capacities from a single parallelism value
    pub fn from_parallelism(parallelism: usize, queue_capacity: usize) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            clone_workers: parallelism,
            update_workers: update_capacity(parallelism),
            config_workers: config_capacity(parallelism),
            queue_capacity,
        }
    }

    fn workers(&self, group: GroupKind) -> usize {
        match group {
            GroupKind::Clone => self.clone_workers,
            GroupKind::Update => self.update_workers,
            GroupKind::Config => self.config_workers,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_parallelism(crate::core::config::get_parallelism(None), DEFAULT_QUEUE_CAPACITY)
    }
}

struct Envelope {
    job: Job,
    handler: Arc<dyn JobHandler>,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Envelope>>>;

/// Unordered stream of job results; ends once the pool is stopped and drained
pub struct JobResults {
    rx: mpsc::UnboundedReceiver<JobResult>,
}

impl Stream for JobResults {
    type Item = JobResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobResult>> {
        self.rx.poll_recv(cx)
    }
}

/// Worker pool with per-operation-type capacity
///
/// Backpressure: [`WorkerPool::submit`] waits while a group's queue is full;
/// [`WorkerPool::try_submit`] fails fast with [`PoolError::QueueFull`].
pub struct WorkerPool {
    config: PoolConfig,
    cancel: CancelSignal,
    aborted: Arc<AtomicBool>,
    senders: Option<HashMap<GroupKind, mpsc::Sender<Envelope>>>,
    workers: Vec<JoinHandle<()>>,
    results_tx: Option<mpsc::UnboundedSender<JobResult>>,
    results_rx: Option<mpsc::UnboundedReceiver<JobResult>>,
    started: bool,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, cancel: CancelSignal) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            config,
            cancel,
            aborted: Arc::new(AtomicBool::new(false)),
            senders: None,
            workers: Vec::new(),
            results_tx: Some(results_tx),
            results_rx: Some(results_rx),
            started: false,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Allocates the worker groups; must run inside a tokio runtime
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.started {
            return Err(PoolError::Start("pool already started".to_string()));
        }
        if self.config.queue_capacity == 0 {
            return Err(PoolError::Start("queue capacity must be at least 1".to_string()));
        }
        tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::Start(format!("no async runtime: {e}")))?;
        let results_tx = self
            .results_tx
            .clone()
            .ok_or_else(|| PoolError::Start("pool already stopped".to_string()))?;

        let mut senders = HashMap::new();
        for group in [GroupKind::Clone, GroupKind::Update, GroupKind::Config] {
            let workers = self.config.workers(group);
            if workers == 0 {
                return Err(PoolError::Start(format!("{group:?} group has no workers")));
            }

            let (tx, rx) = mpsc::channel(self.config.queue_capacity);
            let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
            for _ in 0..workers {
                self.workers.push(tokio::spawn(run_worker(
                    Arc::clone(&rx),
                    results_tx.clone(),
                    self.cancel.clone(),
                    Arc::clone(&self.aborted),
                )));
            }
            senders.insert(group, tx);
        }

        tracing::debug!(
            clone = self.config.clone_workers,
            update = self.config.update_workers,
            config = self.config.config_workers,
            "worker pool started"
        );
        self.senders = Some(senders);
        self.started = true;
        Ok(())
    }

    fn sender(&self, group: GroupKind) -> Result<&mpsc::Sender<Envelope>, PoolError> {
        if self.cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        match &self.senders {
            Some(senders) => senders.get(&group).ok_or(PoolError::Stopped),
            None if self.started => Err(PoolError::Stopped),
            None => Err(PoolError::NotStarted),
        }
    }

    /// Enqueues a job, waiting for queue space
    ///
    /// Cancel-safe: if the returned future is dropped before it resolves, the
    /// job was not enqueued.
    pub async fn submit(&self, job: Job, handler: Arc<dyn JobHandler>) -> Result<(), PoolError> {
        let tx = self.sender(job.operation.group())?;
        let permit = tokio::select! {
            permit = tx.reserve() => permit.map_err(|_| PoolError::Stopped)?,
            _ = self.cancel.cancelled() => return Err(PoolError::Cancelled),
        };
        permit.send(Envelope { job, handler });
        Ok(())
    }

    /// Enqueues a job without waiting
    pub fn try_submit(&self, job: Job, handler: Arc<dyn JobHandler>) -> Result<(), PoolError> {
        let group = job.operation.group();
        let tx = self.sender(group)?;
        tx.try_send(Envelope { job, handler }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::QueueFull(group),
            mpsc::error::TrySendError::Closed(_) => PoolError::Stopped,
        })
    }

    /// Takes the results stream; `None` if it was already taken
    pub fn results(&mut self) -> Option<JobResults> {
        self.results_rx.take().map(|rx| JobResults { rx })
    }

    /// Stops accepting jobs and waits for queued and in-flight jobs to finish
    pub async fn stop(&mut self) {
        self.senders = None;
        self.results_tx = None;
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                tracing::warn!("worker task ended abnormally: {e}");
            }
        }
        if self.started {
            tracing::debug!("worker pool stopped");
        }
    }

    /// Like [`WorkerPool::stop`], but queued jobs are reported as cancelled
    /// instead of being run
    pub async fn abort(&mut self) {
        self.aborted.store(true, Ordering::Release);
        self.stop().await;
    }
}

async fn run_worker(
    rx: SharedReceiver,
    results: mpsc::UnboundedSender<JobResult>,
    cancel: CancelSignal,
    aborted: Arc<AtomicBool>,
) {
    loop {
        let next = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(Envelope { job, handler }) = next else {
            break;
        };

        let started = Instant::now();
        let outcome = if cancel.is_cancelled() || aborted.load(Ordering::Acquire) {
            Err(JobError::Cancelled)
        } else {
            AssertUnwindSafe(handler.handle(&job, &cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(&panic))))
        };

        let result = JobResult {
            job,
            outcome,
            duration: started.elapsed(),
        };
        if results.send(result).is_err() {
            tracing::debug!("results receiver dropped; discarding job result");
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel_pair;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Counts how many jobs run at once
    #[derive(Default)]
    struct CountingHandler {
        current: AtomicUsize,
        peak: AtomicUsize,
        fail_on: Option<String>,
        panic_on: Option<String>,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, job: &Job, _cancel: &CancelSignal) -> Result<String, JobError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on.as_deref() == Some(job.repository.as_str()) {
                panic!("boom");
            }
            if self.fail_on.as_deref() == Some(job.repository.as_str()) {
                return Err(JobError::Unsupported(job.operation));
            }
            Ok(format!("{} done", job.repository))
        }
    }

    fn job(name: &str, operation: Operation) -> Job {
        Job {
            repository: name.to_string(),
            operation,
            path: PathBuf::from("/tmp").join(name),
            strategy: Strategy::Pull,
        }
    }

    #[test]
    fn test_pool_config_from_parallelism() {
        let config = PoolConfig::from_parallelism(4, 10);
        assert_eq!(config.clone_workers, 4);
        assert_eq!(config.update_workers, 6);
        assert_eq!(config.config_workers, 2);

        let config = PoolConfig::from_parallelism(0, 10);
        assert_eq!(config.clone_workers, 1);
        assert_eq!(config.config_workers, 1);
    }

    #[tokio::test]
    async fn test_clone_concurrency_is_bounded() {
        let mut pool = WorkerPool::new(PoolConfig::from_parallelism(3, 64), CancelSignal::never());
        pool.start().unwrap();
        let mut results = pool.results().unwrap();

        let handler = Arc::new(CountingHandler::default());
        for i in 0..20 {
            pool.submit(job(&format!("r{i}"), Operation::Clone), handler.clone())
                .await
                .unwrap();
        }
        pool.stop().await;

        let mut count = 0;
        while let Some(result) = results.next().await {
            assert!(result.is_success());
            count += 1;
        }
        assert_eq!(count, 20);
        let peak = handler.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak clone concurrency {peak} exceeded 3");
        assert!(peak >= 2, "clone jobs should overlap");
    }

    #[tokio::test]
    async fn test_failures_and_panics_become_results() {
        let mut pool = WorkerPool::new(PoolConfig::from_parallelism(2, 8), CancelSignal::never());
        pool.start().unwrap();
        let results = pool.results().unwrap();

        let handler = Arc::new(CountingHandler {
            fail_on: Some("bad".to_string()),
            panic_on: Some("explodes".to_string()),
            ..Default::default()
        });
        for name in ["good", "bad", "explodes", "fine"] {
            pool.submit(job(name, Operation::Fetch), handler.clone())
                .await
                .unwrap();
        }
        pool.stop().await;

        let collected: Vec<JobResult> = results.collect().await;
        assert_eq!(collected.len(), 4);
        let failed: Vec<&str> = collected
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.job.repository.as_str())
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.contains(&"bad"));
        assert!(failed.contains(&"explodes"));
        let panicked = collected
            .iter()
            .find(|r| r.job.repository == "explodes")
            .unwrap();
        assert!(matches!(panicked.outcome, Err(JobError::Panicked(ref m)) if m == "boom"));
    }

    #[tokio::test]
    async fn test_try_submit_reports_queue_full() {
        let (handle, cancel) = cancel_pair();
        let mut pool = WorkerPool::new(
            PoolConfig {
                clone_workers: 1,
                update_workers: 1,
                config_workers: 1,
                queue_capacity: 1,
            },
            cancel,
        );
        pool.start().unwrap();

        struct Blocking;
        #[async_trait]
        impl JobHandler for Blocking {
            async fn handle(&self, _job: &Job, cancel: &CancelSignal) -> Result<String, JobError> {
                cancel.cancelled().await;
                Err(JobError::Cancelled)
            }
        }
        let handler: Arc<dyn JobHandler> = Arc::new(Blocking);

        // First job occupies the worker, second fills the queue
        pool.try_submit(job("a", Operation::Clone), handler.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.try_submit(job("b", Operation::Clone), handler.clone()).unwrap();
        assert_eq!(
            pool.try_submit(job("c", Operation::Clone), handler.clone()),
            Err(PoolError::QueueFull(GroupKind::Clone))
        );
        // Other groups have their own queues
        pool.try_submit(job("d", Operation::Pull), handler.clone()).unwrap();

        handle.cancel();
        assert_eq!(
            pool.submit(job("e", Operation::Clone), handler.clone()).await,
            Err(PoolError::Cancelled)
        );
        let results = pool.results().unwrap();
        pool.stop().await;
        let collected: Vec<JobResult> = results.collect().await;
        assert_eq!(collected.len(), 3);
        assert!(collected.iter().all(|r| !r.is_success()));
    }

    #[tokio::test]
    async fn test_submit_before_start_and_after_stop() {
        let mut pool = WorkerPool::new(PoolConfig::from_parallelism(1, 4), CancelSignal::never());
        let handler: Arc<dyn JobHandler> = Arc::new(CountingHandler::default());
        assert_eq!(
            pool.submit(job("x", Operation::Clone), handler.clone()).await,
            Err(PoolError::NotStarted)
        );
        pool.start().unwrap();
        pool.stop().await;
        assert_eq!(
            pool.submit(job("x", Operation::Clone), handler).await,
            Err(PoolError::Stopped)
        );
    }

    #[tokio::test]
    async fn test_abort_skips_queued_jobs() {
        let mut pool = WorkerPool::new(
            PoolConfig {
                clone_workers: 1,
                update_workers: 1,
                config_workers: 1,
                queue_capacity: 16,
            },
            CancelSignal::never(),
        );
        pool.start().unwrap();
        let results = pool.results().unwrap();
        let handler = Arc::new(CountingHandler::default());
        for i in 0..6 {
            pool.submit(job(&format!("r{i}"), Operation::Clone), handler.clone())
                .await
                .unwrap();
        }
        pool.abort().await;

        let collected: Vec<JobResult> = results.collect().await;
        assert_eq!(collected.len(), 6);
        assert!(collected
            .iter()
            .any(|r| matches!(r.outcome, Err(JobError::Cancelled))));
    }

    #[test]
    fn test_start_rejects_zero_queue() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let mut pool = WorkerPool::new(
                PoolConfig {
                    clone_workers: 1,
                    update_workers: 1,
                    config_workers: 1,
                    queue_capacity: 0,
                },
                CancelSignal::never(),
            );
            assert!(matches!(pool.start(), Err(PoolError::Start(_))));
        });
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let mut pool = WorkerPool::new(PoolConfig::from_parallelism(1, 4), CancelSignal::never());
        assert!(matches!(pool.start(), Err(PoolError::Start(_))));
    }
}
