//! Job handlers with scripted outcomes

use async_trait::async_trait;
use fleet_sync::core::{CancelSignal, ErrorClass};
use fleet_sync::pool::{Job, JobError, JobHandler};
use fleet_sync::remote::ApiError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Succeeds unless told otherwise, recording every repository it sees
#[derive(Default)]
pub struct ScriptedHandler {
    fail: HashSet<String>,
    unauthorized: HashSet<String>,
    block_until_cancelled: bool,
    delay: Option<Duration>,
    slow: HashMap<String, Duration>,
    seen: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, names: &[&str]) -> Self {
        self.fail.extend(names.iter().map(|s| s.to_string()));
        self
    }

    pub fn unauthorized(mut self, names: &[&str]) -> Self {
        self.unauthorized.extend(names.iter().map(|s| s.to_string()));
        self
    }

    /// Every job waits for cancellation before returning
    pub fn blocking(mut self) -> Self {
        self.block_until_cancelled = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Only the named repositories take `delay`
    pub fn slow(mut self, names: &[&str], delay: Duration) -> Self {
        self.slow.extend(names.iter().map(|s| (s.to_string(), delay)));
        self
    }

    pub fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn handle(&self, job: &Job, cancel: &CancelSignal) -> Result<String, JobError> {
        self.seen.lock().unwrap().push(job.repository.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.slow.get(&job.repository).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        let outcome = if self.block_until_cancelled {
            cancel.cancelled().await;
            Err(JobError::Cancelled)
        } else if self.unauthorized.contains(&job.repository) {
            Err(JobError::Api(ApiError::Remote {
                status: 401,
                message: "Bad credentials".to_string(),
                documentation_url: None,
            }))
        } else if self.fail.contains(&job.repository) {
            Err(JobError::Git {
                operation: job.operation,
                path: job.path.clone(),
                message: "remote hung up".to_string(),
                class: ErrorClass::Timeout,
            })
        } else {
            Ok(format!("{} ok", job.operation))
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
