//! Repository Operation Executor: one job, one git operation

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::operations::{clone_repository, fetch_repository, pull_repository, reset_repository};
use crate::core::{CancelSignal, SyncConfig};
use crate::pool::{Job, JobError, JobHandler, Operation};
use crate::remote::{fetch_clone_url, RetryClient};

/// Runs clone/pull/fetch/reset jobs for one organization
pub struct RepoExecutor {
    organization: String,
    clone_url_template: String,
    api: Option<Arc<RetryClient>>,
    git_timeout: Duration,
}

impl RepoExecutor {
    pub fn new(organization: &str, clone_url_template: &str, git_timeout: Duration) -> Self {
        Self {
            organization: organization.to_string(),
            clone_url_template: clone_url_template.to_string(),
            api: None,
            git_timeout,
        }
    }

    /// Resolves clone URLs through the API instead of the template
    pub fn with_api(mut self, client: Arc<RetryClient>) -> Self {
        self.api = Some(client);
        self
    }

    /// Executor configured from `config`; `api` is used only when the config
    /// asks for API-resolved clone URLs
    pub fn from_config(
        config: &SyncConfig,
        organization: &str,
        api: Option<Arc<RetryClient>>,
    ) -> Self {
        let executor = Self::new(
            organization,
            &config.clone_url_template,
            config.git_timeout(),
        );
        match api {
            Some(client) if config.resolve_clone_url => executor.with_api(client),
            _ => executor,
        }
    }

    /// Clone URL from the template
    pub fn template_url(&self, repository: &str) -> String {
        self.clone_url_template
            .replace("{org}", &self.organization)
            .replace("{repo}", repository)
    }

    async fn clone_url(&self, repository: &str, cancel: &CancelSignal) -> Result<String, JobError> {
        match &self.api {
            Some(client) => {
                Ok(fetch_clone_url(client, &self.organization, repository, cancel).await?)
            }
            None => Ok(self.template_url(repository)),
        }
    }
}

#[async_trait]
impl JobHandler for RepoExecutor {
    async fn handle(&self, job: &Job, cancel: &CancelSignal) -> Result<String, JobError> {
        tracing::debug!("{} {} at {}", job.operation, job.repository, job.path.display());
        match job.operation {
            Operation::Clone => {
                let url = self.clone_url(&job.repository, cancel).await?;
                clone_repository(&url, &job.path, self.git_timeout, cancel).await
            }
            Operation::Pull => pull_repository(&job.path, self.git_timeout, cancel).await,
            Operation::Fetch => fetch_repository(&job.path, self.git_timeout, cancel).await,
            Operation::Reset => reset_repository(&job.path, self.git_timeout, cancel).await,
            Operation::Config => Err(JobError::Unsupported(Operation::Config)),
        }
    }
}
