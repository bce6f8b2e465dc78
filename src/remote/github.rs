//! GitHub REST endpoints used by a bulk run

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::client::RetryClient;
use super::error::ApiError;
use super::lister::RepositoryLister;
use crate::core::config::LIST_PAGE_SIZE;
use crate::core::CancelSignal;

#[derive(Debug, Deserialize)]
struct RepoSummary {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RepoDetail {
    clone_url: String,
}

/// Lists an organization's repositories page by page
pub struct GitHubLister {
    client: Arc<RetryClient>,
}

impl GitHubLister {
    pub fn new(client: Arc<RetryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RepositoryLister for GitHubLister {
    async fn list(
        &self,
        organization: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<String>, ApiError> {
        let mut names = Vec::new();
        let mut page = 1;

        loop {
            let path = format!("orgs/{organization}/repos?per_page={LIST_PAGE_SIZE}&page={page}");
            let batch: Vec<RepoSummary> = self.client.get_json(&path, cancel).await?;
            let count = batch.len();
            names.extend(batch.into_iter().map(|repo| repo.name));
            if count < LIST_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        names.sort();
        names.dedup();
        tracing::debug!("listed {} repositories for {organization}", names.len());
        Ok(names)
    }
}

/// Looks up the HTTPS clone URL of `organization/repository`
pub async fn fetch_clone_url(
    client: &RetryClient,
    organization: &str,
    repository: &str,
    cancel: &CancelSignal,
) -> Result<String, ApiError> {
    let detail: RepoDetail = client
        .get_json(&format!("repos/{organization}/{repository}"), cancel)
        .await?;
    Ok(detail.clone_url)
}
