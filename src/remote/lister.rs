//! Repository listing seam

use async_trait::async_trait;

use super::error::ApiError;
use crate::core::CancelSignal;

/// Source of the repository names that make up an organization
#[async_trait]
pub trait RepositoryLister: Send + Sync {
    async fn list(&self, organization: &str, cancel: &CancelSignal)
        -> Result<Vec<String>, ApiError>;
}

/// Lister over a fixed set of names
#[derive(Debug, Clone, Default)]
pub struct StaticLister {
    names: Vec<String>,
}

impl StaticLister {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

#[async_trait]
impl RepositoryLister for StaticLister {
    async fn list(
        &self,
        _organization: &str,
        _cancel: &CancelSignal,
    ) -> Result<Vec<String>, ApiError> {
        Ok(self.names.clone())
    }
}
