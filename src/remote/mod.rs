//! Remote hosting API access: rate limiting, retries and repository listing

mod client;
mod error;
mod github;
mod lister;
pub mod rate_limit;

pub use client::RetryClient;
pub use error::ApiError;
pub use github::{fetch_clone_url, GitHubLister};
pub use lister::{RepositoryLister, StaticLister};
pub use rate_limit::{RateLimitStatus, RateLimiter};
