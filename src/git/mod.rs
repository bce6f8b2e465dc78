//! Git subprocess plumbing and the repository operation executor

mod executor;
pub mod operations;

pub use executor::RepoExecutor;
pub use operations::{classify_git_failure, run_git, GitOutput, GitRunError};
