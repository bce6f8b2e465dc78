//! Checkpoint model and persistence for resumable runs

mod error;
mod manager;
mod run_state;

pub use error::StateError;
pub use manager::StateManager;
pub use run_state::{
    CompletedEntry, FailedEntry, RunSettings, RunState, RunStatus, STATE_VERSION,
};
