//! Per-repository progress tracking and HUD rendering.

pub mod renderer;
pub mod state;
pub mod tracker;

pub use renderer::{DisplayMode, HudRenderer};
pub use state::{ProgressEntry, ProgressStatus};
pub use tracker::ProgressTracker;
