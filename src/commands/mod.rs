//! Command implementations: the bulk sync orchestrator and checkpoint inspection

pub mod bulk;
pub mod state;

pub use bulk::{BulkSync, BulkSyncOptions};
