// Internal modules - not part of public API
pub(crate) mod errors;
pub(crate) mod shutdown;
pub(crate) mod stats;

// Configuration is public so callers can read the defaults
pub mod config;
pub mod sync;


// Public API - curated exports only
pub mod api;

// Re-export key items at module level for convenience
pub use api::*;
