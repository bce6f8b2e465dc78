pub(crate) mod fs;
pub(crate) mod terminal;

pub use fs::{atomic_write, shorten_path};
pub use terminal::{set_terminal_title, truncate_message};
