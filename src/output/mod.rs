//! Output module for persisting statistics records.
//!
//! Records are rendered either as human-readable `Label: value` blocks or as
//! CSV rows, and always appended to existing files so that repeated runs
//! accumulate history instead of overwriting it.

pub mod render;
pub mod writer;

// Re-export commonly used items
pub use render::{dump_banner, dump_block, sanitize_file_stem};
pub use writer::{OutputWriter, SINGLE_FILE_STEM};
