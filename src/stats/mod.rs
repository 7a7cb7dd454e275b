//! Modem line statistics: the record data model and the status page parser.
//!
//! Each poll produces one [`StatsRecord`] from the raw status content served
//! by the modem. Records are handed to the output writer and then dropped.

pub mod data;
pub mod parser;

// Re-export commonly used items
pub use data::{RawStatus, StatsRecord, Uptime, FIELD_LABELS};
pub use parser::StatsParser;
