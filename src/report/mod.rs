//! Presentation of results for the host: log entries, output tables and
//! output naming.

pub mod format;
pub mod tables;

pub use format::*;
pub use tables::*;
