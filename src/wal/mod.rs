//! Write-Ahead Log Module
//!
//! Append-only, line-delimited durable log of mutations. Every record is
//! serialized to one JSON line, appended, and fsynced before the mutation
//! is acknowledged; replay at open rebuilds in-memory state from the log.

pub mod record;
mod reader;
mod writer;

pub use record::{Version, WalRecord};
pub use reader::{replay, ReplayReport};
pub use writer::WalWriter;
