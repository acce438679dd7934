//! Storage Engine Module
//!
//! The single-node store: an in-memory key-value map made durable by the
//! WAL, plus two derived search indexes (inverted full-text and
//! bag-of-words embedding) rebuilt from the log at open.

pub mod engine;
pub mod index;

pub use engine::{KvEngine, WriteOptions};
pub use index::{Embedding, EMBEDDING_DIM};
