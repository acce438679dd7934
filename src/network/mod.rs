//! Network Module
//!
//! TCP transport for the wire protocol: an async server exposing an
//! engine, and a blocking client used by tooling and remote peers.

mod client;
mod server;

pub use client::KvClient;
pub use server::{execute, KvServer};
