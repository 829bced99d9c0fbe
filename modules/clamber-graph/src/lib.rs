pub mod backend;
pub mod client;
pub mod codec;
pub mod error;
pub mod memgraph;
pub mod memory;
pub mod migrate;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod wire;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use backend::{GraphBackend, GraphTxn};
pub use client::GraphClient;
pub use error::GraphError;
pub use memgraph::MemgraphBackend;
pub use memory::{Fault, MemoryBackend};
pub use resolver::EdgeOutcome;
pub use retry::RetryPolicy;
pub use store::{EdgeStatus, GraphStore, PageStore, StoreOptions, SyncReport};
pub use wire::{EdgeProbe, WireTreeRecord};
