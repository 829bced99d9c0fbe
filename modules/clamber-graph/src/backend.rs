// Capability traits over a transactional graph store.
//
// GraphBackend is what the resolvers and the store are written against.
// MemgraphBackend talks bolt through neo4rs; MemoryBackend keeps everything
// in-process with the same optimistic-commit behaviour so races can be
// exercised without Docker.

use async_trait::async_trait;
use clamber_common::NodeId;

use crate::error::Result;
use crate::wire::{EdgeProbe, WireTreeRecord};

#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Declare the url index/uniqueness, timestamp and links edge type.
    /// Safe to call repeatedly.
    async fn apply_schema(&self) -> Result<()>;

    /// Remove every node and edge.
    async fn drop_all(&self) -> Result<()>;

    /// Open a new transaction. Each logical operation uses its own.
    async fn begin(&self) -> Result<Box<dyn GraphTxn>>;
}

#[async_trait]
pub trait GraphTxn: Send {
    /// Node whose url equals `url`, expanded along outgoing links to at most
    /// `levels` levels (root = level 1).
    async fn find_tree(&mut self, url: &str, levels: u32) -> Result<Option<WireTreeRecord>>;

    /// Count of `parent`'s outgoing links that point at `child`.
    async fn count_links(&mut self, parent: &NodeId, child: &NodeId) -> Result<EdgeProbe>;

    /// Stage creation of a single node. The returned id is only meaningful
    /// once the transaction commits.
    async fn create_node(&mut self, record: &WireTreeRecord) -> Result<NodeId>;

    /// Stage a directed `parent -[links]-> child` edge.
    async fn create_link(&mut self, parent: &NodeId, child: &NodeId) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn discard(self: Box<Self>) -> Result<()>;
}
