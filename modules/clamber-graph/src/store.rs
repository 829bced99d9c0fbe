use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clamber_common::{NodeId, Page, PageRef, PageTree};
use tracing::{info, warn};

use crate::backend::GraphBackend;
use crate::codec;
use crate::error::Result;
use crate::resolver::{self, within, EdgeOutcome};
use crate::retry::RetryPolicy;

/// Everything the crawler and the API need from the page graph.
#[async_trait]
pub trait PageStore: Send + Sync {
    async fn set_schema(&self) -> Result<()>;

    async fn delete_all(&self) -> Result<()>;

    async fn find_or_create_node(&self, page: &Page) -> Result<NodeId>;

    async fn ensure_edge(&self, parent: &NodeId, child: &NodeId) -> Result<EdgeOutcome>;

    /// Persist one crawled page and, when it has a parent, the link to it.
    async fn sync(&self, page: PageRef<'_>) -> Result<SyncReport>;

    /// The subtree rooted at `url`, at most `max_depth` hops deep.
    async fn find_subtree(&self, url: &str, max_depth: u32) -> Result<Option<PageTree>>;
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub retry: RetryPolicy,
    /// Deadline for each individual backend round-trip.
    pub call_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// What happened to the parent link during a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeStatus {
    /// The page has no parent.
    Root,
    Linked(EdgeOutcome),
    /// Both nodes were persisted but the edge write failed.
    Missing(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub node_id: NodeId,
    pub parent_id: Option<NodeId>,
    pub edge: EdgeStatus,
}

/// [`PageStore`] over any [`GraphBackend`]. Holds no per-url cache: every
/// resolution goes back to the backend.
#[derive(Clone)]
pub struct GraphStore {
    backend: Arc<dyn GraphBackend>,
    options: StoreOptions,
}

impl GraphStore {
    pub fn new(backend: Arc<dyn GraphBackend>, options: StoreOptions) -> Self {
        Self { backend, options }
    }
}

#[async_trait]
impl PageStore for GraphStore {
    async fn set_schema(&self) -> Result<()> {
        within(self.options.call_timeout, self.backend.apply_schema()).await?;
        info!(backend = self.backend.name(), "Schema applied");
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        within(self.options.call_timeout, self.backend.drop_all()).await
    }

    async fn find_or_create_node(&self, page: &Page) -> Result<NodeId> {
        resolver::find_or_create_node(self.backend.as_ref(), &self.options, page).await
    }

    async fn ensure_edge(&self, parent: &NodeId, child: &NodeId) -> Result<EdgeOutcome> {
        resolver::ensure_edge(self.backend.as_ref(), &self.options, parent, child).await
    }

    async fn sync(&self, page: PageRef<'_>) -> Result<SyncReport> {
        let node_id = self
            .find_or_create_node(page.page())
            .await
            .inspect_err(|e| warn!(url = page.url(), error = %e, "Failed to persist page"))?;

        let Some(parent) = page.parent() else {
            return Ok(SyncReport {
                node_id,
                parent_id: None,
                edge: EdgeStatus::Root,
            });
        };

        let parent_id = self
            .find_or_create_node(parent.page())
            .await
            .inspect_err(|e| warn!(url = parent.url(), error = %e, "Failed to persist parent page"))?;

        // Node data is already committed; a failed edge only shrinks the graph.
        let edge = match self.ensure_edge(&parent_id, &node_id).await {
            Ok(outcome) => EdgeStatus::Linked(outcome),
            Err(e) => {
                warn!(
                    parent = parent.url(),
                    child = page.url(),
                    error = %e,
                    "Failed to link pages"
                );
                EdgeStatus::Missing(e.to_string())
            }
        };

        Ok(SyncReport {
            node_id,
            parent_id: Some(parent_id),
            edge,
        })
    }

    async fn find_subtree(&self, url: &str, max_depth: u32) -> Result<Option<PageTree>> {
        let limit = self.options.call_timeout;
        let mut txn = within(limit, self.backend.begin()).await?;
        // The root counts as a level of its own.
        let fetched = within(limit, txn.find_tree(url, max_depth.saturating_add(1))).await;
        if let Err(e) = within(limit, txn.discard()).await {
            warn!(url, error = %e, "Failed to discard read transaction");
        }

        match fetched? {
            Some(record) => Ok(Some(codec::decode(record).await?)),
            None => Ok(None),
        }
    }
}
