use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use clamber_common::NodeId;
use neo4rs::{query, Row, Txn};
use tracing::debug;

use crate::backend::{GraphBackend, GraphTxn};
use crate::error::{GraphError, Result};
use crate::migrate;
use crate::wire::{nest, EdgeProbe, WireNode, WireTreeRecord};
use crate::GraphClient;

/// Bolt-backed store. Pages are `:Page {url, timestamp}` nodes, links are
/// `:LINKS` relationships, and the node id handed out is Memgraph's internal
/// `id(n)` rendered as a string.
#[derive(Clone)]
pub struct MemgraphBackend {
    client: GraphClient,
}

impl MemgraphBackend {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub async fn connect(uri: &str, user: &str, password: &str, pool_size: usize) -> Result<Self> {
        let client = GraphClient::connect(uri, user, password, pool_size)
            .await
            .map_err(|e| GraphError::BackendUnavailable(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl GraphBackend for MemgraphBackend {
    fn name(&self) -> &'static str {
        "memgraph"
    }

    async fn apply_schema(&self) -> Result<()> {
        migrate::migrate(&self.client)
            .await
            .map_err(|e| classify(e, GraphError::Schema))
    }

    async fn drop_all(&self) -> Result<()> {
        migrate::drop_all(&self.client)
            .await
            .map_err(|e| classify(e, |msg| GraphError::persistence("drop all", msg)))
    }

    async fn begin(&self) -> Result<Box<dyn GraphTxn>> {
        let txn = self
            .client
            .graph
            .start_txn()
            .await
            .map_err(|e| classify(e, GraphError::BackendUnavailable))?;
        Ok(Box::new(MemgraphTxn { txn }))
    }
}

struct MemgraphTxn {
    txn: Txn,
}

impl MemgraphTxn {
    async fn fetch_all(&mut self, q: neo4rs::Query) -> Result<Vec<Row>> {
        let mut stream = self
            .txn
            .execute(q)
            .await
            .map_err(|e| classify(e, GraphError::Query))?;
        let mut rows = Vec::new();
        while let Some(row) = stream
            .next(self.txn.handle())
            .await
            .map_err(|e| classify(e, GraphError::Query))?
        {
            rows.push(row);
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphTxn for MemgraphTxn {
    async fn find_tree(&mut self, url: &str, levels: u32) -> Result<Option<WireTreeRecord>> {
        let q = query(
            "MATCH (p:Page {url: $url})
             RETURN id(p) AS uid, p.url AS url, p.timestamp AS timestamp
             LIMIT 1",
        )
        .param("url", url);
        let Some(row) = self.fetch_all(q).await?.into_iter().next() else {
            return Ok(None);
        };
        let (root_raw, root) = row_to_node(&row)?;

        // Walk one hop per round-trip; each distinct node is expanded once.
        let mut adjacency: HashMap<NodeId, Vec<WireNode>> = HashMap::new();
        let mut expanded: HashSet<i64> = HashSet::new();
        let mut frontier = vec![root_raw];
        for _ in 1..levels.max(1) {
            frontier.retain(|id| expanded.insert(*id));
            if frontier.is_empty() {
                break;
            }
            let q = query(
                "UNWIND $ids AS pid
                 MATCH (p:Page)-[:LINKS]->(c:Page)
                 WHERE id(p) = pid
                 RETURN id(p) AS parent, id(c) AS uid, c.url AS url, c.timestamp AS timestamp
                 ORDER BY parent, uid",
            )
            .param("ids", frontier.clone());

            let mut next = Vec::new();
            for row in self.fetch_all(q).await? {
                let parent: i64 = row
                    .get("parent")
                    .map_err(|e| GraphError::Query(format!("malformed link row: {e}")))?;
                let (child_raw, child) = row_to_node(&row)?;
                next.push(child_raw);
                adjacency
                    .entry(NodeId::new(parent.to_string()))
                    .or_default()
                    .push(child);
            }
            frontier = next;
        }

        debug!(url, levels, expanded = expanded.len(), "Subtree fetched");
        Ok(Some(nest(&root, &adjacency, levels)))
    }

    async fn count_links(&mut self, parent: &NodeId, child: &NodeId) -> Result<EdgeProbe> {
        let q = query(
            "MATCH (p:Page)-[r:LINKS]->(c:Page)
             WHERE id(p) = $parent AND id(c) = $child
             RETURN count(r) AS matching",
        )
        .param("parent", raw_id(parent)?)
        .param("child", raw_id(child)?);

        let matching = match self.fetch_all(q).await?.first() {
            Some(row) => row
                .get::<i64>("matching")
                .map_err(|e| GraphError::Query(format!("malformed count row: {e}")))?,
            None => 0,
        };
        Ok(EdgeProbe { matching })
    }

    async fn create_node(&mut self, record: &WireTreeRecord) -> Result<NodeId> {
        let q = query(
            "CREATE (p:Page {url: $url, timestamp: $timestamp})
             RETURN id(p) AS uid",
        )
        .param("url", record.url.as_str())
        .param("timestamp", record.timestamp);

        let rows = self
            .fetch_all(q)
            .await
            .map_err(|e| e.in_context(format!("page {}", record.url)))?;
        let uid: i64 = rows
            .first()
            .ok_or_else(|| GraphError::persistence(format!("page {}", record.url), "no id returned"))?
            .get("uid")
            .map_err(|e| GraphError::persistence(format!("page {}", record.url), e))?;
        Ok(NodeId::new(uid.to_string()))
    }

    async fn create_link(&mut self, parent: &NodeId, child: &NodeId) -> Result<()> {
        let context = format!("edge {parent} -> {child}");
        let q = query(
            "MATCH (p:Page), (c:Page)
             WHERE id(p) = $parent AND id(c) = $child
             CREATE (p)-[:LINKS]->(c)
             RETURN count(*) AS created",
        )
        .param("parent", raw_id(parent)?)
        .param("child", raw_id(child)?);

        let rows = self
            .fetch_all(q)
            .await
            .map_err(|e| e.in_context(context.clone()))?;
        let created: i64 = rows.first().and_then(|r| r.get("created").ok()).unwrap_or(0);
        if created == 0 {
            return Err(GraphError::persistence(context, "endpoint node not found"));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn
            .commit()
            .await
            .map_err(|e| classify(e, |msg| GraphError::persistence("commit", msg)))
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        self.txn
            .rollback()
            .await
            .map_err(|e| classify(e, GraphError::BackendUnavailable))
    }
}

fn row_to_node(row: &Row) -> Result<(i64, WireNode)> {
    let malformed = |e: neo4rs::DeError| GraphError::Query(format!("malformed page row: {e}"));
    let raw: i64 = row.get("uid").map_err(malformed)?;
    let url: String = row.get("url").map_err(malformed)?;
    let timestamp: i64 = row.get("timestamp").unwrap_or(0);
    Ok((
        raw,
        WireNode {
            uid: NodeId::new(raw.to_string()),
            url,
            timestamp,
        },
    ))
}

fn raw_id(id: &NodeId) -> Result<i64> {
    id.as_str()
        .parse()
        .map_err(|_| GraphError::Query(format!("`{id}` is not a memgraph node id")))
}

/// Map a driver error onto the graph taxonomy. Conflicting-transaction and
/// uniqueness failures both mean another writer got there first.
fn classify(e: neo4rs::Error, fallback: impl FnOnce(String) -> GraphError) -> GraphError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if is_conflict_message(&lower) {
        GraphError::ConflictAbort
    } else if is_transport_message(&lower) {
        GraphError::BackendUnavailable(msg)
    } else {
        fallback(msg)
    }
}

fn is_conflict_message(lower: &str) -> bool {
    lower.contains("conflicting transactions")
        || lower.contains("serialization error")
        || lower.contains("unique constraint violation")
        || lower.contains("constraintvalidationfailed")
        || lower.contains("already exists with label")
        || lower.contains("deadlockdetected")
}

fn is_transport_message(lower: &str) -> bool {
    lower.contains("connection")
        || lower.contains("broken pipe")
        || lower.contains("io error")
        || lower.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_messages_are_recognised() {
        assert!(is_conflict_message(
            &"Cannot resolve conflicting transactions. You can retry this transaction when the conflicting transaction is finished".to_lowercase()
        ));
        assert!(is_conflict_message(
            &"Unable to commit due to unique constraint violation on :Page(url)".to_lowercase()
        ));
        assert!(!is_conflict_message("syntax error near match"));
    }

    #[test]
    fn transport_messages_are_recognised() {
        assert!(is_transport_message("connection refused"));
        assert!(!is_transport_message("unknown function"));
    }

    #[test]
    fn raw_id_rejects_foreign_ids() {
        assert_eq!(raw_id(&NodeId::from("42")).unwrap(), 42);
        assert!(matches!(raw_id(&NodeId::from("0x2a")), Err(GraphError::Query(_))));
    }
}
