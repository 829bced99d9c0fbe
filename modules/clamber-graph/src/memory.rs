// In-process graph backend with optimistic transactions.
//
// Reads see the latest committed state. Writes are buffered per transaction
// and applied at commit, which fails with ConflictAbort when another
// transaction committed a write under the same conflict key after this one
// began (snapshot isolation, first committer wins). Conflict keys:
//   url:<url>               node creation (the url is upsert-keyed)
//   link:<parent>-><child>  edge creation
//
// Every operation yields once to mimic a network round-trip, so concurrent
// tasks interleave between read and commit the way real clients do.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use clamber_common::NodeId;
use tracing::debug;

use crate::backend::{GraphBackend, GraphTxn};
use crate::error::{GraphError, Result};
use crate::wire::{nest, EdgeProbe, WireNode, WireTreeRecord};

/// Failure to inject into the next write commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Conflict,
    Unavailable(String),
    Rejected(String),
}

impl Fault {
    fn into_error(self) -> GraphError {
        match self {
            Fault::Conflict => GraphError::ConflictAbort,
            Fault::Unavailable(msg) => GraphError::BackendUnavailable(msg),
            Fault::Rejected(msg) => GraphError::persistence("commit", msg),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredNode {
    url: String,
    timestamp: i64,
}

#[derive(Default)]
struct MemoryState {
    nodes: BTreeMap<u64, StoredNode>,
    links: HashMap<u64, Vec<u64>>,
    next_uid: u64,
    commit_ts: u64,
    last_write: HashMap<String, u64>,
    schema_applied: bool,
    faults: VecDeque<Fault>,
}

impl MemoryState {
    fn find_by_url(&self, url: &str) -> Option<u64> {
        self.nodes
            .iter()
            .find(|(_, n)| n.url == url)
            .map(|(uid, _)| *uid)
    }

    fn wire_node(&self, uid: u64) -> Option<WireNode> {
        self.nodes.get(&uid).map(|n| WireNode {
            uid: format_uid(uid),
            url: n.url.clone(),
            timestamp: n.timestamp,
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.state)
    }

    /// Make the next commit that carries writes fail with `fault`.
    /// Queued faults are consumed in order.
    pub fn fail_next_commit(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    pub fn schema_applied(&self) -> bool {
        self.lock().schema_applied
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Ids of every node stored under `url`; more than one means a duplicate.
    pub fn nodes_with_url(&self, url: &str) -> Vec<NodeId> {
        self.lock()
            .nodes
            .iter()
            .filter(|(_, n)| n.url == url)
            .map(|(uid, _)| format_uid(*uid))
            .collect()
    }

    /// Total number of edges, multi-edges counted individually.
    pub fn link_count(&self) -> usize {
        self.lock().links.values().map(Vec::len).sum()
    }

    /// Number of edges from `parent` to `child`.
    pub fn links_between(&self, parent: &NodeId, child: &NodeId) -> usize {
        let (Some(p), Some(c)) = (parse_uid(parent), parse_uid(child)) else {
            return 0;
        };
        self.lock()
            .links
            .get(&p)
            .map(|targets| targets.iter().filter(|t| **t == c).count())
            .unwrap_or(0)
    }

    /// Number of edges pointing at `child`.
    pub fn links_into(&self, child: &NodeId) -> usize {
        let Some(c) = parse_uid(child) else {
            return 0;
        };
        self.lock()
            .links
            .values()
            .map(|targets| targets.iter().filter(|t| **t == c).count())
            .sum()
    }
}

#[async_trait]
impl GraphBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn apply_schema(&self) -> Result<()> {
        tokio::task::yield_now().await;
        self.lock().schema_applied = true;
        Ok(())
    }

    async fn drop_all(&self) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.nodes.clear();
        state.links.clear();
        state.commit_ts += 1;
        debug!(backend = "memory", "Dropped all graph data");
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn GraphTxn>> {
        let start_ts = self.lock().commit_ts;
        Ok(Box::new(MemoryTxn {
            state: Arc::clone(&self.state),
            start_ts,
            pending: Vec::new(),
            keys: HashSet::new(),
        }))
    }
}

enum PendingWrite {
    Node { uid: u64, node: StoredNode },
    Link { parent: u64, child: u64 },
}

struct MemoryTxn {
    state: Arc<Mutex<MemoryState>>,
    start_ts: u64,
    pending: Vec<PendingWrite>,
    keys: HashSet<String>,
}

impl MemoryTxn {
    fn staged_node(&self, uid: u64) -> bool {
        self.pending
            .iter()
            .any(|w| matches!(w, PendingWrite::Node { uid: staged, .. } if *staged == uid))
    }
}

#[async_trait]
impl GraphTxn for MemoryTxn {
    async fn find_tree(&mut self, url: &str, levels: u32) -> Result<Option<WireTreeRecord>> {
        tokio::task::yield_now().await;
        let state = lock(&self.state);
        let Some((root_uid, root)) = state
            .find_by_url(url)
            .and_then(|uid| state.wire_node(uid).map(|node| (uid, node)))
        else {
            return Ok(None);
        };
        if levels <= 1 {
            return Ok(Some(WireTreeRecord::leaf(root.uid, root.url, root.timestamp)));
        }

        // Only nodes within reach are expanded, each once.
        let mut adjacency: HashMap<NodeId, Vec<WireNode>> = HashMap::new();
        let mut expanded = HashSet::new();
        let mut frontier = vec![root_uid];
        for _ in 1..levels {
            frontier.retain(|uid| expanded.insert(*uid));
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for parent in frontier {
                let Some(targets) = state.links.get(&parent) else { continue };
                let children = targets.iter().filter_map(|c| state.wire_node(*c)).collect();
                adjacency.insert(format_uid(parent), children);
                next.extend(targets.iter().copied());
            }
            frontier = next;
        }

        Ok(Some(nest(&root, &adjacency, levels)))
    }

    async fn count_links(&mut self, parent: &NodeId, child: &NodeId) -> Result<EdgeProbe> {
        tokio::task::yield_now().await;
        let (p, c) = (require_uid(parent)?, require_uid(child)?);
        let state = lock(&self.state);
        let matching = state
            .links
            .get(&p)
            .map(|targets| targets.iter().filter(|t| **t == c).count())
            .unwrap_or(0);
        Ok(EdgeProbe {
            matching: matching as i64,
        })
    }

    async fn create_node(&mut self, record: &WireTreeRecord) -> Result<NodeId> {
        tokio::task::yield_now().await;
        if record.url.is_empty() {
            return Err(GraphError::persistence("page", "url must not be empty"));
        }
        let uid = {
            let mut state = lock(&self.state);
            state.next_uid += 1;
            state.next_uid
        };
        self.keys.insert(format!("url:{}", record.url));
        self.pending.push(PendingWrite::Node {
            uid,
            node: StoredNode {
                url: record.url.clone(),
                timestamp: record.timestamp,
            },
        });
        Ok(format_uid(uid))
    }

    async fn create_link(&mut self, parent: &NodeId, child: &NodeId) -> Result<()> {
        tokio::task::yield_now().await;
        let (p, c) = (require_uid(parent)?, require_uid(child)?);
        {
            let state = lock(&self.state);
            for uid in [p, c] {
                if !state.nodes.contains_key(&uid) && !self.staged_node(uid) {
                    return Err(GraphError::persistence(
                        format!("edge {parent} -> {child}"),
                        "endpoint node not found",
                    ));
                }
            }
        }
        self.keys.insert(format!("link:{p}->{c}"));
        self.pending.push(PendingWrite::Link { parent: p, child: c });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        tokio::task::yield_now().await;
        if self.pending.is_empty() {
            return Ok(());
        }

        let shared = Arc::clone(&self.state);
        let mut state = lock(&shared);
        if let Some(fault) = state.faults.pop_front() {
            return Err(fault.into_error());
        }

        let conflicted = self
            .keys
            .iter()
            .any(|key| state.last_write.get(key).is_some_and(|ts| *ts > self.start_ts));
        if conflicted {
            return Err(GraphError::ConflictAbort);
        }

        state.commit_ts += 1;
        let ts = state.commit_ts;
        let MemoryTxn { pending, keys, .. } = *self;
        for key in keys {
            state.last_write.insert(key, ts);
        }
        for write in pending {
            match write {
                PendingWrite::Node { uid, node } => {
                    state.nodes.insert(uid, node);
                }
                PendingWrite::Link { parent, child } => {
                    state.links.entry(parent).or_default().push(child);
                }
            }
        }
        Ok(())
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn format_uid(uid: u64) -> NodeId {
    NodeId::new(format!("{uid:#x}"))
}

fn parse_uid(id: &NodeId) -> Option<u64> {
    u64::from_str_radix(id.as_str().strip_prefix("0x")?, 16).ok()
}

fn require_uid(id: &NodeId) -> Result<u64> {
    parse_uid(id).ok_or_else(|| GraphError::Query(format!("`{id}` is not a uid")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> WireTreeRecord {
        WireTreeRecord {
            url: url.to_string(),
            timestamp: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn uncommitted_nodes_are_invisible() {
        let backend = MemoryBackend::new();
        let mut txn = backend.begin().await.unwrap();
        txn.create_node(&record("http://a")).await.unwrap();
        txn.discard().await.unwrap();

        let mut reader = backend.begin().await.unwrap();
        assert!(reader.find_tree("http://a", 1).await.unwrap().is_none());
        assert_eq!(backend.node_count(), 0);
    }

    #[tokio::test]
    async fn first_committer_wins_on_same_url() {
        let backend = MemoryBackend::new();
        let mut first = backend.begin().await.unwrap();
        let mut second = backend.begin().await.unwrap();
        first.create_node(&record("http://a")).await.unwrap();
        second.create_node(&record("http://a")).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(backend.nodes_with_url("http://a").len(), 1);
    }

    #[tokio::test]
    async fn different_urls_do_not_conflict() {
        let backend = MemoryBackend::new();
        let mut first = backend.begin().await.unwrap();
        let mut second = backend.begin().await.unwrap();
        first.create_node(&record("http://a")).await.unwrap();
        second.create_node(&record("http://b")).await.unwrap();
        first.commit().await.unwrap();
        second.commit().await.unwrap();
        assert_eq!(backend.node_count(), 2);
    }

    #[tokio::test]
    async fn link_to_unknown_node_is_rejected() {
        let backend = MemoryBackend::new();
        let mut txn = backend.begin().await.unwrap();
        let a = txn.create_node(&record("http://a")).await.unwrap();
        let err = txn
            .create_link(&a, &NodeId::from("0x99"))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Persistence { .. }));
    }

    #[tokio::test]
    async fn injected_fault_hits_only_write_commits() {
        let backend = MemoryBackend::new();
        backend.fail_next_commit(Fault::Rejected("disk full".into()));

        let read_only = backend.begin().await.unwrap();
        read_only.commit().await.unwrap();

        let mut txn = backend.begin().await.unwrap();
        txn.create_node(&record("http://a")).await.unwrap();
        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, GraphError::Persistence { .. }));
        assert_eq!(backend.node_count(), 0);
    }

    #[tokio::test]
    async fn find_tree_only_expands_reachable_nodes() {
        let backend = MemoryBackend::new();
        let mut txn = backend.begin().await.unwrap();
        let a = txn.create_node(&record("http://a")).await.unwrap();
        let b = txn.create_node(&record("http://b")).await.unwrap();
        let x = txn.create_node(&record("http://x")).await.unwrap();
        let y = txn.create_node(&record("http://y")).await.unwrap();
        txn.create_link(&a, &b).await.unwrap();
        txn.create_link(&x, &y).await.unwrap();
        txn.commit().await.unwrap();

        let mut reader = backend.begin().await.unwrap();
        let root_only = reader.find_tree("http://a", 1).await.unwrap().unwrap();
        assert_eq!(root_only, WireTreeRecord::leaf(a.clone(), "http://a", 1));

        let two = reader.find_tree("http://a", 2).await.unwrap().unwrap();
        assert_eq!(two.size(), 2);
        assert_eq!(two.links[0].url, "http://b");
    }

    #[test]
    fn uids_round_trip_through_hex() {
        let id = format_uid(42);
        assert_eq!(id.as_str(), "0x2a");
        assert_eq!(parse_uid(&id), Some(42));
        assert_eq!(parse_uid(&NodeId::from("42")), None);
    }
}
