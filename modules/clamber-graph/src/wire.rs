//! Records exchanged with the graph backend.

use std::collections::HashMap;

use clamber_common::NodeId;
use serde::{Deserialize, Serialize};

/// Serialized page node. Mutations carry a single record with no `uid` and
/// no `links`; query results nest `links` down to the requested depth.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireTreeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<NodeId>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<WireTreeRecord>,
}

impl WireTreeRecord {
    pub fn leaf(uid: NodeId, url: impl Into<String>, timestamp: i64) -> Self {
        Self {
            uid: Some(uid),
            url: url.into(),
            timestamp,
            links: Vec::new(),
        }
    }

    /// Number of records in this subtree, root included.
    pub fn size(&self) -> usize {
        1 + self.links.iter().map(WireTreeRecord::size).sum::<usize>()
    }
}

/// Answer to "how many of parent's outgoing links point at child".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeProbe {
    pub matching: i64,
}

impl EdgeProbe {
    pub fn exists(&self) -> bool {
        self.matching > 0
    }
}

/// A persisted node as seen by a traversal, before nesting.
#[derive(Debug, Clone, PartialEq)]
pub struct WireNode {
    pub uid: NodeId,
    pub url: String,
    pub timestamp: i64,
}

/// Nest a flat adjacency list into a record tree of at most `levels` levels
/// (the root is level 1). A node already on the current root-to-leaf path is
/// never expanded again, so cycles terminate.
pub fn nest(
    root: &WireNode,
    adjacency: &HashMap<NodeId, Vec<WireNode>>,
    levels: u32,
) -> WireTreeRecord {
    let mut path = Vec::new();
    nest_path(root, adjacency, levels, &mut path)
}

fn nest_path(
    node: &WireNode,
    adjacency: &HashMap<NodeId, Vec<WireNode>>,
    remaining: u32,
    path: &mut Vec<NodeId>,
) -> WireTreeRecord {
    let mut record = WireTreeRecord::leaf(node.uid.clone(), node.url.clone(), node.timestamp);
    if remaining <= 1 {
        return record;
    }

    path.push(node.uid.clone());
    for child in adjacency.get(&node.uid).into_iter().flatten() {
        if path.contains(&child.uid) {
            continue;
        }
        record
            .links
            .push(nest_path(child, adjacency, remaining - 1, path));
    }
    path.pop();

    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(uid: &str) -> WireNode {
        WireNode {
            uid: NodeId::from(uid),
            url: format!("http://example.edu/{uid}"),
            timestamp: 0,
        }
    }

    fn adjacency(edges: &[(&str, &str)]) -> HashMap<NodeId, Vec<WireNode>> {
        let mut map: HashMap<NodeId, Vec<WireNode>> = HashMap::new();
        for (p, c) in edges {
            map.entry(NodeId::from(*p)).or_default().push(node(c));
        }
        map
    }

    #[test]
    fn one_level_is_root_only() {
        let adj = adjacency(&[("a", "b")]);
        let tree = nest(&node("a"), &adj, 1);
        assert!(tree.links.is_empty());
        assert_eq!(tree.uid, Some(NodeId::from("a")));
    }

    #[test]
    fn levels_bound_the_chain() {
        let adj = adjacency(&[("a", "b"), ("b", "c"), ("c", "d")]);
        assert_eq!(nest(&node("a"), &adj, 2).size(), 2);
        assert_eq!(nest(&node("a"), &adj, 3).size(), 3);
        assert_eq!(nest(&node("a"), &adj, 10).size(), 4);
    }

    #[test]
    fn cycles_are_not_followed() {
        let adj = adjacency(&[("a", "b"), ("b", "a"), ("b", "b")]);
        let tree = nest(&node("a"), &adj, 10);
        assert_eq!(tree.size(), 2);
    }

    #[test]
    fn shared_child_appears_under_each_parent() {
        let adj = adjacency(&[("r", "a"), ("r", "b"), ("a", "s"), ("b", "s")]);
        let tree = nest(&node("r"), &adj, 3);
        assert_eq!(tree.size(), 5);
    }

    #[test]
    fn mutation_payload_omits_uid_and_links() {
        let record = WireTreeRecord {
            url: "http://example.edu".into(),
            timestamp: 7,
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"url": "http://example.edu", "timestamp": 7}));
    }
}
