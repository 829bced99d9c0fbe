//! Conversion between [`PageTree`] and [`WireTreeRecord`].

use clamber_common::{Page, PageIdx, PageTree};
use futures::future::{BoxFuture, FutureExt};
use tokio::task::JoinSet;

use crate::error::{GraphError, Result};
use crate::wire::WireTreeRecord;

/// Mutation payload for a single page: url and timestamp, never children.
pub fn encode(page: &Page) -> WireTreeRecord {
    WireTreeRecord {
        uid: None,
        url: page.url.clone(),
        timestamp: page.timestamp,
        links: Vec::new(),
    }
}

/// Nested record for a whole tree, e.g. for an API response. Child order
/// follows the tree's children order.
pub fn encode_tree(tree: &PageTree) -> WireTreeRecord {
    encode_subtree(tree, tree.root())
}

fn encode_subtree(tree: &PageTree, idx: PageIdx) -> WireTreeRecord {
    let Some(page) = tree.get(idx) else {
        return WireTreeRecord::default();
    };
    WireTreeRecord {
        uid: page.node_id.clone(),
        url: page.url.clone(),
        timestamp: page.timestamp,
        links: page
            .children
            .iter()
            .map(|child| encode_subtree(tree, *child))
            .collect(),
    }
}

/// Rebuild a page tree from a nested query result.
///
/// Every child subtree is decoded in its own task and grafted under its
/// parent as the tasks finish, so sibling order follows completion order,
/// not payload order. Callers must not rely on it. The returned tree is
/// complete: the parent waits for all of its children before returning, and
/// an early error drops the `JoinSet`, aborting whatever is still running.
pub fn decode(record: WireTreeRecord) -> BoxFuture<'static, Result<PageTree>> {
    async move {
        let WireTreeRecord {
            uid,
            url,
            timestamp,
            links,
        } = record;

        let mut root = Page::new(url, timestamp);
        root.node_id = uid;
        let mut tree = PageTree::new(root);
        let root_idx = tree.root();

        let mut tasks = JoinSet::new();
        for child in links {
            tasks.spawn(decode(child));
        }
        while let Some(joined) = tasks.join_next().await {
            let subtree = joined
                .map_err(|e| GraphError::Query(format!("decode task failed: {e}")))??;
            tree.graft(root_idx, subtree);
        }

        Ok(tree)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use clamber_common::NodeId;

    use super::*;

    fn record(uid: &str, url: &str, links: Vec<WireTreeRecord>) -> WireTreeRecord {
        WireTreeRecord {
            uid: Some(NodeId::from(uid)),
            url: url.to_string(),
            timestamp: 100,
            links,
        }
    }

    #[test]
    fn encode_carries_only_url_and_timestamp() {
        let page = Page::new("http://example.edu", 42).with_node_id(NodeId::from("0x1"));
        let record = encode(&page);
        assert_eq!(record.url, "http://example.edu");
        assert_eq!(record.timestamp, 42);
        assert!(record.uid.is_none());
        assert!(record.links.is_empty());
    }

    #[tokio::test]
    async fn decode_rebuilds_fan_out() {
        let wire = record(
            "0x1",
            "r",
            vec![
                record("0x2", "a", vec![record("0x4", "c", vec![])]),
                record("0x3", "b", vec![]),
                record("0x5", "d", vec![record("0x6", "e", vec![]), record("0x7", "f", vec![])]),
            ],
        );

        let tree = decode(wire).await.unwrap();
        assert_eq!(tree.len(), 7);
        assert_eq!(tree.root_page().node_id, Some(NodeId::from("0x1")));
        assert_eq!(tree.root_page().children.len(), 3);

        let expected: BTreeSet<(String, String)> = [
            ("r", "a"),
            ("r", "b"),
            ("r", "d"),
            ("a", "c"),
            ("d", "e"),
            ("d", "f"),
        ]
        .iter()
        .map(|(p, c)| (p.to_string(), c.to_string()))
        .collect();
        assert_eq!(tree.edges(), expected);
    }

    #[tokio::test]
    async fn decode_sets_depth_and_parent() {
        let wire = record("0x1", "r", vec![record("0x2", "a", vec![record("0x3", "b", vec![])])]);
        let tree = decode(wire).await.unwrap();

        let (idx, leaf) = tree.iter().find(|(_, p)| p.url == "b").unwrap();
        assert_eq!(leaf.depth, 2);
        let view = tree.view(idx).unwrap();
        assert_eq!(view.parent().unwrap().url(), "a");
        assert_eq!(view.parent().unwrap().parent().unwrap().url(), "r");
    }

    #[tokio::test]
    async fn encode_tree_mirrors_decoded_shape() {
        let wire = record("0x1", "r", vec![record("0x2", "a", vec![]), record("0x3", "b", vec![])]);
        let tree = decode(wire.clone()).await.unwrap();
        let encoded = encode_tree(&tree);

        assert_eq!(encoded.uid, wire.uid);
        assert_eq!(encoded.size(), 3);
        let mut urls: Vec<_> = encoded.links.iter().map(|l| l.url.as_str()).collect();
        urls.sort();
        assert_eq!(urls, vec!["a", "b"]);
    }
}
