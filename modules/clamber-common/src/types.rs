use std::collections::BTreeSet;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

// --- Identifiers ---

/// Backend-assigned identifier of a persisted page node. Opaque to callers:
/// only the backend that issued it knows how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Index of a page inside its owning [`PageTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageIdx(usize);

impl PageIdx {
    pub const ROOT: PageIdx = PageIdx(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Seconds since the Unix epoch, the resolution pages are stamped with.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

// --- Page ---

/// A crawled page. `depth` counts hops from the root of the tree the page
/// belongs to (root = 0). `parent` is a plain index into the owning tree;
/// the tree, not the parent, owns every page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub node_id: Option<NodeId>,
    pub depth: u32,
    pub timestamp: i64,
    pub parent: Option<PageIdx>,
    pub children: Vec<PageIdx>,
}

impl Page {
    pub fn new(url: impl Into<String>, timestamp: i64) -> Self {
        Self {
            url: url.into(),
            node_id: None,
            depth: 0,
            timestamp,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_node_id(mut self, id: NodeId) -> Self {
        self.node_id = Some(id);
        self
    }
}

// --- PageTree ---

/// Arena holding a rooted page tree. Index 0 is always the root.
///
/// The same URL may appear more than once (once per parent that links to
/// it); every occurrence is a distinct page with its own parent.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTree {
    pages: Vec<Page>,
}

impl PageTree {
    pub fn new(mut root: Page) -> Self {
        root.depth = 0;
        root.parent = None;
        root.children.clear();
        Self { pages: vec![root] }
    }

    pub fn root(&self) -> PageIdx {
        PageIdx::ROOT
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, idx: PageIdx) -> Option<&Page> {
        self.pages.get(idx.0)
    }

    pub fn view(&self, idx: PageIdx) -> Option<PageRef<'_>> {
        self.pages.get(idx.0).map(|_| PageRef { tree: self, idx })
    }

    pub fn root_page(&self) -> &Page {
        &self.pages[0]
    }

    /// Append a new child under `parent`. Returns `None` if `parent` is not
    /// part of this tree.
    pub fn add_child(
        &mut self,
        parent: PageIdx,
        url: impl Into<String>,
        timestamp: i64,
    ) -> Option<PageIdx> {
        let depth = self.pages.get(parent.0)?.depth + 1;
        let idx = PageIdx(self.pages.len());
        self.pages.push(Page {
            url: url.into(),
            node_id: None,
            depth,
            timestamp,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.pages[parent.0].children.push(idx);
        Some(idx)
    }

    pub fn set_node_id(&mut self, idx: PageIdx, id: NodeId) {
        if let Some(page) = self.pages.get_mut(idx.0) {
            page.node_id = Some(id);
        }
    }

    /// Move every page of `subtree` under `parent`, re-indexing as needed.
    /// Returns the new index of the subtree's root.
    pub fn graft(&mut self, parent: PageIdx, subtree: PageTree) -> Option<PageIdx> {
        let base_depth = self.pages.get(parent.0)?.depth + 1;
        let offset = self.pages.len();
        for mut page in subtree.pages {
            page.depth += base_depth;
            page.parent = Some(match page.parent {
                Some(p) => PageIdx(p.0 + offset),
                None => parent,
            });
            for child in &mut page.children {
                child.0 += offset;
            }
            self.pages.push(page);
        }
        let grafted = PageIdx(offset);
        self.pages[parent.0].children.push(grafted);
        Some(grafted)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PageIdx, &Page)> {
        self.pages.iter().enumerate().map(|(i, p)| (PageIdx(i), p))
    }

    /// Distinct URLs present in the tree.
    pub fn urls(&self) -> BTreeSet<String> {
        self.pages.iter().map(|p| p.url.clone()).collect()
    }

    /// Distinct (parent url, child url) pairs present in the tree.
    pub fn edges(&self) -> BTreeSet<(String, String)> {
        self.pages
            .iter()
            .filter_map(|p| {
                let parent = p.parent?;
                Some((self.pages[parent.0].url.clone(), p.url.clone()))
            })
            .collect()
    }

    /// Deepest level present, root = 0.
    pub fn max_depth(&self) -> u32 {
        self.pages.iter().map(|p| p.depth).max().unwrap_or(0)
    }
}

/// Borrowed view of one page that can walk up to its parent.
#[derive(Debug, Clone, Copy)]
pub struct PageRef<'a> {
    tree: &'a PageTree,
    idx: PageIdx,
}

impl<'a> PageRef<'a> {
    pub fn idx(&self) -> PageIdx {
        self.idx
    }

    pub fn page(&self) -> &'a Page {
        &self.tree.pages[self.idx.0]
    }

    pub fn url(&self) -> &'a str {
        &self.page().url
    }

    pub fn timestamp(&self) -> i64 {
        self.page().timestamp
    }

    pub fn depth(&self) -> u32 {
        self.page().depth
    }

    pub fn node_id(&self) -> Option<&'a NodeId> {
        self.page().node_id.as_ref()
    }

    pub fn parent(&self) -> Option<PageRef<'a>> {
        self.page().parent.map(|idx| PageRef {
            tree: self.tree,
            idx,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = PageRef<'a>> + 'a {
        let tree = self.tree;
        self.page()
            .children
            .iter()
            .map(move |&idx| PageRef { tree, idx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> PageTree {
        let mut tree = PageTree::new(Page::new("http://example.edu", 1));
        let a = tree.add_child(tree.root(), "http://example.edu/a", 2).unwrap();
        tree.add_child(a, "http://example.edu/a/b", 3).unwrap();
        tree
    }

    #[test]
    fn add_child_sets_depth_and_parent() {
        let tree = chain();
        let b = tree.view(PageIdx(2)).unwrap();
        assert_eq!(b.depth(), 2);
        assert_eq!(b.parent().unwrap().url(), "http://example.edu/a");
        assert_eq!(b.parent().unwrap().parent().unwrap().url(), "http://example.edu");
        assert!(tree.view(tree.root()).unwrap().parent().is_none());
    }

    #[test]
    fn add_child_rejects_unknown_parent() {
        let mut tree = chain();
        assert!(tree.add_child(PageIdx(42), "http://example.edu/x", 0).is_none());
    }

    #[test]
    fn graft_reindexes_subtree() {
        let mut tree = PageTree::new(Page::new("root", 0));
        let sub = chain();
        let grafted = tree.graft(tree.root(), sub).unwrap();

        assert_eq!(tree.len(), 4);
        let view = tree.view(grafted).unwrap();
        assert_eq!(view.url(), "http://example.edu");
        assert_eq!(view.depth(), 1);
        assert_eq!(view.parent().unwrap().url(), "root");

        let deepest: Vec<_> = view.children().flat_map(|c| c.children().collect::<Vec<_>>()).collect();
        assert_eq!(deepest.len(), 1);
        assert_eq!(deepest[0].url(), "http://example.edu/a/b");
        assert_eq!(deepest[0].depth(), 3);
        assert_eq!(tree.max_depth(), 3);
    }

    #[test]
    fn edges_dedupe_repeated_pairs() {
        let mut tree = PageTree::new(Page::new("r", 0));
        tree.add_child(tree.root(), "s", 0);
        tree.add_child(tree.root(), "s", 0);
        assert_eq!(tree.edges().len(), 1);
        assert_eq!(tree.urls().len(), 2);
    }

    #[test]
    fn node_id_serializes_transparently() {
        let id = NodeId::from("0x2a");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0x2a\"");
    }
}
