// Breadth-first crawl that persists every discovered page as it goes.
//
// Each level is fetched concurrently, then every (parent, link) pair becomes
// a child page in the tree and is synced to the store. A url reached through
// several parents therefore shows up once per parent in the tree, which is
// what preserves every edge; only its first occurrence is expanded further.

use std::collections::HashSet;
use std::sync::Arc;

use clamber_common::{now_timestamp, Page, PageIdx, PageTree};
use clamber_graph::{EdgeStatus, PageStore, SyncReport};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::fetcher::PageFetcher;

#[derive(Debug, Clone, Copy)]
pub struct CrawlOptions {
    /// Hops from the root page. Zero persists the root alone.
    pub max_depth: u32,
    pub allow_external_links: bool,
}

#[derive(Debug)]
pub struct CrawlOutcome {
    /// Everything discovered, with node ids filled in for synced pages.
    pub tree: PageTree,
    pub synced: usize,
    pub sync_failed: usize,
    pub fetch_failed: usize,
    /// Pages that were persisted but whose parent link could not be written.
    pub missing_edges: usize,
}

pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn PageStore>,
    concurrency: usize,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, store: Arc<dyn PageStore>, concurrency: usize) -> Self {
        Self {
            fetcher,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Crawl from `root_url`. Fetch and sync failures are logged and counted;
    /// they never abort the crawl.
    pub async fn crawl(&self, root_url: &str, options: CrawlOptions) -> CrawlOutcome {
        let mut outcome = CrawlOutcome {
            tree: PageTree::new(Page::new(root_url, now_timestamp())),
            synced: 0,
            sync_failed: 0,
            fetch_failed: 0,
            missing_edges: 0,
        };
        info!(root = root_url, max_depth = options.max_depth, "Crawl started");

        let root = outcome.tree.root();
        self.sync_pages(&mut outcome, &[root]).await;

        let mut expanded = HashSet::from([root_url.to_string()]);
        let mut frontier = vec![root];

        for depth in 0..options.max_depth {
            if frontier.is_empty() {
                break;
            }
            let discovered = self
                .expand_level(&mut outcome, &frontier, options.allow_external_links)
                .await;
            info!(depth = depth + 1, pages = discovered.len(), "Level discovered");

            self.sync_pages(&mut outcome, &discovered).await;

            frontier = discovered
                .into_iter()
                .filter(|&idx| {
                    outcome
                        .tree
                        .get(idx)
                        .is_some_and(|page| expanded.insert(page.url.clone()))
                })
                .collect();
        }

        info!(
            root = root_url,
            pages = outcome.tree.len(),
            synced = outcome.synced,
            sync_failed = outcome.sync_failed,
            fetch_failed = outcome.fetch_failed,
            missing_edges = outcome.missing_edges,
            "Crawl finished"
        );
        outcome
    }

    /// Fetch every frontier page and add its links as children.
    async fn expand_level(
        &self,
        outcome: &mut CrawlOutcome,
        frontier: &[PageIdx],
        allow_external: bool,
    ) -> Vec<PageIdx> {
        let jobs: Vec<(PageIdx, String)> = frontier
            .iter()
            .filter_map(|&idx| Some((idx, outcome.tree.get(idx)?.url.clone())))
            .collect();
        let mut fetched: Vec<_> = stream::iter(jobs.into_iter().map(|(idx, url)| {
            let fetcher = Arc::clone(&self.fetcher);
            async move {
                let links = fetcher.fetch_links(&url, allow_external).await;
                (idx, url, links)
            }
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;
        // Completion order is arbitrary; keep the tree in frontier order.
        fetched.sort_by_key(|(idx, _, _)| idx.index());

        let mut discovered = Vec::new();
        for (idx, url, links) in fetched {
            match links {
                Ok(links) => {
                    for link in links {
                        if let Some(child) = outcome.tree.add_child(idx, link, now_timestamp()) {
                            discovered.push(child);
                        }
                    }
                }
                Err(e) => {
                    warn!(url, error = %e, "Failed to fetch page");
                    outcome.fetch_failed += 1;
                }
            }
        }
        discovered
    }

    async fn sync_pages(&self, outcome: &mut CrawlOutcome, pages: &[PageIdx]) {
        // Sync tasks read a snapshot; node ids are written back afterwards.
        let snapshot = Arc::new(outcome.tree.clone());
        let reports: Vec<_> = stream::iter(pages.iter().copied().map(|idx| {
            sync_page(Arc::clone(&self.store), Arc::clone(&snapshot), idx)
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        for (idx, url, report) in reports.into_iter().flatten() {
            match report {
                Ok(report) => {
                    if let EdgeStatus::Missing(_) = report.edge {
                        outcome.missing_edges += 1;
                    }
                    outcome.tree.set_node_id(idx, report.node_id);
                    outcome.synced += 1;
                }
                Err(e) => {
                    warn!(url, error = %e, "Failed to sync page");
                    outcome.sync_failed += 1;
                }
            }
        }
    }
}

/// Sync one page of `tree`. `None` when `idx` is not in the tree.
async fn sync_page(
    store: Arc<dyn PageStore>,
    tree: Arc<PageTree>,
    idx: PageIdx,
) -> Option<(PageIdx, String, clamber_graph::error::Result<SyncReport>)> {
    let page = tree.view(idx)?;
    let report = store.sync(page).await;
    Some((idx, page.url().to_string(), report))
}
