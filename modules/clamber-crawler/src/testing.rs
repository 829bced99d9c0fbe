// Test double for PageFetcher.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use clamber_common::ClamberError;

use crate::fetcher::PageFetcher;

/// HashMap-based link fetcher. Returns `Err` for unregistered URLs.
/// External links are registered like any other; `allow_external` is ignored.
pub struct MockFetcher {
    pages: HashMap<String, Vec<String>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    pub fn on_page(mut self, url: &str, links: &[&str]) -> Self {
        self.pages
            .insert(url.to_string(), links.iter().map(|l| l.to_string()).collect());
        self
    }

    /// How many times `url` was fetched.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch_links(
        &self,
        url: &str,
        _allow_external: bool,
    ) -> Result<Vec<String>, ClamberError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        tokio::task::yield_now().await;
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ClamberError::Fetch(format!("no page registered for {url}")))
    }
}
