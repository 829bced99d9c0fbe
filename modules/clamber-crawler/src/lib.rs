pub mod crawler;
pub mod fetcher;
pub mod links;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use crawler::{CrawlOptions, CrawlOutcome, Crawler};
pub use fetcher::{HttpFetcher, PageFetcher};
