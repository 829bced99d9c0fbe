// PageFetcher is the crawler's only way onto the network. HttpFetcher is the
// live implementation; tests use testing::MockFetcher.

use std::time::Duration;

use async_trait::async_trait;
use clamber_common::ClamberError;
use tracing::debug;

use crate::links;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Normalised child links of the page at `url`. Pages that are not
    /// `text/html` have no links.
    async fn fetch_links(&self, url: &str, allow_external: bool)
        -> Result<Vec<String>, ClamberError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ClamberError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("clamber/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClamberError::Fetch(format!("building http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_links(
        &self,
        url: &str,
        allow_external: bool,
    ) -> Result<Vec<String>, ClamberError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClamberError::Fetch(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClamberError::Fetch(format!("{url}: HTTP {status}")));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !is_html_content_type(content_type) {
            debug!(url, content_type, "Skipping non-HTML response");
            return Ok(Vec::new());
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ClamberError::Fetch(format!("{url}: reading body: {e}")))?;
        Ok(links::extract_child_links(&body, url, allow_external))
    }
}

fn is_html_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/html"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_content_types() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("TEXT/HTML"));
        assert!(!is_html_content_type("application/json"));
        assert!(!is_html_content_type("text/plain"));
        assert!(!is_html_content_type(""));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_a_fetch_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher
            .fetch_links("ftp://example.edu/file.txt", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ClamberError::Fetch(_)));
    }
}
