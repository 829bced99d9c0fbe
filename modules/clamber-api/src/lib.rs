use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tracing::info;

use clamber_common::{BackendKind, Config};
use clamber_crawler::{Crawler, HttpFetcher, PageFetcher};
use clamber_graph::{
    GraphBackend, GraphStore, MemgraphBackend, MemoryBackend, PageStore, RetryPolicy, StoreOptions,
};

pub mod rest;

pub struct AppState {
    pub store: Arc<dyn PageStore>,
    pub crawler: Crawler,
    /// Largest `depth` accepted by `/search`.
    pub max_depth: u32,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PageStore>,
        fetcher: Arc<dyn PageFetcher>,
        concurrency: usize,
        max_depth: u32,
    ) -> Self {
        Self {
            crawler: Crawler::new(fetcher, store.clone(), concurrency),
            store,
            max_depth,
        }
    }

    /// Connect the configured backend and wire up a live HTTP fetcher.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let backend: Arc<dyn GraphBackend> = match config.backend {
            BackendKind::Memgraph => Arc::new(
                MemgraphBackend::connect(
                    &config.graph_uri,
                    &config.graph_user,
                    &config.graph_password,
                    config.graph_pool_size,
                )
                .await?,
            ),
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        info!(backend = backend.name(), "Graph backend ready");

        let options = StoreOptions {
            retry: RetryPolicy::default().with_max_attempts(config.resolve_max_attempts),
            call_timeout: config.graph_call_timeout,
        };
        let store = Arc::new(GraphStore::new(backend, options));
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);

        Ok(Self::new(
            store,
            fetcher,
            config.crawl_concurrency,
            config.crawl_max_depth,
        ))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        .route("/search", get(rest::api_search))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // method + path only, query strings carry crawl targets
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
