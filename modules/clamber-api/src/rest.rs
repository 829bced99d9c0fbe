use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use clamber_crawler::{links, CrawlOptions};
use clamber_graph::codec;

use crate::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    url: Option<String>,
    depth: Option<u32>,
    allow_external_links: Option<bool>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Crawl from `url`, persist what was found, then answer with the stored
/// subtree so pages known from earlier crawls are included.
pub async fn api_search(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchQuery>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
    };

    let Some(raw) = params.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "url is required");
    };
    let Some(url) = links::normalize_url(raw) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("url must be an absolute http(s) URL, got {raw:?}"),
        );
    };
    let depth = params.depth.unwrap_or(1);
    if depth > state.max_depth {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("depth must be at most {}", state.max_depth),
        );
    }

    let options = CrawlOptions {
        max_depth: depth,
        allow_external_links: params.allow_external_links.unwrap_or(false),
    };
    let outcome = state.crawler.crawl(&url, options).await;
    if outcome.sync_failed > 0 || outcome.fetch_failed > 0 {
        info!(
            url,
            sync_failed = outcome.sync_failed,
            fetch_failed = outcome.fetch_failed,
            "Crawl finished with failures"
        );
    }

    match state.store.find_subtree(&url, depth).await {
        Ok(Some(tree)) => Json(codec::encode_tree(&tree)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("no pages stored for {url}")),
        Err(e) => {
            warn!(url, error = %e, "Failed to load subtree");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
