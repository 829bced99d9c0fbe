use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ClamberError;

/// Which graph backend the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memgraph,
    /// In-process store, nothing survives a restart.
    Memory,
}

impl FromStr for BackendKind {
    type Err = ClamberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memgraph" | "bolt" => Ok(Self::Memgraph),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(ClamberError::Config(format!(
                "GRAPH_BACKEND must be `memgraph` or `memory`, got `{other}`"
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Graph backend
    pub backend: BackendKind,
    pub graph_uri: String,
    pub graph_user: String,
    pub graph_password: String,
    pub graph_pool_size: usize,
    pub graph_call_timeout: Duration,
    pub resolve_max_attempts: u32,

    // Crawling
    pub crawl_concurrency: usize,
    pub crawl_max_depth: u32,
    pub fetch_timeout: Duration,

    // Web server
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ClamberError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClamberError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            backend: get("GRAPH_BACKEND", "memgraph").parse()?,
            graph_uri: get("GRAPH_URI", "bolt://127.0.0.1:7687"),
            graph_user: get("GRAPH_USER", ""),
            graph_password: get("GRAPH_PASSWORD", ""),
            graph_pool_size: parse_num("GRAPH_POOL_SIZE", &get("GRAPH_POOL_SIZE", "3"))?,
            graph_call_timeout: Duration::from_millis(parse_num(
                "GRAPH_CALL_TIMEOUT_MS",
                &get("GRAPH_CALL_TIMEOUT_MS", "10000"),
            )?),
            resolve_max_attempts: parse_num(
                "RESOLVE_MAX_ATTEMPTS",
                &get("RESOLVE_MAX_ATTEMPTS", "8"),
            )?,
            crawl_concurrency: parse_num("CRAWL_CONCURRENCY", &get("CRAWL_CONCURRENCY", "8"))?,
            crawl_max_depth: parse_num("CRAWL_MAX_DEPTH", &get("CRAWL_MAX_DEPTH", "5"))?,
            fetch_timeout: Duration::from_millis(parse_num(
                "FETCH_TIMEOUT_MS",
                &get("FETCH_TIMEOUT_MS", "10000"),
            )?),
            api_host: get("API_HOST", "0.0.0.0"),
            api_port: parse_num("API_PORT", &get("API_PORT", "8000"))?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn parse_num<T: FromStr>(key: &str, raw: &str) -> Result<T, ClamberError> {
    raw.trim()
        .parse()
        .map_err(|_| ClamberError::Config(format!("{key} must be a number, got `{raw}`")))
}
