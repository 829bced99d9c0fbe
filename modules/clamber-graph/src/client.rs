use neo4rs::{ConfigBuilder, Graph};

/// Thin wrapper around neo4rs::Graph owning the bolt connection pool.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    /// Connect with a fixed-size pool; every logical operation borrows one
    /// connection for the lifetime of its transaction.
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        pool_size: usize,
    ) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(pool_size.max(1))
            .build()?;
        let graph = Graph::connect(config).await?;
        Ok(Self { graph })
    }
}
