use neo4rs::query;
use tracing::{info, warn};

use crate::GraphClient;

/// Page schema: exact-match index and uniqueness on url (the uniqueness
/// constraint is what turns a lost creation race into a commit failure),
/// timestamp required, and an edge-type index on LINKS.
/// Memgraph has no IF NOT EXISTS, so "already exists" answers are ignored.
pub const SCHEMA: [&str; 4] = [
    "CREATE INDEX ON :Page(url)",
    "CREATE CONSTRAINT ON (p:Page) ASSERT p.url IS UNIQUE",
    "CREATE CONSTRAINT ON (p:Page) ASSERT EXISTS (p.timestamp)",
    "CREATE EDGE INDEX ON :LINKS",
];

/// Run idempotent schema migrations.
pub async fn migrate(client: &GraphClient) -> Result<(), neo4rs::Error> {
    info!("Running schema migrations...");
    for statement in &SCHEMA {
        run_ignoring_exists(&client.graph, statement).await?;
    }
    info!("Page schema applied");
    Ok(())
}

/// Delete every node and relationship.
pub async fn drop_all(client: &GraphClient) -> Result<(), neo4rs::Error> {
    client.graph.run(query("MATCH (n) DETACH DELETE n")).await?;
    warn!("Dropped all graph data");
    Ok(())
}

async fn run_ignoring_exists(g: &neo4rs::Graph, cypher: &str) -> Result<(), neo4rs::Error> {
    match g.run(query(cypher)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let msg = e.to_string().to_lowercase();
            if msg.contains("already exists") || msg.contains("equivalent") {
                warn!("Already exists (skipped): {}", cypher.chars().take(80).collect::<String>());
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}
