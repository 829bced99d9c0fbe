// Find-or-create for page nodes and link edges.
//
// Neither resolver takes a lock. Uniqueness comes from the backend rejecting
// the second of two conflicting commits:
// - a node race can leave a caller holding an id that never committed, so a
//   conflict is retried until the winner's node is visible;
// - an edge has no identity beyond (parent, child), so a conflict is settled
//   by probing again: if the edge is there someone else wrote it, if not the
//   conflict came from unrelated writes on an endpoint and the edge is retried.

use std::future::Future;
use std::time::Duration;

use clamber_common::{NodeId, Page};
use tracing::{debug, info, warn};

use crate::backend::{GraphBackend, GraphTxn};
use crate::codec;
use crate::error::{GraphError, Result};
use crate::store::StoreOptions;

/// How an `ensure_edge` call ended. All three mean the edge now exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    AlreadyPresent,
    Created,
    /// Our commit lost to a concurrent writer adding the same edge.
    ConcurrentDuplicate,
}

/// Run one backend round-trip under the call deadline.
pub(crate) async fn within<T>(
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GraphError::DeadlineExceeded(limit)),
    }
}

/// Roll back after a failed step. The step's error is what callers see.
async fn abandon(txn: Box<dyn GraphTxn>, limit: Duration) {
    if let Err(e) = within(limit, txn.discard()).await {
        debug!(error = %e, "Discard after failure also failed");
    }
}

/// Return the node id for `page.url`, creating the node if absent.
///
/// Concurrent callers with the same url all converge on one id: losers of a
/// creation race get `ConflictAbort`, back off, re-query and find the winner.
pub async fn find_or_create_node(
    backend: &dyn GraphBackend,
    options: &StoreOptions,
    page: &Page,
) -> Result<NodeId> {
    let attempts = options.retry.max_attempts.max(1);
    for attempt in 0..attempts {
        match resolve_once(backend, options, page).await {
            Ok(uid) => return Ok(uid),
            Err(e) if e.is_conflict() => {
                if attempt + 1 < attempts {
                    let delay = options.retry.delay_for(attempt);
                    debug!(url = %page.url, attempt = attempt + 1, ?delay, "Node creation conflicted, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    warn!(url = %page.url, attempts, "Node resolution exhausted its retries");
    Err(GraphError::ResolutionExhausted {
        url: page.url.clone(),
        attempts,
    })
}

async fn resolve_once(
    backend: &dyn GraphBackend,
    options: &StoreOptions,
    page: &Page,
) -> Result<NodeId> {
    let limit = options.call_timeout;
    let mut txn = within(limit, backend.begin()).await?;

    // One level only: the root node, none of its links.
    let existing = match within(limit, txn.find_tree(&page.url, 1)).await {
        Ok(found) => found.and_then(|record| record.uid),
        Err(e) => {
            abandon(txn, limit).await;
            return Err(e);
        }
    };

    if let Some(uid) = existing {
        if let Err(e) = within(limit, txn.commit()).await {
            debug!(url = %page.url, error = %e, "Read-only commit failed, node already resolved");
        }
        return Ok(uid);
    }

    let uid = match within(limit, txn.create_node(&codec::encode(page))).await {
        Ok(uid) => uid,
        Err(e) => {
            abandon(txn, limit).await;
            return Err(e.in_context(format!("page {}", page.url)));
        }
    };

    within(limit, txn.commit())
        .await
        .map_err(|e| e.in_context(format!("page {}", page.url)))?;
    debug!(url = %page.url, uid = %uid, "Created page node");
    Ok(uid)
}

/// Make sure exactly one `parent -[links]-> child` edge exists.
///
/// A conflict does not by itself mean another writer added this edge: the
/// backend also rejects commits that merely touch the same endpoint. After a
/// conflict the edge is probed again in a fresh transaction and only counts
/// as a concurrent duplicate when it is really there; otherwise the write is
/// retried under the same policy as node creation.
pub async fn ensure_edge(
    backend: &dyn GraphBackend,
    options: &StoreOptions,
    parent: &NodeId,
    child: &NodeId,
) -> Result<EdgeOutcome> {
    let attempts = options.retry.max_attempts.max(1);
    let mut conflicted = false;
    for attempt in 0..attempts {
        match link_once(backend, options, parent, child).await {
            Ok(LinkAttempt::Present) if conflicted => {
                info!(%parent, %child, "Edge committed concurrently by another writer, treating as present");
                return Ok(EdgeOutcome::ConcurrentDuplicate);
            }
            Ok(LinkAttempt::Present) => return Ok(EdgeOutcome::AlreadyPresent),
            Ok(LinkAttempt::Created) => {
                debug!(%parent, %child, "Created link");
                return Ok(EdgeOutcome::Created);
            }
            Err(e) if e.is_conflict() => {
                conflicted = true;
                if attempt + 1 < attempts {
                    let delay = options.retry.delay_for(attempt);
                    debug!(%parent, %child, attempt = attempt + 1, ?delay, "Edge write conflicted, re-probing");
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    warn!(%parent, %child, attempts, "Edge write kept conflicting");
    Err(GraphError::persistence(
        format!("edge {parent} -> {child}"),
        format!("still conflicting after {attempts} attempts"),
    ))
}

enum LinkAttempt {
    Present,
    Created,
}

async fn link_once(
    backend: &dyn GraphBackend,
    options: &StoreOptions,
    parent: &NodeId,
    child: &NodeId,
) -> Result<LinkAttempt> {
    let limit = options.call_timeout;
    let context = format!("edge {parent} -> {child}");
    let mut txn = within(limit, backend.begin()).await?;

    let probe = match within(limit, txn.count_links(parent, child)).await {
        Ok(probe) => probe,
        Err(e) => {
            abandon(txn, limit).await;
            return Err(e);
        }
    };
    if probe.exists() {
        if let Err(e) = within(limit, txn.discard()).await {
            debug!(%parent, %child, error = %e, "Read-only discard failed, edge already present");
        }
        return Ok(LinkAttempt::Present);
    }

    if let Err(e) = within(limit, txn.create_link(parent, child)).await {
        abandon(txn, limit).await;
        return Err(e.in_context(context));
    }

    within(limit, txn.commit())
        .await
        .map_err(|e| e.in_context(context))?;
    Ok(LinkAttempt::Created)
}
