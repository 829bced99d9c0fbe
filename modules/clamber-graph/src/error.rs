use std::time::Duration;

use thiserror::Error;

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("Graph backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Commit rejected because a concurrent transaction touched the same data.
    #[error("Transaction aborted by a conflicting commit")]
    ConflictAbort,

    #[error("Failed to persist {context}: {reason}")]
    Persistence { context: String, reason: String },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Schema rejected: {0}")]
    Schema(String),

    #[error("Gave up resolving {url} after {attempts} conflicting attempts")]
    ResolutionExhausted { url: String, attempts: u32 },

    #[error("Graph call exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

impl GraphError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, GraphError::ConflictAbort)
    }

    pub fn persistence(context: impl Into<String>, reason: impl ToString) -> Self {
        GraphError::Persistence {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Attach the page/edge being written. Transport, deadline and conflict
    /// errors keep their class; everything else becomes `Persistence`.
    pub fn in_context(self, context: impl Into<String>) -> Self {
        match self {
            GraphError::Persistence { reason, .. } => GraphError::Persistence {
                context: context.into(),
                reason,
            },
            e @ (GraphError::BackendUnavailable(_)
            | GraphError::ConflictAbort
            | GraphError::DeadlineExceeded(_)) => e,
            other => GraphError::persistence(context, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_context_rewrites_persistence_context() {
        let err = GraphError::persistence("commit", "disk full").in_context("page http://a");
        assert_eq!(err.to_string(), "Failed to persist page http://a: disk full");
    }

    #[test]
    fn in_context_keeps_transport_and_conflict_classes() {
        assert!(GraphError::ConflictAbort.in_context("x").is_conflict());
        assert!(matches!(
            GraphError::BackendUnavailable("down".into()).in_context("x"),
            GraphError::BackendUnavailable(_)
        ));
    }

    #[test]
    fn in_context_wraps_query_errors() {
        let err = GraphError::Query("bad".into()).in_context("edge 0x1 -> 0x2");
        assert!(matches!(err, GraphError::Persistence { ref context, .. } if context == "edge 0x1 -> 0x2"));
    }
}
