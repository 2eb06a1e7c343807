//! Scope: a node in the cancellation tree, carrying the query it serves.
//!
//! Mirrors the parent/child structure of the runtime: the root scope covers
//! the process, the event loop derives one child per query, and every
//! pipeline stage and filter receives a clone of that child. Cancelling a
//! parent cancels all descendants. Filters are expected to poll
//! [`Scope::ensure_alive`] at bounded intervals (every 1 000 lines).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::PipelineError;

#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    query: Arc<str>,
}

impl Scope {
    /// Root of a cancellation tree, with an empty query.
    pub fn root() -> Self {
        Self {
            token: CancellationToken::new(),
            query: Arc::from(""),
        }
    }

    /// Child scope carrying `query`. Cancelling `self` cancels the child;
    /// cancelling the child leaves `self` alive.
    pub fn child(&self, query: &str) -> Self {
        Self {
            token: self.token.child_token(),
            query: Arc::from(query),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this scope (or an ancestor) is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Cheap cancellation checkpoint for tight loops.
    pub fn ensure_alive(&self) -> Result<(), PipelineError> {
        if self.token.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_inherits_parent_cancellation() {
        let root = Scope::root();
        let child = root.child("abc");
        assert_eq!(child.query(), "abc");
        assert!(child.ensure_alive().is_ok());
        root.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(
            child.ensure_alive(),
            Err(PipelineError::Cancelled)
        ));
    }

    #[test]
    fn cancelling_child_spares_parent() {
        let root = Scope::root();
        let child = root.child("q");
        child.cancel();
        assert!(!root.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let scope = Scope::root();
        let waiter = scope.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        scope.cancel();
        handle.await.unwrap();
    }
}
