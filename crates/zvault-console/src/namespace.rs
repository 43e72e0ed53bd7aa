//! Current namespace and the namespaces the token can reach.
//!
//! State is published as whole [`NamespaceSnapshot`] values through a
//! `watch` channel. Accessible-namespace fetches are latest-wins: each call
//! takes a generation ticket and applies its result only if no newer call
//! started in the meantime. Stale requests are left to finish; their result
//! is discarded on arrival.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::executor::{Executor, Request};
use crate::normalize::normalize_list;
use crate::path::{Operation, PathBuilder};
use crate::resource;

/// Immutable view of the namespace state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    /// Current namespace path; empty means root.
    pub path: String,
    /// Full paths of namespaces reachable from `path`.
    pub accessible: Vec<String>,
}

impl NamespaceSnapshot {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

/// Shared namespace context.
#[derive(Debug)]
pub struct NamespaceContext {
    executor: Arc<Executor>,
    state: watch::Sender<NamespaceSnapshot>,
    generation: AtomicU64,
}

impl NamespaceContext {
    pub fn new(executor: Arc<Executor>, path: &str) -> Self {
        let (state, _rx) = watch::channel(NamespaceSnapshot {
            path: clean_path(path),
            accessible: Vec::new(),
        });
        Self {
            executor,
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Receive every committed snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NamespaceSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> NamespaceSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.state.borrow().path.clone()
    }

    #[must_use]
    pub fn accessible(&self) -> Vec<String> {
        self.state.borrow().accessible.clone()
    }

    /// Replace the current namespace and re-fetch the accessible list.
    ///
    /// Returns whether this call's fetch result was applied.
    pub async fn set_namespace(&self, path: &str) -> bool {
        let path = clean_path(path);
        debug!(namespace = %path, "namespace changed");
        self.state.send_modify(|s| s.path = path);
        self.find_namespaces_for_user().await
    }

    /// Fetch the accessible namespaces for the current path.
    ///
    /// Returns `true` if the result was applied, `false` if it was
    /// superseded by a newer call or the fetch failed. Failures leave the
    /// list unchanged.
    pub async fn find_namespaces_for_user(&self) -> bool {
        let ticket = self
            .generation
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        let path = self.path();

        let result = self.fetch_accessible(&path).await;

        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!(namespace = %path, ticket, "dropping superseded namespace result");
            return false;
        }

        match result {
            Ok(accessible) => {
                self.state.send_modify(|s| s.accessible = accessible);
                true
            }
            Err(e) => {
                warn!(namespace = %path, error = %e, "failed to fetch accessible namespaces");
                false
            }
        }
    }

    async fn fetch_accessible(&self, path: &str) -> Result<Vec<String>, ClientError> {
        let kind = resource::ui_namespace();
        let url = PathBuilder::new(&kind, Operation::List).namespace(path).build()?;
        let payload = self.executor.execute_json(Request::list(url), None).await?;
        let records = normalize_list(&kind, payload)?;

        Ok(records
            .into_iter()
            .map(|record| {
                let child = record.id.trim_end_matches('/');
                if path.is_empty() {
                    child.to_owned()
                } else {
                    format!("{path}/{child}")
                }
            })
            .collect())
    }
}

fn clean_path(path: &str) -> String {
    path.trim_matches('/').to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::executor::Transport;
    use crate::memory::MemoryTransport;
    use crate::resource::Method;
    use serde_json::json;

    fn context(transport: &Arc<MemoryTransport>) -> Arc<NamespaceContext> {
        let executor = Arc::new(Executor::new(
            Arc::clone(transport) as Arc<dyn Transport>,
            Some("s.token".to_owned()),
        ));
        Arc::new(NamespaceContext::new(executor, ""))
    }

    fn keys(list: &[&str]) -> serde_json::Value {
        json!({ "data": { "keys": list } })
    }

    #[tokio::test]
    async fn root_lists_children_without_prefix() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(Method::Get, "/v1/sys/internal/ui/namespaces/", 200, keys(&["team-a/", "team-b/"]))
            .await;
        let ctx = context(&transport);

        assert!(ctx.find_namespaces_for_user().await);
        assert_eq!(ctx.accessible(), vec!["team-a".to_owned(), "team-b".to_owned()]);
        assert!(transport.requests().await[0].is_list());
    }

    #[tokio::test]
    async fn child_namespaces_are_prefixed() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(Method::Get, "/v1/team-a/sys/internal/ui/namespaces/", 200, keys(&["dev/", "prod/"]))
            .await;
        let ctx = context(&transport);

        assert!(ctx.set_namespace("/team-a/").await);
        let snap = ctx.snapshot();
        assert_eq!(snap.path, "team-a");
        assert_eq!(snap.accessible, vec!["team-a/dev".to_owned(), "team-a/prod".to_owned()]);
    }

    #[tokio::test]
    async fn later_call_wins_when_earlier_resolves_last() {
        let transport = Arc::new(MemoryTransport::new());
        let gate_a = transport
            .respond_gated(Method::Get, "/v1/team-a/sys/internal/ui/namespaces/", 200, keys(&["a1/"]))
            .await;
        transport
            .respond(Method::Get, "/v1/team-b/sys/internal/ui/namespaces/", 200, keys(&["b1/"]))
            .await;
        let ctx = context(&transport);

        let first = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.set_namespace("team-a").await })
        };
        transport.wait_for_requests(1).await;

        assert!(ctx.set_namespace("team-b").await);
        gate_a.send(()).unwrap();
        assert!(!first.await.unwrap());

        let snap = ctx.snapshot();
        assert_eq!(snap.path, "team-b");
        assert_eq!(snap.accessible, vec!["team-b/b1".to_owned()]);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_list_unchanged() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(Method::Get, "/v1/sys/internal/ui/namespaces/", 200, keys(&["team-a/"]))
            .await;
        transport
            .respond(Method::Get, "/v1/team-a/sys/internal/ui/namespaces/", 403, json!({ "errors": ["permission denied"] }))
            .await;
        let ctx = context(&transport);
        assert!(ctx.find_namespaces_for_user().await);

        assert!(!ctx.set_namespace("team-a").await);
        assert_eq!(ctx.path(), "team-a");
        assert_eq!(ctx.accessible(), vec!["team-a".to_owned()]);
    }

    #[tokio::test]
    async fn subscribers_see_committed_snapshots() {
        let transport = Arc::new(MemoryTransport::new());
        transport
            .respond(Method::Get, "/v1/ops/sys/internal/ui/namespaces/", 200, keys(&["x/"]))
            .await;
        let ctx = context(&transport);
        let mut rx = ctx.subscribe();

        ctx.set_namespace("ops").await;
        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.accessible, vec!["ops/x".to_owned()]);
        assert!(!snap.is_root());
    }
}
