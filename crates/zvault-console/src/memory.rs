//! In-process transport for tests.
//!
//! Responses are scripted per `METHOD path` (query strings are not part of
//! the key). Each route holds a queue; the last non-gated entry is sticky so
//! a poller can hit the same route repeatedly. Gated entries wait until the
//! returned sender fires (or is dropped) before answering, which lets tests
//! choose the order in which concurrent requests complete.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tokio::sync::{oneshot, watch, Mutex};

use crate::error::ClientError;
use crate::executor::{RawResponse, Request, Transport};
use crate::resource::Method;

#[derive(Debug, Clone)]
enum Outcome {
    Respond(RawResponse),
    Fail(String),
}

#[derive(Debug)]
struct Scripted {
    outcome: Outcome,
    gate: Option<oneshot::Receiver<()>>,
}

/// Scripted transport. Does not touch the network.
#[derive(Debug)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    seen: Mutex<Vec<Request>>,
    seen_count: watch::Sender<usize>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        let (seen_count, _rx) = watch::channel(0);
        Self {
            routes: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
            seen_count,
        }
    }

    /// Queue a JSON response.
    pub async fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        self.respond_raw(method, path, RawResponse::json(status, &body)).await;
    }

    /// Queue a response as-is.
    pub async fn respond_raw(&self, method: Method, path: &str, response: RawResponse) {
        self.push(method, path, Outcome::Respond(response), None).await;
    }

    /// Queue a JSON response that is held until the returned sender fires.
    pub async fn respond_gated(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: Value,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            method,
            path,
            Outcome::Respond(RawResponse::json(status, &body)),
            Some(rx),
        )
        .await;
        tx
    }

    /// Queue a transport failure.
    pub async fn fail(&self, method: Method, path: &str, reason: &str) {
        self.push(method, path, Outcome::Fail(reason.to_owned()), None).await;
    }

    /// Every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<Request> {
        self.seen.lock().await.clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        *self.seen_count.borrow()
    }

    /// Wait until at least `count` requests have arrived.
    pub async fn wait_for_requests(&self, count: usize) {
        let mut rx = self.seen_count.subscribe();
        let _ = rx.wait_for(|seen| *seen >= count).await;
    }

    async fn push(&self, method: Method, path: &str, outcome: Outcome, gate: Option<oneshot::Receiver<()>>) {
        self.routes
            .lock()
            .await
            .entry(route_key(method, path))
            .or_default()
            .push_back(Scripted { outcome, gate });
    }

    async fn next(&self, key: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock().await;
        let queue = routes.get_mut(key)?;
        let sticky = queue.len() == 1 && queue.front().is_some_and(|s| s.gate.is_none());
        if sticky {
            queue.front().map(|s| Scripted {
                outcome: s.outcome.clone(),
                gate: None,
            })
        } else {
            queue.pop_front()
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: &Request) -> Result<RawResponse, ClientError> {
        let key = route_key(request.method, &request.path);
        self.seen.lock().await.push(request.clone());
        self.seen_count.send_modify(|n| *n = n.saturating_add(1));

        let Some(scripted) = self.next(&key).await else {
            return Err(ClientError::Transport {
                reason: format!("no scripted response for {key}"),
            });
        };

        if let Some(gate) = scripted.gate {
            let _ = gate.await;
        }

        match scripted.outcome {
            Outcome::Respond(response) => Ok(response),
            Outcome::Fail(reason) => Err(ClientError::Transport { reason }),
        }
    }
}

fn route_key(method: Method, path: &str) -> String {
    format!("{method} {path}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_response_is_sticky() {
        let transport = MemoryTransport::new();
        transport.fail(Method::Get, "/v1/pki/tidy-status", "connection reset").await;
        transport.respond(Method::Get, "/v1/pki/tidy-status", 200, json!({})).await;

        let req = Request::get("/v1/pki/tidy-status");
        assert!(transport.send(&req).await.is_err());
        assert_eq!(transport.send(&req).await.unwrap().status, 200);
        assert_eq!(transport.send(&req).await.unwrap().status, 200);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn unscripted_route_is_transport_error() {
        let transport = MemoryTransport::new();
        let err = transport.send(&Request::get("/v1/nope")).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
    }

    #[tokio::test]
    async fn gated_response_waits_for_release() {
        let transport = std::sync::Arc::new(MemoryTransport::new());
        let gate = transport
            .respond_gated(Method::Get, "/v1/sys/mounts", 200, json!({}))
            .await;

        let call = {
            let transport = std::sync::Arc::clone(&transport);
            tokio::spawn(async move { transport.send(&Request::get("/v1/sys/mounts")).await })
        };
        transport.wait_for_requests(1).await;
        assert!(!call.is_finished());

        gate.send(()).unwrap();
        assert_eq!(call.await.unwrap().unwrap().status, 200);
    }
}
