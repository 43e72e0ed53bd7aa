//! Request execution.
//!
//! [`Executor`] adds auth, races the call against an optional
//! [`CancelToken`], and turns non-2xx answers into [`ClientError::Api`].
//! The wire itself sits behind the [`Transport`] trait: [`HttpTransport`] for
//! real servers, [`MemoryTransport`](crate::MemoryTransport) for tests.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::ClientError;
use crate::resource::Method;

const TOKEN_HEADER: &str = "X-Vault-Token";
const USER_AGENT: &str = concat!("zvault-console/", env!("CARGO_PKG_VERSION"));

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Binary {
        bytes: Vec<u8>,
        content_type: String,
    },
}

/// One outgoing request. `path` is relative to the server address.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// `GET` with `list=true`.
    pub fn list(path: impl Into<String>) -> Self {
        Self::get(path).with_query("list", "true")
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    #[must_use]
    pub fn with_binary(mut self, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = Some(Body::Binary {
            bytes,
            content_type: content_type.into(),
        });
        self
    }

    /// Whether this is a `LIST` request.
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.method == Method::Get && self.query.iter().any(|(k, v)| k == "list" && v == "true")
    }

    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Response as received, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// A JSON response.
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_owned()),
            body: body.to_string().into_bytes(),
        }
    }

    /// A plain-text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain".to_owned()),
            body: body.into().into_bytes(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
    }
}

/// Carries one request to the server and back.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform exactly one call.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] or [`ClientError::Transport`] when
    /// no response was received. HTTP error statuses are not errors here.
    async fn send(&self, request: &Request) -> Result<RawResponse, ClientError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    addr: String,
}

impl HttpTransport {
    /// Create a transport for a server address such as `http://127.0.0.1:8200`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an empty address and
    /// [`ClientError::Network`] if the HTTP client cannot be built.
    pub fn new(addr: &str, timeout: Duration) -> Result<Self, ClientError> {
        let addr = addr.trim_end_matches('/');
        if addr.is_empty() {
            return Err(ClientError::Config("server address is empty".to_owned()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            addr: addr.to_owned(),
        })
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<RawResponse, ClientError> {
        let url = format!("{}{}", self.addr, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut req = self.http.request(method, &url);
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        match &request.body {
            Some(Body::Json(v)) => req = req.json(v),
            Some(Body::Binary {
                bytes,
                content_type,
            }) => {
                req = req
                    .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                    .body(bytes.clone());
            }
            None => {}
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Executes requests with auth and cancellation.
pub struct Executor {
    transport: Arc<dyn Transport>,
    token: Option<String>,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, token: Option<String>) -> Self {
        Self { transport, token }
    }

    /// Execute one request.
    ///
    /// A token that is already cancelled returns [`ClientError::Aborted`]
    /// without touching the network.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Aborted`] if `cancel` fires before the response.
    /// - [`ClientError::Api`] for non-2xx responses.
    /// - transport errors unchanged.
    pub async fn execute(
        &self,
        mut request: Request,
        cancel: Option<&CancelToken>,
    ) -> Result<RawResponse, ClientError> {
        if let Some(token) = &self.token {
            request.headers.push((TOKEN_HEADER.to_owned(), token.clone()));
        }

        let response = match cancel {
            Some(cancel) => {
                if cancel.is_cancelled() {
                    debug!(method = %request.method, path = %request.path, "request cancelled before send");
                    return Err(ClientError::Aborted);
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!(method = %request.method, path = %request.path, "request aborted");
                        return Err(ClientError::Aborted);
                    }
                    result = self.transport.send(&request) => result?,
                }
            }
            None => self.transport.send(&request).await?,
        };

        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status,
            "request complete"
        );

        if response.is_success() {
            Ok(response)
        } else {
            Err(api_error(&response))
        }
    }

    /// Execute and decode the body as JSON. Empty bodies decode to `Null`.
    ///
    /// # Errors
    ///
    /// Everything [`execute`](Self::execute) returns, plus
    /// [`ClientError::Json`] for an unparseable 2xx body.
    pub async fn execute_json(
        &self,
        request: Request,
        cancel: Option<&CancelToken>,
    ) -> Result<Value, ClientError> {
        let response = self.execute(request, cancel).await?;
        if response.status == 204 || response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&response.body)?)
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorPayload {
    errors: Vec<String>,
}

/// Build the error for a non-2xx response.
fn api_error(response: &RawResponse) -> ClientError {
    let status = response.status;

    if response.is_json() {
        if let Ok(payload) = serde_json::from_slice::<ErrorPayload>(&response.body) {
            if !payload.errors.is_empty() {
                return ClientError::Api {
                    status,
                    errors: payload.errors,
                };
            }
        }
    }

    let raw = String::from_utf8_lossy(&response.body);
    let raw = raw.trim();
    let looks_empty = raw.is_empty() || (response.is_json() && is_empty_error_list(raw));
    let errors = if looks_empty {
        vec![synthetic_message(status)]
    } else {
        vec![raw.to_owned()]
    };
    ClientError::Api { status, errors }
}

fn is_empty_error_list(raw: &str) -> bool {
    serde_json::from_str::<ErrorPayload>(raw).is_ok_and(|p| p.errors.is_empty())
}

fn synthetic_message(status: u16) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason());
    match reason {
        Some(reason) => format!("HTTP {status} {reason}"),
        None => format!("HTTP {status}"),
    }
}
