//! Long-running operations: uploads that can be aborted, and status polling.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::ClientError;
use crate::executor::{Executor, Request};

/// Default delay between status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

const SNAPSHOT_PATH: &str = "/v1/sys/storage/raft/snapshot";
const SNAPSHOT_FORCE_PATH: &str = "/v1/sys/storage/raft/snapshot-force";

/// Lifecycle of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed(Vec<String>),
    Cancelled,
}

impl OperationState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }

    /// Message to show the user; only failures have one.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Failed(errors) => Some(errors.join(", ")),
            _ => None,
        }
    }
}

/// One upload with an abort action.
///
/// The cancellation token is created with the operation and handed to the
/// in-flight request, so [`cancel`](Self::cancel) can be called from any
/// task holding the operation without waiting on the request.
#[derive(Debug)]
pub struct UploadOperation {
    state: watch::Sender<OperationState>,
    token: CancelToken,
}

impl UploadOperation {
    #[must_use]
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(OperationState::Idle);
        Self {
            state,
            token: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> OperationState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<OperationState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Abort the upload. A no-op once the operation has finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Run the upload to completion and return the final state.
    ///
    /// An operation runs once; calling `run` again returns the state it
    /// already holds.
    pub async fn run(&self, executor: &Executor, request: Request) -> OperationState {
        let started = self.state.send_if_modified(|state| {
            if *state == OperationState::Idle {
                *state = OperationState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            warn!(state = ?self.state(), "upload operation already used");
            return self.state();
        }

        let path = request.path.clone();
        let outcome = match executor.execute(request, Some(&self.token)).await {
            Ok(_) => OperationState::Succeeded,
            Err(ClientError::Aborted) => OperationState::Cancelled,
            Err(e) => OperationState::Failed(e.messages()),
        };

        match &outcome {
            OperationState::Succeeded => info!(path = %path, "upload complete"),
            OperationState::Cancelled => debug!(path = %path, "upload cancelled"),
            OperationState::Failed(errors) => warn!(path = %path, errors = ?errors, "upload failed"),
            OperationState::Idle | OperationState::Running => {}
        }

        self.state.send_replace(outcome.clone());
        outcome
    }
}

impl Default for UploadOperation {
    fn default() -> Self {
        Self::new()
    }
}

/// Raft snapshot restore. `force` skips the server's key-match check.
#[must_use]
pub fn snapshot_restore_request(snapshot: Vec<u8>, force: bool) -> Request {
    let path = if force { SNAPSHOT_FORCE_PATH } else { SNAPSHOT_PATH };
    Request::post(path).with_binary(snapshot, "application/gzip")
}

/// Poller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed delay before every fetch.
    pub interval: Duration,
    /// When false no background task is started (test mode).
    pub enabled: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            enabled: true,
        }
    }
}

/// Last observed poll result.
#[derive(Debug, Clone, PartialEq)]
pub struct PollStatus<T> {
    pub latest: Option<T>,
    /// Successful fetches so far.
    pub fetches: u64,
    /// Failed fetches so far, as of the last successful fetch.
    pub failures: u64,
}

impl<T> Default for PollStatus<T> {
    fn default() -> Self {
        Self {
            latest: None,
            fetches: 0,
            failures: 0,
        }
    }
}

/// Handle to a running poller.
///
/// Dropping the handle tears the poller down.
#[derive(Debug)]
pub struct PollHandle<T> {
    status: watch::Receiver<PollStatus<T>>,
    stop: CancelToken,
    task: Option<JoinHandle<()>>,
}

impl<T> PollHandle<T> {
    #[must_use]
    pub fn status(&self) -> watch::Receiver<PollStatus<T>> {
        self.status.clone()
    }

    /// Whether a background task was started and has not finished.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Ask the poller to stop. Takes effect at the next iteration boundary;
    /// a pending delay is not interrupted.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Start polling `fetch` every `config.interval`.
///
/// Each iteration waits the interval first, then fetches once. Fetch
/// errors are logged and swallowed. The loop ends when the handle is
/// stopped or dropped; it never ends on its own.
pub fn spawn_poller<T, F, Fut>(name: &'static str, config: PollConfig, mut fetch: F) -> PollHandle<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
{
    let (tx, status) = watch::channel(PollStatus::default());
    let stop = CancelToken::new();

    if !config.enabled {
        debug!(poller = name, "polling disabled");
        return PollHandle {
            status,
            stop,
            task: None,
        };
    }

    let task = {
        let stop = stop.clone();
        tokio::spawn(async move {
            debug!(poller = name, interval = ?config.interval, "poller started");
            let mut failures: u64 = 0;
            loop {
                tokio::time::sleep(config.interval).await;
                if stop.is_cancelled() {
                    break;
                }
                match fetch().await {
                    Ok(value) => tx.send_modify(|s| {
                        s.latest = Some(value);
                        s.fetches = s.fetches.saturating_add(1);
                        s.failures = failures;
                    }),
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        warn!(poller = name, error = %e, failures, "status fetch failed");
                    }
                }
                if stop.is_cancelled() {
                    break;
                }
            }
            debug!(poller = name, "poller stopped");
        })
    };

    PollHandle {
        status,
        stop,
        task: Some(task),
    }
}
