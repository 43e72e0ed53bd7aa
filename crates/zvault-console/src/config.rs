//! Console configuration.
//!
//! Loads from environment variables with defaults. Callers (the CLI) may
//! override individual fields after loading.

use std::time::Duration;

use crate::monitor::{PollConfig, DEFAULT_POLL_INTERVAL};
use crate::route::DEFAULT_PAGE_SIZE;

const DEFAULT_ADDR: &str = "http://127.0.0.1:8200";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Console data layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Server address without trailing `/`.
    pub addr: String,
    /// Auth token sent as `X-Vault-Token`.
    pub token: Option<String>,
    /// Initial namespace; empty means root.
    pub namespace: String,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    /// Status poller settings.
    pub poll: PollConfig,
    /// Records per page in list views.
    pub page_size: usize,
    /// Log filter (e.g., `info`, `zvault_console=debug`).
    pub log_level: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_owned(),
            token: None,
            namespace: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll: PollConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            log_level: "info".to_owned(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `VAULT_ADDR` — server address (default: `http://127.0.0.1:8200`)
    /// - `VAULT_TOKEN` — auth token (optional)
    /// - `VAULT_NAMESPACE` — initial namespace (default: root)
    /// - `ZVAULT_REQUEST_TIMEOUT_SECS` — HTTP timeout (default: `30`)
    /// - `ZVAULT_POLL_INTERVAL_MS` — poll delay (default: `2000`)
    /// - `ZVAULT_TEST_MODE` — `true`/`1` disables pollers (default: `false`)
    /// - `ZVAULT_PAGE_SIZE` — list page size (default: `15`)
    /// - `ZVAULT_LOG_LEVEL` — log filter (default: `info`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup, e.g. a map in tests.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let addr = lookup("VAULT_ADDR")
            .map(|a| a.trim().trim_end_matches('/').to_owned())
            .filter(|a| !a.is_empty())
            .unwrap_or(defaults.addr);

        let token = lookup("VAULT_TOKEN").filter(|t| !t.trim().is_empty());

        let namespace = lookup("VAULT_NAMESPACE")
            .map(|ns| ns.trim_matches('/').to_owned())
            .unwrap_or_default();

        let request_timeout = lookup("ZVAULT_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(defaults.request_timeout, Duration::from_secs);

        let interval = lookup("ZVAULT_POLL_INTERVAL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);

        let test_mode = lookup("ZVAULT_TEST_MODE")
            .is_some_and(|v| v == "true" || v == "1");

        let page_size = lookup("ZVAULT_PAGE_SIZE")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.page_size);

        let log_level = lookup("ZVAULT_LOG_LEVEL").unwrap_or(defaults.log_level);

        Self {
            addr,
            token,
            namespace,
            request_timeout,
            poll: PollConfig {
                interval,
                enabled: !test_mode,
            },
            page_size,
            log_level,
        }
    }
}
