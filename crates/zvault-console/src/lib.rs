//! Data layer for the `ZVault` web console.
//!
//! Sits between console views and the REST API. A view action turns into a
//! path ([`path`]), which the [`Executor`] sends with auth and optional
//! cancellation. The [`normalize`] module reshapes the response into
//! [`Record`]s, and those land in the shared [`RecordStore`]. Long-running
//! work (snapshot restore, tidy and replication status) goes through
//! [`monitor`]. Namespace state lives in [`NamespaceContext`].
//!
//! # Example
//!
//! ```rust,no_run
//! use zvault_console::{resource, ConsoleClient, ConsoleConfig, QueryContext};
//!
//! # async fn example() -> Result<(), zvault_console::ClientError> {
//! let client = ConsoleClient::from_config(&ConsoleConfig::from_env())?;
//! client.namespaces().set_namespace("team-a").await;
//!
//! let ctx = QueryContext::new(client.namespaces().path());
//! let mounts = client
//!     .query(&resource::secret_engine(), &Default::default(), &ctx)
//!     .await?;
//! for mount in mounts {
//!     println!("{}", mount.id);
//! }
//! # Ok(())
//! # }
//! ```

mod cancel;
mod client;
mod config;
mod error;
mod executor;
mod memory;
pub mod monitor;
pub mod namespace;
pub mod normalize;
pub mod path;
mod query;
mod record;
pub mod resource;
pub mod route;
mod store;

pub use cancel::CancelToken;
pub use client::ConsoleClient;
pub use config::ConsoleConfig;
pub use error::ClientError;
pub use executor::{Body, Executor, HttpTransport, RawResponse, Request, Transport};
pub use memory::MemoryTransport;
pub use monitor::{OperationState, PollConfig, PollHandle, PollStatus, UploadOperation};
pub use namespace::{NamespaceContext, NamespaceSnapshot};
pub use normalize::{FieldCase, Normalized};
pub use query::QueryContext;
pub use record::{Attributes, Record};
pub use resource::{Method, ResourceKind};
pub use route::{DiscardsOnExit, ListRoute, Page, PageMeta, Paginated};
pub use store::RecordStore;
