//! Sweep remote collection adapter.
//!
//! Implements [`pipeline::PendingCountSource`], [`pipeline::PageFetcher`] and
//! [`pipeline::ItemMutator`] over a JSON REST service:
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | estimate | `GET {count_path}` | `{"count": n}` |
//! | list | `GET {list_path}?pageSize=N&pageToken=T` | `{"items": [{"id": …}], "nextPageToken": "…"}` |
//! | mutate | `{mutate_method} {mutate_path}` with `{id}` substituted | any 2xx |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport, URL building, status classification and
//! response decoding live here. The [`pipeline`] crate sees only its traits.
//! Credentials are obtained elsewhere and passed in as a bearer token.

mod client;
pub mod config;

use thiserror::Error;

pub use client::HttpCollectionClient;
pub use config::{MutateMethod, RemoteConfig};

/// Errors raised while constructing a [`HttpCollectionClient`].
///
/// Request-time failures are reported through the pipeline's
/// [`FetchError`](pipeline::FetchError) and
/// [`MutationError`](pipeline::MutationError) instead.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A configuration value cannot work.
    #[error("Invalid remote configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// The HTTP client could not be built (e.g. TLS backend initialisation).
    #[error("Could not build HTTP client")]
    Client(#[from] reqwest::Error),
}
