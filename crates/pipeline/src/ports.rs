//! Collaborator port traits.
//!
//! The engine reaches the remote service only through these traits. The
//! `remote` crate implements them over HTTP; tests implement them in memory.
//! All three are dyn-compatible so the engine can hold them as `Arc<dyn _>`.

use async_trait::async_trait;

use crate::{ContinuationToken, FetchError, Item, MutationError, Page};

/// Reports how many items are awaiting the mutation.
#[async_trait]
pub trait PendingCountSource: Send + Sync {
    /// Returns a best-effort count. Used for display and for skipping runs
    /// with nothing to do; an error only makes the estimate unknown.
    async fn estimated_pending_count(&self) -> Result<i64, FetchError>;
}

/// Retrieves one page of items.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the page identified by `token`, or the first page when `None`.
    ///
    /// `token` must be `None` or a cursor returned by a previous call. An
    /// empty page signals the end of the stream.
    async fn fetch(&self, token: Option<&ContinuationToken>) -> Result<Page, FetchError>;
}

/// Applies the mutation to one item.
///
/// Implementations must treat an already-mutated item as success: the engine
/// has no rollback and a re-run may hand the same item over again.
#[async_trait]
pub trait ItemMutator: Send + Sync {
    /// Mutates `item`.
    async fn mutate(&self, item: &Item) -> Result<(), MutationError>;
}
