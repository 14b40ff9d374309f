//! Core engine for sweep: a bounded, pipelined fetch-and-mutate loop over a
//! paginated remote collection.
//!
//! This crate contains the domain types, the collaborator port traits and the
//! two concurrency components that drive a run. Infrastructure crates
//! implement the traits defined here; they never add engine rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No HTTP or file I/O lives here. The
//! remote service is reached only through [`PageFetcher`], [`ItemMutator`] and
//! [`PendingCountSource`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ItemId`, `ContinuationToken`, `PipelineRunId`, …) |
//! | [`types`] | Value types (`Page`, `PageOutcome`, `RunReport`, `ConcurrencyLimits`, …) |
//! | [`errors`] | Collaborator and run-level error types |
//! | [`ports`] | Collaborator traits |
//! | [`summary`] | Atomic run counters |
//! | [`batch`] | Per-page bounded item processing |
//! | [`engine`] | The page pipeline state machine |
//!
//! ## Concurrency
//!
//! Two independent gates bound a run. The page gate (default width 3) limits
//! how many pages are being mutated at once and is what stops the fetch loop
//! from running ahead. Each page gets its own item gate (default width 10), so
//! at most `pages × items` mutate calls are in flight.

pub mod batch;
pub mod engine;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod summary;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use batch::ItemBatchProcessor;
pub use engine::{PagePipeline, PipelineState};
pub use errors::{FetchError, MutationError, SweepError};
pub use identifiers::{ContinuationToken, ItemId, PageNumber, PipelineRunId};
pub use ports::{ItemMutator, PageFetcher, PendingCountSource};
pub use summary::{RunSummary, SummarySnapshot};
pub use types::{
    ConcurrencyLimits, EstimatedTotal, FailureKind, Item, ItemOutcome, MutationFailure, Page,
    PageOutcome, RunReport, Termination, Timestamp,
};

// Re-exported so callers can build a stop signal without naming tokio-util.
pub use tokio_util::sync::CancellationToken;
