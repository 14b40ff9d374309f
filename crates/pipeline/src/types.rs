//! Shared value types for the sweep domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! values with invariants (a page's outcome counts add up to its size,
//! concurrency widths are non-zero) and flow between the engine's components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContinuationToken, ItemId, PageNumber, PipelineRunId, SweepError};

// ---------------------------------------------------------------------------
// Items and pages
// ---------------------------------------------------------------------------

/// One unit of remote work.
///
/// `payload` is whatever else the listing call returned for the item. The
/// engine never looks inside it; it exists for mutators that need more than
/// the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Collaborator-assigned identifier.
    pub id: ItemId,
    /// Opaque collaborator data.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Item {
    /// Creates an item with no payload.
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            payload: serde_json::Value::Null,
        }
    }

    /// Creates an item carrying collaborator data.
    pub fn with_payload(id: ItemId, payload: serde_json::Value) -> Self {
        Self { id, payload }
    }
}

// ---------------------------------------------------------------------------

/// One listing result: an ordered batch of items plus the cursor for the next.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Items in collaborator order.
    pub items: Vec<Item>,
    /// Cursor for the next page. `None` marks the final page.
    pub next: Option<ContinuationToken>,
}

impl Page {
    /// Builds a page, treating an empty cursor string as "no more pages".
    pub fn new(items: Vec<Item>, next: Option<String>) -> Self {
        Self {
            items,
            next: next.and_then(ContinuationToken::new),
        }
    }

    /// A page with no items and no cursor.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if the page holds no items (end of stream).
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if no further page may be requested after this one.
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }

    /// Number of items on the page.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

// ---------------------------------------------------------------------------
// Estimate
// ---------------------------------------------------------------------------

/// Best-effort count of items awaiting the mutation, used for display only.
///
/// `-1` ([`EstimatedTotal::UNKNOWN`]) means the estimate could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EstimatedTotal(i64);

impl EstimatedTotal {
    /// Sentinel for an estimate that could not be obtained.
    pub const UNKNOWN: EstimatedTotal = EstimatedTotal(-1);

    /// Wraps a collaborator-reported count. Negative values collapse to unknown.
    pub fn new(value: i64) -> Self {
        if value < 0 {
            Self::UNKNOWN
        } else {
            Self(value)
        }
    }

    /// Returns the raw value, `-1` when unknown.
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns `true` for the unknown sentinel.
    pub fn is_unknown(self) -> bool {
        self.0 < 0
    }

    /// Returns `true` if the collaborator reported nothing pending.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for EstimatedTotal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            write!(f, "unknown")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Category of an item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or server-side fault; a later run may succeed.
    Transient,
    /// The collaborator throttled the call.
    RateLimited,
    /// Credentials were refused.
    Unauthorized,
    /// The item disappeared between listing and mutation.
    NotFound,
    /// The collaborator refused the request as invalid.
    Rejected,
    /// The item task panicked or was aborted.
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Transient => "transient",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::NotFound => "not_found",
            FailureKind::Rejected => "rejected",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Why one item's mutation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

impl MutationFailure {
    /// Creates a failure detail.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of mutating one item. Consumed immediately by the batch processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The mutation was applied (or was already in effect).
    Succeeded,
    /// The mutation failed; siblings are unaffected.
    Failed(MutationFailure),
}

// ---------------------------------------------------------------------------

/// Aggregate result of processing one page.
///
/// Invariant: `items == succeeded + failed + skipped`. `skipped` is only
/// non-zero when cancellation stopped dispatch part-way through the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// Which page this was.
    pub page: PageNumber,
    /// Items on the page.
    pub items: u64,
    /// Items whose mutation succeeded.
    pub succeeded: u64,
    /// Items whose mutation failed.
    pub failed: u64,
    /// Items never dispatched.
    pub skipped: u64,
}

impl PageOutcome {
    /// Returns `true` if the counts add up to the page size.
    pub fn is_consistent(&self) -> bool {
        self.succeeded + self.failed + self.skipped == self.items
    }

    /// Like [`PageOutcome::is_consistent`], but reports the mismatch.
    pub fn verify(&self) -> Result<(), SweepError> {
        if self.is_consistent() {
            return Ok(());
        }
        Err(SweepError::InvariantViolation {
            message: format!(
                "page {}: {} items but {} succeeded, {} failed, {} skipped",
                self.page, self.items, self.succeeded, self.failed, self.skipped
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Configuration values
// ---------------------------------------------------------------------------

/// Widths of the two admission gates.
///
/// `max_concurrent_pages` bounds how many pages are being mutated at once;
/// `max_concurrent_items` bounds in-flight mutations within one page. The
/// worst case for simultaneous mutate calls is their product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    /// Width of the page-level gate.
    pub max_concurrent_pages: usize,
    /// Width of the per-page item-level gate.
    pub max_concurrent_items: usize,
}

impl ConcurrencyLimits {
    /// Default page-level width.
    pub const DEFAULT_PAGES: usize = 3;
    /// Default item-level width.
    pub const DEFAULT_ITEMS: usize = 10;

    /// Validates and creates a set of limits. Zero widths would deadlock.
    pub fn new(max_concurrent_pages: usize, max_concurrent_items: usize) -> Result<Self, SweepError> {
        if max_concurrent_pages == 0 {
            return Err(SweepError::ConfigurationError {
                message: "max_concurrent_pages must be at least 1".into(),
            });
        }
        if max_concurrent_items == 0 {
            return Err(SweepError::ConfigurationError {
                message: "max_concurrent_items must be at least 1".into(),
            });
        }
        Ok(Self {
            max_concurrent_pages,
            max_concurrent_items,
        })
    }
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            max_concurrent_pages: Self::DEFAULT_PAGES,
            max_concurrent_items: Self::DEFAULT_ITEMS,
        }
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// The estimate was zero; nothing was fetched.
    NothingToDo,
    /// An empty page or a page without a continuation token was reached.
    EndOfStream,
    /// A page fetch failed. Pages admitted before the failure still drained.
    FetchFailed {
        /// Fetch error text.
        message: String,
    },
    /// A stop was requested. In-flight work drained; nothing new started.
    Cancelled,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::NothingToDo => write!(f, "nothing to do"),
            Termination::EndOfStream => write!(f, "end of stream"),
            Termination::FetchFailed { message } => write!(f, "page fetch failed: {message}"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final result of a run. Built once, after every page task has joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Correlates this report with the run's log output.
    pub run_id: PipelineRunId,
    /// Estimate obtained at the start of the run, or `-1`.
    pub estimated_total: EstimatedTotal,
    /// Items whose mutation succeeded.
    pub succeeded: u64,
    /// Items whose mutation failed.
    pub failed: u64,
    /// Items listed but never dispatched because of cancellation.
    pub skipped: u64,
    /// Pages that finished processing.
    pub pages_processed: u64,
    /// Why pagination stopped.
    pub termination: Termination,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the last page task joined.
    pub finished_at: Timestamp,
}

impl RunReport {
    /// Items that were handed to the mutator.
    pub fn attempted(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Returns `true` when there was nothing pending and nothing was done.
    pub fn is_nothing_to_do(&self) -> bool {
        self.estimated_total.is_zero() && self.succeeded == 0
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
