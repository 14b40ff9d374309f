//! Process-wide run counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::EstimatedTotal;

/// Counters shared by every item task of a run.
///
/// The only writes are single atomic increments, so no lock is needed.
/// Reads through [`RunSummary::snapshot`] are only meaningful once every page
/// task has joined; the join provides the happens-before edge.
#[derive(Debug)]
pub struct RunSummary {
    estimated_total: EstimatedTotal,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    pages_processed: AtomicU64,
}

/// Point-in-time copy of a [`RunSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummarySnapshot {
    pub estimated_total: EstimatedTotal,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub pages_processed: u64,
}

impl RunSummary {
    pub fn new(estimated_total: EstimatedTotal) -> Self {
        Self {
            estimated_total,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            pages_processed: AtomicU64::new(0),
        }
    }

    pub fn estimated_total(&self) -> EstimatedTotal {
        self.estimated_total
    }

    /// Records one successful mutation and returns the new running total.
    pub fn record_success(&self) -> u64 {
        self.succeeded.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: u64) {
        if count > 0 {
            self.skipped.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Marks a page as finished. Item counts were already recorded per item.
    pub fn record_page(&self) {
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Running success count, for progress lines.
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SummarySnapshot {
        SummarySnapshot {
            estimated_total: self.estimated_total,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            pages_processed: self.pages_processed.load(Ordering::Relaxed),
        }
    }
}
