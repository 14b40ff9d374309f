//! Bounded-concurrency mutation of one page's items.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Instrument};

use crate::ports::ItemMutator;
use crate::summary::RunSummary;
use crate::{FailureKind, Item, ItemOutcome, MutationFailure, PageNumber, PageOutcome};

/// Runs the mutator across one page's items with at most
/// `max_concurrent_items` calls in flight.
///
/// Each call to [`ItemBatchProcessor::process`] creates its own item gate, so
/// pages processed concurrently do not share item slots.
pub struct ItemBatchProcessor {
    mutator: Arc<dyn ItemMutator>,
    summary: Arc<RunSummary>,
    max_concurrent_items: usize,
    cancel: CancellationToken,
}

impl ItemBatchProcessor {
    /// Creates a processor that records into `summary`.
    ///
    /// A width of zero is raised to one; validated limits never contain zero.
    pub fn new(
        mutator: Arc<dyn ItemMutator>,
        summary: Arc<RunSummary>,
        max_concurrent_items: usize,
    ) -> Self {
        Self {
            mutator,
            summary,
            max_concurrent_items: max_concurrent_items.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops dispatching new items once `cancel` fires. In-flight calls finish.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Mutates every item and returns once all dispatched calls have finished.
    ///
    /// A slot is acquired before each item task is spawned and travels with
    /// the task, so it is released on every exit path, panics included.
    #[instrument(skip_all, fields(page = %page, items = items.len()))]
    pub async fn process(&self, page: PageNumber, items: Vec<Item>) -> PageOutcome {
        let total = items.len() as u64;
        let gate = Arc::new(Semaphore::new(self.max_concurrent_items));
        let mut in_flight: JoinSet<ItemOutcome> = JoinSet::new();
        let mut dispatched = 0u64;

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&gate).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // The gate is local and never closed.
                    Err(_) => break,
                },
            };
            dispatched += 1;

            let mutator = Arc::clone(&self.mutator);
            let summary = Arc::clone(&self.summary);
            in_flight.spawn(
                async move {
                    let _slot = permit;
                    let outcome = mutate_one(mutator.as_ref(), &item).await;
                    match &outcome {
                        ItemOutcome::Succeeded => {
                            summary.record_success();
                        }
                        ItemOutcome::Failed(failure) => {
                            summary.record_failure();
                            warn!(
                                item_id = %item.id,
                                kind = %failure.kind,
                                error = %failure.message,
                                "Item mutation failed"
                            );
                        }
                    }
                    outcome
                }
                .in_current_span(),
            );
        }

        let skipped = total - dispatched;
        if skipped > 0 {
            debug!(skipped, "Cancellation requested; remaining items not dispatched");
            self.summary.record_skipped(skipped);
        }

        let mut succeeded = 0u64;
        let mut failed = 0u64;
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(ItemOutcome::Succeeded) => succeeded += 1,
                Ok(ItemOutcome::Failed(_)) => failed += 1,
                Err(err) => {
                    // The task died before recording anything.
                    failed += 1;
                    self.summary.record_failure();
                    let failure = MutationFailure::new(FailureKind::Internal, err.to_string());
                    warn!(kind = %failure.kind, error = %failure.message, "Item task did not complete");
                }
            }
        }

        PageOutcome {
            page,
            items: total,
            succeeded,
            failed,
            skipped,
        }
    }
}

/// Invokes the mutator and converts its error into an outcome value.
async fn mutate_one(mutator: &dyn ItemMutator, item: &Item) -> ItemOutcome {
    match mutator.mutate(item).await {
        Ok(()) => ItemOutcome::Succeeded,
        Err(err) => ItemOutcome::Failed(MutationFailure::from(err)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{EstimatedTotal, ItemId, MutationError};

    fn items(ids: &[&str]) -> Vec<Item> {
        ids.iter()
            .map(|id| Item::new(ItemId::new(*id).unwrap()))
            .collect()
    }

    /// Fails the listed ids, succeeds the rest, and tracks peak concurrency.
    struct FlakyMutator {
        failing: HashSet<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl FlakyMutator {
        fn new(failing: &[&str], delay: Duration) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl ItemMutator for FlakyMutator {
        async fn mutate(&self, item: &Item) -> Result<(), MutationError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(item.id.as_str()) {
                Err(MutationError::Rejected {
                    message: "nope".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    struct PanickingMutator;

    #[async_trait]
    impl ItemMutator for PanickingMutator {
        async fn mutate(&self, item: &Item) -> Result<(), MutationError> {
            if item.id.as_str() == "boom" {
                panic!("mutator blew up");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_siblings() {
        let mutator = Arc::new(FlakyMutator::new(&["B"], Duration::from_millis(1)));
        let summary = Arc::new(RunSummary::new(EstimatedTotal::UNKNOWN));
        let processor = ItemBatchProcessor::new(mutator, Arc::clone(&summary), 10);

        let outcome = processor
            .process(PageNumber::FIRST, items(&["A", "B", "C", "D", "E"]))
            .await;

        assert_eq!((outcome.items, outcome.succeeded, outcome.failed), (5, 4, 1));
        assert!(outcome.is_consistent());
        assert_eq!(summary.snapshot().succeeded, 4);
        assert_eq!(summary.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn in_flight_calls_never_exceed_gate_width() {
        let mutator = Arc::new(FlakyMutator::new(&[], Duration::from_millis(5)));
        let summary = Arc::new(RunSummary::new(EstimatedTotal::UNKNOWN));
        let shared: Arc<dyn ItemMutator> = mutator.clone();
        let processor = ItemBatchProcessor::new(shared, summary, 3);

        let ids: Vec<String> = (0..20).map(|i| format!("item-{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let outcome = processor.process(PageNumber::FIRST, items(&refs)).await;

        assert_eq!(outcome.succeeded, 20);
        assert!(mutator.peak.load(Ordering::SeqCst) <= 3);
        assert!(mutator.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn panicking_item_is_a_failure_and_releases_its_slot() {
        let summary = Arc::new(RunSummary::new(EstimatedTotal::UNKNOWN));
        // Width 1: a leaked slot would hang the remaining items.
        let processor = ItemBatchProcessor::new(Arc::new(PanickingMutator), Arc::clone(&summary), 1);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            processor.process(PageNumber::FIRST, items(&["a", "boom", "c"])),
        )
        .await
        .expect("slot leaked");

        assert_eq!((outcome.succeeded, outcome.failed), (2, 1));
        assert_eq!(summary.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn cancelled_page_skips_undispatched_items() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = Arc::new(RunSummary::new(EstimatedTotal::UNKNOWN));
        let processor = ItemBatchProcessor::new(
            Arc::new(FlakyMutator::new(&[], Duration::ZERO)),
            Arc::clone(&summary),
            2,
        )
        .with_cancellation(cancel);

        let outcome = processor.process(PageNumber::FIRST, items(&["a", "b", "c"])).await;

        assert_eq!((outcome.succeeded, outcome.skipped), (0, 3));
        assert!(outcome.is_consistent());
        assert_eq!(summary.snapshot().skipped, 3);
    }

    /// Succeeds every call and fires `cancel` during call number `cancel_on`.
    struct CancellingMutator {
        calls: AtomicUsize,
        cancel_on: usize,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl ItemMutator for CancellingMutator {
        async fn mutate(&self, _item: &Item) -> Result<(), MutationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.cancel_on {
                self.cancel.cancel();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancel_mid_page_counts_started_items_and_skips_the_rest() {
        let cancel = CancellationToken::new();
        let mutator = Arc::new(CancellingMutator {
            calls: AtomicUsize::new(0),
            cancel_on: 2,
            cancel: cancel.clone(),
        });
        let summary = Arc::new(RunSummary::new(EstimatedTotal::UNKNOWN));
        let shared: Arc<dyn ItemMutator> = mutator.clone();
        // Width 1: the third item waits for the second, which fires the cancel.
        let processor =
            ItemBatchProcessor::new(shared, Arc::clone(&summary), 1).with_cancellation(cancel);

        let outcome = processor
            .process(PageNumber::FIRST, items(&["a", "b", "c", "d", "e"]))
            .await;

        assert_eq!(outcome.succeeded + outcome.failed, 2);
        assert_eq!(outcome.skipped, 3);
        assert!(outcome.is_consistent());
        assert_eq!(mutator.calls.load(Ordering::SeqCst), 2);
        let snapshot = summary.snapshot();
        assert_eq!((snapshot.succeeded, snapshot.skipped), (2, 3));
    }

    #[tokio::test]
    async fn empty_page_completes_immediately() {
        let summary = Arc::new(RunSummary::new(EstimatedTotal::UNKNOWN));
        let processor = ItemBatchProcessor::new(
            Arc::new(FlakyMutator::new(&[], Duration::ZERO)),
            summary,
            4,
        );
        let outcome = processor.process(PageNumber::FIRST, Vec::new()).await;
        assert_eq!(outcome.items, 0);
        assert!(outcome.is_consistent());
    }
}
