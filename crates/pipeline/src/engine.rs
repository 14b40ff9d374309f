//! The page pipeline: sequential pagination with pipelined, bounded page
//! processing.
//!
//! ## Flow
//!
//! ```text
//! Idle ─► Fetching ─► Dispatching ─► Fetching ─► … ─► Draining ─► Done
//!            │                                          ▲
//!            └── empty page / last page / fetch error ──┘
//!                / cancellation
//! ```
//!
//! Fetches are strictly sequential because each one needs the previous
//! page's continuation token. After a page is fetched the loop waits only for
//! a free page slot, launches the page's batch processor as a task, and goes
//! straight back to fetching. The page gate is therefore the backpressure
//! point: with every slot busy the loop stops fetching ahead.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::batch::ItemBatchProcessor;
use crate::ports::{ItemMutator, PageFetcher, PendingCountSource};
use crate::summary::RunSummary;
use crate::{
    ConcurrencyLimits, ContinuationToken, EstimatedTotal, PageNumber, PageOutcome, PipelineRunId,
    RunReport, Termination, Timestamp,
};

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, nothing requested yet.
    Idle,
    /// Waiting on the page fetcher.
    Fetching,
    /// Waiting for a page slot, then launching the page task.
    Dispatching,
    /// No more fetches; joining outstanding page tasks.
    Draining,
    /// Every page task has joined. The summary is final.
    Done,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Fetching => "fetching",
            PipelineState::Dispatching => "dispatching",
            PipelineState::Draining => "draining",
            PipelineState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Drives a complete run over a paginated collection.
pub struct PagePipeline {
    estimator: Option<Arc<dyn PendingCountSource>>,
    fetcher: Arc<dyn PageFetcher>,
    mutator: Arc<dyn ItemMutator>,
    limits: ConcurrencyLimits,
}

impl PagePipeline {
    /// Creates a pipeline with no estimate source; the total is reported as
    /// unknown unless [`PagePipeline::with_estimator`] is used.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        mutator: Arc<dyn ItemMutator>,
        limits: ConcurrencyLimits,
    ) -> Self {
        Self {
            estimator: None,
            fetcher,
            mutator,
            limits,
        }
    }

    /// Sets the source of the up-front pending-count estimate.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn PendingCountSource>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Runs to completion. Blocks until every launched page task has joined.
    pub async fn run(&self) -> RunReport {
        self.run_until_cancelled(CancellationToken::new()).await
    }

    /// Runs until the stream ends, a fetch fails, or `cancel` fires.
    ///
    /// On cancellation no new fetch or mutation is started, but mutations
    /// already in flight complete and are counted.
    pub async fn run_until_cancelled(&self, cancel: CancellationToken) -> RunReport {
        let run_id = PipelineRunId::new_random();
        let span = info_span!("sweep_run", run_id = %run_id);
        self.drive(run_id, cancel).instrument(span).await
    }

    async fn drive(&self, run_id: PipelineRunId, cancel: CancellationToken) -> RunReport {
        let started_at = Timestamp::now();
        let mut state = PipelineState::Idle;

        let estimated_total = self.estimate().await;
        let summary = Arc::new(RunSummary::new(estimated_total));
        info!(
            estimated_total = %estimated_total,
            max_concurrent_pages = self.limits.max_concurrent_pages,
            max_concurrent_items = self.limits.max_concurrent_items,
            "Starting run"
        );

        if estimated_total.is_zero() {
            info!("Nothing pending; skipping pagination");
            advance(&mut state, PipelineState::Done);
            return report(run_id, &summary, Termination::NothingToDo, started_at);
        }

        let page_gate = Arc::new(Semaphore::new(self.limits.max_concurrent_pages));
        let processor = Arc::new(
            ItemBatchProcessor::new(
                Arc::clone(&self.mutator),
                Arc::clone(&summary),
                self.limits.max_concurrent_items,
            )
            .with_cancellation(cancel.clone()),
        );
        let mut page_tasks: JoinSet<PageOutcome> = JoinSet::new();
        let mut token: Option<ContinuationToken> = None;
        let mut page_number = PageNumber::FIRST;

        let termination = loop {
            advance(&mut state, PipelineState::Fetching);
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Termination::Cancelled,
                fetched = self.fetcher.fetch(token.as_ref()) => fetched,
            };
            let page = match fetched {
                Ok(page) => page,
                Err(err) => {
                    warn!(
                        page = %page_number,
                        error = %err,
                        "Page fetch failed; no further pages will be requested"
                    );
                    break Termination::FetchFailed {
                        message: err.to_string(),
                    };
                }
            };
            if page.is_empty() {
                debug!(page = %page_number, "Empty page; end of stream");
                break Termination::EndOfStream;
            }

            advance(&mut state, PipelineState::Dispatching);
            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.record_skipped(page.len() as u64);
                    break Termination::Cancelled;
                }
                slot = Arc::clone(&page_gate).acquire_owned() => match slot {
                    Ok(slot) => slot,
                    Err(_) => {
                        // The gate is owned by this loop and never closed.
                        error!("Page gate closed unexpectedly");
                        summary.record_skipped(page.len() as u64);
                        break Termination::Cancelled;
                    }
                },
            };

            let number = page_number;
            let items = page.items;
            let processor = Arc::clone(&processor);
            let summary_for_page = Arc::clone(&summary);
            debug!(page = %number, items = items.len(), "Dispatching page");
            page_tasks.spawn(
                async move {
                    let _slot = slot;
                    let outcome = processor.process(number, items).await;
                    summary_for_page.record_page();
                    info!(
                        page = %number,
                        items = outcome.items,
                        succeeded = outcome.succeeded,
                        failed = outcome.failed,
                        skipped = outcome.skipped,
                        total_succeeded = summary_for_page.succeeded(),
                        estimated_total = %summary_for_page.estimated_total(),
                        "Page processed"
                    );
                    outcome
                }
                .in_current_span(),
            );

            // Finished pages are reaped as we go; the full join happens below.
            while let Some(joined) = page_tasks.try_join_next() {
                check_page_join(joined);
            }

            match page.next {
                Some(next) => {
                    token = Some(next);
                    page_number = page_number.next();
                }
                None => {
                    debug!(page = %number, "No continuation token; end of stream");
                    break Termination::EndOfStream;
                }
            }
        };

        advance(&mut state, PipelineState::Draining);
        debug!(outstanding = page_tasks.len(), "Waiting for page tasks");
        while let Some(joined) = page_tasks.join_next().await {
            check_page_join(joined);
        }
        advance(&mut state, PipelineState::Done);

        let report = report(run_id, &summary, termination, started_at);
        info!(
            estimated_total = %report.estimated_total,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            pages = report.pages_processed,
            "Run finished"
        );
        report
    }

    async fn estimate(&self) -> EstimatedTotal {
        let Some(estimator) = &self.estimator else {
            return EstimatedTotal::UNKNOWN;
        };
        match estimator.estimated_pending_count().await {
            Ok(count) => EstimatedTotal::new(count),
            Err(err) => {
                warn!(error = %err, "Could not obtain pending-count estimate; total is unknown");
                EstimatedTotal::UNKNOWN
            }
        }
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    if *state != next {
        debug!(from = %state, to = %next, "Pipeline state change");
        *state = next;
    }
}

fn check_page_join(joined: Result<PageOutcome, JoinError>) {
    match joined {
        Ok(outcome) => {
            if let Err(err) = outcome.verify() {
                error!(page = %outcome.page, error = %err, "Page outcome rejected");
            }
        }
        Err(err) => error!(error = %err, "Page task did not complete"),
    }
}

fn report(
    run_id: PipelineRunId,
    summary: &RunSummary,
    termination: Termination,
    started_at: Timestamp,
) -> RunReport {
    let snapshot = summary.snapshot();
    RunReport {
        run_id,
        estimated_total: snapshot.estimated_total,
        succeeded: snapshot.succeeded,
        failed: snapshot.failed,
        skipped: snapshot.skipped,
        pages_processed: snapshot.pages_processed,
        termination,
        started_at,
        finished_at: Timestamp::now(),
    }
}
