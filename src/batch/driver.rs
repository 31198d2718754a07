//! Batch fetch driver.
//!
//! Runs a list of work items through an [`AdmissionGate`], performing exactly
//! one fetch per admission. Throttled items are requeued for a later round.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::collector::{CollectedResponses, ResponseCollector, ResponseSender};
use super::fetcher::{FetchOutcome, Fetcher};
use super::item::WorkItem;
use crate::config::BatchConfig;
use crate::error::{Result, SluiceError};
use crate::ratelimit::AdmissionGate;

/// Summary of a finished batch job.
#[derive(Debug)]
pub struct BatchReport {
    /// Identifier used in this job's log span
    pub job_id: Uuid,
    /// Everything the response handler received
    pub responses: CollectedResponses,
    /// How many times an item was requeued after a throttled response
    pub throttled: usize,
    /// Ids of items whose fetch failed
    pub failed: Vec<String>,
    /// Items still throttled after the last round, or never run because of cancellation
    pub abandoned: Vec<WorkItem>,
    /// Whether the job was cancelled before finishing
    pub cancelled: bool,
}

enum ItemResult {
    Fetched(serde_json::Value),
    Throttled,
    Failed(SluiceError),
}

/// Drives work items through an admission gate and a fetcher.
pub struct BatchDriver<G, F> {
    gate: Arc<G>,
    fetcher: Arc<F>,
    config: BatchConfig,
}

impl<G: AdmissionGate, F: Fetcher> BatchDriver<G, F> {
    pub fn new(gate: Arc<G>, fetcher: Arc<F>, config: BatchConfig) -> Self {
        Self {
            gate,
            fetcher,
            config,
        }
    }

    /// Run every item to completion, or until `cancel` fires.
    pub async fn run(&self, items: Vec<WorkItem>, cancel: CancellationToken) -> Result<BatchReport> {
        let job_id = Uuid::new_v4();
        let span = info_span!("batch", job_id = %job_id);
        self.run_job(job_id, items, cancel).instrument(span).await
    }

    async fn run_job(
        &self,
        job_id: Uuid,
        items: Vec<WorkItem>,
        cancel: CancellationToken,
    ) -> Result<BatchReport> {
        info!(items = items.len(), "Starting batch job");

        let (tx, collector) = ResponseCollector::channel(self.config.max_in_flight);
        let collector = collector.spawn();

        let mut report = BatchReport {
            job_id,
            responses: CollectedResponses::default(),
            throttled: 0,
            failed: Vec::new(),
            abandoned: Vec::new(),
            cancelled: false,
        };

        let mut pending = items;
        let mut round = 0;
        while !pending.is_empty() {
            if round > self.config.max_retry_rounds {
                warn!(count = pending.len(), "Giving up on throttled items");
                report.abandoned = pending;
                break;
            }

            debug!(round, items = pending.len(), "Starting round");
            let (requeue, unstarted) = self.run_round(pending, &tx, &cancel, &mut report).await;
            report.throttled += requeue.len();

            if report.cancelled {
                report.abandoned = requeue.into_iter().chain(unstarted).collect();
                break;
            }
            pending = requeue;
            round += 1;
        }

        // Closing the channel stops the response handler.
        drop(tx);
        report.responses = collector.await?;

        info!(
            responses = report.responses.len(),
            throttled = report.throttled,
            failed = report.failed.len(),
            abandoned = report.abandoned.len(),
            cancelled = report.cancelled,
            "Batch job finished"
        );
        Ok(report)
    }

    /// Run one pass over `items`.
    ///
    /// Returns the throttled items and, on cancellation, the items that never
    /// completed.
    async fn run_round(
        &self,
        items: Vec<WorkItem>,
        tx: &ResponseSender,
        cancel: &CancellationToken,
        report: &mut BatchReport,
    ) -> (Vec<WorkItem>, Vec<WorkItem>) {
        let mut done = vec![false; items.len()];
        let mut remaining = items.len();
        let mut results = stream::iter(items.iter().enumerate())
            .map(|(index, item)| async move { (index, self.process(item).await) })
            .buffer_unordered(self.config.max_in_flight.max(1));

        let mut requeue = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(remaining, "Batch job cancelled");
                    report.cancelled = true;
                    let unfinished = items
                        .iter()
                        .zip(&done)
                        .filter(|(_, done)| !**done)
                        .map(|(item, _)| item.clone())
                        .collect();
                    return (requeue, unfinished);
                }
                next = results.next() => next,
            };
            let Some((index, result)) = next else {
                break;
            };
            done[index] = true;
            remaining -= 1;
            let item = &items[index];

            match result {
                ItemResult::Fetched(data) => {
                    if tx.send((item.clone(), data)).await.is_err() {
                        error!("Response handler stopped early");
                    }
                }
                ItemResult::Throttled => {
                    debug!(item = %item, "Throttled, requeueing");
                    requeue.push(item.clone());
                }
                ItemResult::Failed(err) => {
                    error!(item = %item, error = %err, "Fetch failed");
                    report.failed.push(item.id.clone());
                }
            }
        }

        (requeue, Vec::new())
    }

    /// Make exactly one fetch inside a scoped admission.
    async fn process(&self, item: &WorkItem) -> ItemResult {
        let admission = match self.gate.admit_one().await {
            Ok(admission) => admission,
            Err(err) => return ItemResult::Failed(err),
        };

        match admission.run(self.fetcher.fetch(item)).await {
            Ok(FetchOutcome::Data(data)) => ItemResult::Fetched(data),
            Ok(FetchOutcome::Throttled) => ItemResult::Throttled,
            Err(err) => ItemResult::Failed(err),
        }
    }
}
