//! Harvest coordinator
//!
//! **Per page:** FETCH → CONVERT → per record (ATTRIBUTE → DEDUPLICATE →
//! PERSIST OR MERGE) → ADVANCE CURSOR → next page or DONE.
//!
//! - Starts from the stored cursor for (dataset, requester), else the first page
//! - A transient fetch failure retries the same page; the cursor has not
//!   moved, so nothing is lost. `max_restarts` consecutive failures abort
//!   with `NetworkExhausted`, leaving the last good cursor stored
//! - Parse and storage errors abort immediately, cursor untouched
//! - Items the converter rejects are logged and counted as skipped
//! - Every page advances the cursor, even one with nothing eligible
//! - Normal completion clears the cursor
//!
//! Pages are strictly sequential: cursor order is what makes a harvest
//! resumable.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::fetchers::{HarvestSource, PageCursor};
use super::record_pipeline::RecordPipeline;
use crate::adapters::ConverterRegistry;
use crate::db::progress::ProgressStore;
use crate::models::{HarvestError, HarvestReport, Owner};

const DEFAULT_RETRY_DELAY_MS: u64 = 500;

#[derive(Clone)]
pub struct HarvestCoordinator {
    progress: ProgressStore,
    pipeline: RecordPipeline,
    registry: Arc<ConverterRegistry>,
    max_restarts: u32,
    retry_delay: Duration,
}

impl HarvestCoordinator {
    pub fn new(
        progress: ProgressStore,
        pipeline: RecordPipeline,
        registry: Arc<ConverterRegistry>,
        max_restarts: u32,
    ) -> Self {
        Self {
            progress,
            pipeline,
            registry,
            max_restarts: max_restarts.max(1),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }

    /// Pause between retries of a failed page
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub async fn run(
        &self,
        source: &dyn HarvestSource,
        requester: Option<Owner>,
    ) -> Result<HarvestReport, HarvestError> {
        let converter = self.registry.converter(source.kind())?;
        let dataset = source.dataset_key();
        let owner = requester.unwrap_or(Owner::System);

        let mut cursor = match self.progress.get(&dataset, &owner).await? {
            Some(stored) => {
                info!(dataset = %dataset, owner = %owner, cursor = %stored, "Resuming harvest");
                PageCursor::from_progress(&stored)
            }
            None => {
                info!(dataset = %dataset, owner = %owner, "Starting harvest");
                PageCursor::Start
            }
        };

        let mut report = HarvestReport::default();
        let mut consecutive_failures: u32 = 0;

        loop {
            let page = match source.fetch_page(&cursor).await {
                Ok(page) => {
                    consecutive_failures = 0;
                    page
                }
                Err(e) if e.is_transient() => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.max_restarts {
                        error!(
                            dataset = %dataset,
                            attempts = consecutive_failures,
                            error = %e,
                            "Harvest aborted, network failures exhausted the restart bound"
                        );
                        return Err(HarvestError::NetworkExhausted {
                            attempts: consecutive_failures,
                            last_error: e.to_string(),
                        });
                    }
                    report.restarts += 1;
                    warn!(
                        dataset = %dataset,
                        attempt = consecutive_failures,
                        max_restarts = self.max_restarts,
                        error = %e,
                        "Page fetch failed, retrying"
                    );
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    continue;
                }
                Err(e) => {
                    error!(dataset = %dataset, error = %e, "Harvest aborted");
                    return Err(e);
                }
            };

            report.pages += 1;
            report.fetched += page.items.len();

            for item in &page.items {
                match converter(item) {
                    Some(record) => {
                        let identifier = record.identifier.clone();
                        let outcome = self.pipeline.process(record, requester).await?;
                        debug!(dataset = %dataset, record = %identifier, outcome = ?outcome, "Record processed");
                        report.record(&outcome);
                    }
                    None => {
                        report.skipped += 1;
                        debug!(
                            dataset = %dataset,
                            page = report.pages,
                            item = %item.describe(),
                            "Item not convertible, skipped"
                        );
                    }
                }
            }

            info!(
                dataset = %dataset,
                page = report.pages,
                items = page.items.len(),
                created = report.created,
                merged = report.merged,
                "Page processed"
            );

            let next = page
                .next
                .and_then(|next| next.to_progress().map(|stored| (next, stored)));
            match next {
                Some((next, stored)) => {
                    self.progress.set(&dataset, &owner, &stored).await?;
                    cursor = next;
                }
                None => {
                    self.progress.clear(&dataset, &owner).await?;
                    break;
                }
            }
        }

        info!(
            dataset = %dataset,
            pages = report.pages,
            fetched = report.fetched,
            created = report.created,
            merged = report.merged,
            duplicates = report.duplicates,
            skipped = report.skipped,
            discarded = report.discarded,
            restarts = report.restarts,
            "Harvest complete"
        );
        Ok(report)
    }
}
