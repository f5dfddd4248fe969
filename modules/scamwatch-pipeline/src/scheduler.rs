//! Resumable batching over the (channel x term) work matrix.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use scamwatch_common::{FetchJob, JobUpdate};
use scamwatch_store::ReportStore;

use crate::budget::TimeBudget;
use crate::source::{SourceClient, UnitReport};

pub const STOPPED_REASON: &str = "Manually stopped";

/// Channels crossed with search terms, flattened to indices `0..len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkMatrix {
    channels: Vec<String>,
    terms: Vec<String>,
}

impl WorkMatrix {
    pub fn new(channels: Vec<String>, terms: Vec<String>) -> Self {
        Self { channels, terms }
    }

    pub fn len(&self) -> usize {
        self.channels.len() * self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unit(&self, index: usize) -> Option<(&str, &str)> {
        if index >= self.len() {
            return None;
        }
        let terms = self.terms.len();
        Some((&self.channels[index / terms], &self.terms[index % terms]))
    }

    /// Half-open index range covered by a batch.
    pub fn batch_range(&self, batch_number: usize, batch_size: usize) -> std::ops::Range<usize> {
        let start = batch_number.saturating_mul(batch_size).min(self.len());
        let end = start.saturating_add(batch_size).min(self.len());
        start..end
    }

    pub fn batch_count(&self, batch_size: usize) -> usize {
        if batch_size == 0 {
            return 0;
        }
        self.len().div_ceil(batch_size)
    }
}

/// Where the next call should pick up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchCursor {
    /// Start this batch from its first unit.
    Next { batch: usize },
    /// This batch stopped early; continue it at unit `index`.
    Resume { batch: usize, index: usize },
    #[default]
    Exhausted,
}

impl BatchCursor {
    /// Batch number to call next, or None once the matrix is exhausted.
    pub fn batch(&self) -> Option<usize> {
        match *self {
            BatchCursor::Next { batch } | BatchCursor::Resume { batch, .. } => Some(batch),
            BatchCursor::Exhausted => None,
        }
    }

    /// First unit to visit within [`batch`](Self::batch), if not its start.
    pub fn resume_index(&self) -> Option<usize> {
        match *self {
            BatchCursor::Resume { index, .. } => Some(index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub batch_number: usize,
    pub next: BatchCursor,
    pub units_processed: usize,
    pub units_failed: usize,
    pub posts_fetched: usize,
    pub posts_inserted: usize,
    pub comments_inserted: usize,
    pub stopped_early: bool,
}

impl BatchOutcome {
    pub fn is_exhausted(&self) -> bool {
        self.next == BatchCursor::Exhausted
    }

    fn absorb(&mut self, unit: &UnitReport) {
        self.units_processed += 1;
        if unit.is_failure() {
            self.units_failed += 1;
        }
        self.posts_fetched += unit.posts_seen;
        self.posts_inserted += unit.posts_inserted;
        self.comments_inserted += unit.comments_inserted;
    }
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub per_term_limit: u32,
    pub with_comments: bool,
    /// Time one unit may need; no new unit starts with less left.
    pub unit_reserve: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            per_term_limit: 25,
            with_comments: false,
            unit_reserve: Duration::from_secs(30),
        }
    }
}

pub struct BatchScheduler {
    matrix: WorkMatrix,
    source: SourceClient,
    store: Arc<dyn ReportStore>,
}

impl BatchScheduler {
    pub fn new(matrix: WorkMatrix, source: SourceClient, store: Arc<dyn ReportStore>) -> Self {
        Self {
            matrix,
            source,
            store,
        }
    }

    pub fn matrix(&self) -> &WorkMatrix {
        &self.matrix
    }

    /// Process one slice of the matrix. Unit failures are recorded in the job
    /// ledger and never stop the batch; only the time budget does.
    pub async fn run_batch(
        &self,
        batch_number: usize,
        settings: &BatchSettings,
        budget: &TimeBudget,
    ) -> BatchOutcome {
        self.resume_batch(batch_number, 0, settings, budget).await
    }

    /// Like [`run_batch`](Self::run_batch), skipping the batch's units below
    /// `from_index`.
    pub async fn resume_batch(
        &self,
        batch_number: usize,
        from_index: usize,
        settings: &BatchSettings,
        budget: &TimeBudget,
    ) -> BatchOutcome {
        let batch_size = settings.batch_size.max(1);
        let batch = self.matrix.batch_range(batch_number, batch_size);
        let range = from_index.clamp(batch.start, batch.end)..batch.end;
        let mut outcome = BatchOutcome {
            batch_number,
            ..Default::default()
        };

        info!(
            batch = batch_number,
            from = range.start,
            to = range.end,
            total = self.matrix.len(),
            "Starting batch"
        );

        for index in range.clone() {
            if budget.should_stop(settings.unit_reserve) {
                warn!(
                    batch = batch_number,
                    resume_index = index,
                    "Time budget nearly spent, stopping batch"
                );
                outcome.stopped_early = true;
                outcome.next = BatchCursor::Resume {
                    batch: batch_number,
                    index,
                };
                break;
            }
            let Some((channel, term)) = self.matrix.unit(index) else {
                break;
            };

            self.ledger(channel, term, &JobUpdate::Started).await;
            let unit = self
                .source
                .fetch_unit(channel, term, settings.per_term_limit, settings.with_comments)
                .await;
            let update = match &unit.error {
                Some(error) => JobUpdate::Failed { error: error.clone() },
                None => JobUpdate::Completed {
                    posts_inserted: unit.posts_inserted as i64,
                },
            };
            self.ledger(channel, term, &update).await;
            outcome.absorb(&unit);
        }

        if !outcome.stopped_early {
            outcome.next = if range.end < self.matrix.len() {
                BatchCursor::Next {
                    batch: batch_number + 1,
                }
            } else {
                BatchCursor::Exhausted
            };
        }

        info!(
            batch = batch_number,
            next = ?outcome.next,
            processed = outcome.units_processed,
            failed = outcome.units_failed,
            inserted = outcome.posts_inserted,
            stopped_early = outcome.stopped_early,
            "Batch finished"
        );
        outcome
    }

    /// Run batches from `start` until the matrix is exhausted or the budget
    /// runs out. Returns the last batch's outcome.
    pub async fn run_all(
        &self,
        start: BatchCursor,
        settings: &BatchSettings,
        budget: &TimeBudget,
    ) -> BatchOutcome {
        let mut cursor = start;
        loop {
            let Some(batch) = cursor.batch() else {
                return BatchOutcome::default();
            };
            let from_index = cursor.resume_index().unwrap_or(0);
            let outcome = self.resume_batch(batch, from_index, settings, budget).await;
            if outcome.stopped_early || outcome.is_exhausted() {
                return outcome;
            }
            cursor = outcome.next;
        }
    }

    /// Ledger writes are best effort; a failed write must not fail the unit.
    async fn ledger(&self, channel: &str, term: &str, update: &JobUpdate) {
        if let Err(e) = self.store.update_fetch_job(channel, term, update).await {
            warn!(channel, term, error = %e, "Failed to update fetch job");
        }
    }
}

/// Flip every pending or processing job to failed.
pub async fn stop_all_jobs(store: &dyn ReportStore) -> anyhow::Result<u64> {
    let stopped = store.stop_all_jobs(STOPPED_REASON).await?;
    info!(stopped, "Stopped active fetch jobs");
    Ok(stopped)
}

/// Jobs ordered for display: active first, then most recently updated.
pub fn order_jobs(mut jobs: Vec<FetchJob>) -> Vec<FetchJob> {
    jobs.sort_by(|a, b| {
        b.status
            .is_active()
            .cmp(&a.status.is_active())
            .then(b.updated_at.cmp(&a.updated_at))
    });
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(channels: usize, terms: usize) -> WorkMatrix {
        WorkMatrix::new(
            (0..channels).map(|c| format!("c{c}")).collect(),
            (0..terms).map(|t| format!("t{t}")).collect(),
        )
    }

    #[test]
    fn index_maps_channel_major() {
        let m = matrix(2, 3);
        assert_eq!(m.unit(0), Some(("c0", "t0")));
        assert_eq!(m.unit(2), Some(("c0", "t2")));
        assert_eq!(m.unit(3), Some(("c1", "t0")));
        assert_eq!(m.unit(6), None);
    }

    #[test]
    fn batches_tile_the_matrix() {
        let m = matrix(3, 4);
        assert_eq!(m.batch_count(5), 3);
        assert_eq!(m.batch_range(0, 5), 0..5);
        assert_eq!(m.batch_range(2, 5), 10..12);
        assert_eq!(m.batch_range(7, 5), 12..12);
    }

    #[test]
    fn empty_matrix_has_no_units() {
        let m = matrix(0, 4);
        assert!(m.is_empty());
        assert_eq!(m.batch_count(5), 0);
        assert_eq!(m.batch_range(0, 5), 0..0);
    }
}
