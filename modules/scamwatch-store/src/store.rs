// Storage boundary for the pipeline and the read API.
//
// Every mutation is keyed by a stable identifier (external post ID,
// (report, external comment ID), (channel, term), (country, city)) so
// overlapping or repeated invocations converge instead of duplicating.

use async_trait::async_trait;
use uuid::Uuid;

use scamwatch_common::{
    CommentAnalysis, Engagement, EngagementKind, FetchJob, IncidentContribution, JobUpdate,
    LocationStat, NewComment, RawComment, RawPost, ReportEnrichment, ReportQuery, ReportSummary,
    ScamReport,
};

use crate::error::Result;

/// Which reports an administrative reset returns to the unprocessed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetScope {
    All,
    Country(String),
    /// Reports that hit the attempt cutoff. Clears their error history.
    Stalled { max_attempts: i32 },
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    // --- Ingestion ---

    /// Insert a post unless its external ID is already stored. Returns true
    /// if a new row was created.
    async fn upsert_post(&self, post: &RawPost) -> Result<bool>;

    /// Attach a batch of comments to the report whose external ID is
    /// `parent_external_id`. Comments already stored for that report are
    /// skipped. Returns the number inserted; 0 when the parent is unknown.
    async fn insert_comments(
        &self,
        parent_external_id: &str,
        comments: &[NewComment],
    ) -> Result<usize>;

    /// Single-comment form of [`insert_comments`](Self::insert_comments).
    async fn upsert_comment(&self, parent_external_id: &str, comment: &NewComment) -> Result<bool> {
        let inserted = self
            .insert_comments(parent_external_id, std::slice::from_ref(comment))
            .await?;
        Ok(inserted > 0)
    }

    /// Comments stored under the report with this external ID.
    async fn comment_count(&self, parent_external_id: &str) -> Result<i64>;

    // --- Reports ---

    async fn get_report(&self, id: Uuid) -> Result<Option<ScamReport>>;

    async fn get_report_by_external_id(&self, external_id: &str) -> Result<Option<ScamReport>>;

    /// Oldest unprocessed reports still under the attempt cutoff.
    async fn unprocessed_reports(&self, limit: i64, max_attempts: i32) -> Result<Vec<ScamReport>>;

    /// Mark a report processed and, for a located incident, fold it into its
    /// location rollup in the same transaction. Returns false (and changes
    /// nothing) if the report was already processed.
    async fn complete_report(
        &self,
        id: Uuid,
        enrichment: &ReportEnrichment,
        contribution: Option<&IncidentContribution>,
    ) -> Result<bool>;

    /// Append an error and bump the attempt counter of an unprocessed report.
    /// Returns the new attempt count, or None if the report is gone or
    /// already processed.
    async fn record_processing_error(&self, id: Uuid, error: &str) -> Result<Option<i32>>;

    /// Return reports to the unprocessed state. Location rollups are left
    /// alone; pair a full reset with [`reset_location_stats`](Self::reset_location_stats).
    async fn reset_for_reprocessing(&self, scope: &ResetScope) -> Result<u64>;

    /// Unprocessed reports at or past the attempt cutoff.
    async fn stalled_reports(&self, max_attempts: i32, limit: i64) -> Result<Vec<ScamReport>>;

    // --- Comments ---

    async fn unanalyzed_comments(&self, limit: i64) -> Result<Vec<RawComment>>;

    /// Mark a comment analyzed and optionally contribute it to a rollup, in
    /// one transaction. Returns false if it was already analyzed.
    async fn complete_comment(
        &self,
        id: Uuid,
        analysis: &CommentAnalysis,
        contribution: Option<&IncidentContribution>,
    ) -> Result<bool>;

    // --- Fetch job ledger ---

    async fn update_fetch_job(
        &self,
        channel: &str,
        search_term: &str,
        update: &JobUpdate,
    ) -> Result<FetchJob>;

    async fn fetch_job(&self, channel: &str, search_term: &str) -> Result<Option<FetchJob>>;

    async fn list_fetch_jobs(&self) -> Result<Vec<FetchJob>>;

    /// Flip every pending or processing job to failed with `reason`.
    async fn stop_all_jobs(&self, reason: &str) -> Result<u64>;

    // --- Location rollups ---

    async fn record_incident(&self, contribution: &IncidentContribution) -> Result<LocationStat>;

    async fn location_stat(
        &self,
        country: &str,
        city: Option<&str>,
    ) -> Result<Option<LocationStat>>;

    /// Rollups ordered by total count, busiest first.
    async fn location_stats(&self, limit: i64) -> Result<Vec<LocationStat>>;

    async fn reset_location_stats(&self) -> Result<u64>;

    // --- Reads ---

    /// Processed reports matching `query`.
    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<ScamReport>>;

    /// Full-text search over processed reports.
    async fn search_reports(&self, text: &str, limit: i64) -> Result<Vec<ScamReport>>;

    async fn report_summary(&self, max_attempts: i32) -> Result<ReportSummary>;

    /// Bump one engagement counter. None if the report does not exist.
    async fn record_engagement(&self, id: Uuid, kind: EngagementKind) -> Result<Option<Engagement>>;
}
