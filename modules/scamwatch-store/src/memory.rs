// In-memory ReportStore for tests. Mirrors the Postgres semantics: unique
// external IDs, orphan comments dropped, guarded completion, rollups keyed
// by (country, city).

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use scamwatch_common::{
    CommentAnalysis, Engagement, EngagementKind, FetchJob, IncidentContribution, JobUpdate,
    LocationStat, LossAveraging, NamedCount, NewComment, RawComment, RawPost,
    ReportEnrichment, ReportQuery, ReportSort, ReportSummary, ScamReport, MAX_PAGE_SIZE,
};

use crate::error::Result;
use crate::store::{ReportStore, ResetScope};

type StatKey = (String, String);

#[derive(Default)]
struct Inner {
    reports: Vec<ScamReport>,
    comments: Vec<RawComment>,
    jobs: BTreeMap<(String, String), FetchJob>,
    stats: BTreeMap<StatKey, LocationStat>,
}

/// Thread-safe via interior Mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    averaging: LossAveraging,
}

fn stat_key(country: &str, city: Option<&str>) -> StatKey {
    (country.to_string(), city.unwrap_or("").to_string())
}

fn contribute(
    inner: &mut Inner,
    contribution: &IncidentContribution,
    averaging: LossAveraging,
) -> LocationStat {
    let key = stat_key(&contribution.country, contribution.city.as_deref());
    let stat = inner.stats.entry(key).or_insert_with(|| {
        LocationStat::new(&contribution.country, contribution.city.as_deref())
    });
    stat.record(contribution, averaging, Utc::now());
    stat.clone()
}

fn eq_ignore_case(stored: Option<&str>, wanted: &str) -> bool {
    stored.is_some_and(|s| s.eq_ignore_ascii_case(wanted))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_averaging(mut self, averaging: LossAveraging) -> Self {
        self.averaging = averaging;
        self
    }

    // Test inspection helpers.

    pub fn report_count(&self) -> usize {
        self.inner.lock().unwrap().reports.len()
    }

    pub fn comments_for(&self, parent_external_id: &str) -> Vec<RawComment> {
        let inner = self.inner.lock().unwrap();
        let Some(report) = inner
            .reports
            .iter()
            .find(|r| r.post.external_id == parent_external_id)
        else {
            return Vec::new();
        };
        inner
            .comments
            .iter()
            .filter(|c| c.report_id == report.id)
            .cloned()
            .collect()
    }

    /// Seed a report directly, bypassing ingestion.
    pub fn insert_report(&self, report: ScamReport) {
        self.inner.lock().unwrap().reports.push(report);
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn upsert_post(&self, post: &RawPost) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .reports
            .iter()
            .any(|r| r.post.external_id == post.external_id)
        {
            return Ok(false);
        }
        inner.reports.push(ScamReport::unprocessed(post.clone()));
        Ok(true)
    }

    async fn insert_comments(
        &self,
        parent_external_id: &str,
        comments: &[NewComment],
    ) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let Some(report_id) = inner
            .reports
            .iter()
            .find(|r| r.post.external_id == parent_external_id)
            .map(|r| r.id)
        else {
            return Ok(0);
        };

        let mut seen: HashSet<String> = inner
            .comments
            .iter()
            .filter(|c| c.report_id == report_id)
            .map(|c| c.external_id.clone())
            .collect();

        let mut inserted = 0;
        for comment in comments {
            if !seen.insert(comment.external_id.clone()) {
                continue;
            }
            inner.comments.push(RawComment {
                id: Uuid::new_v4(),
                report_id,
                external_id: comment.external_id.clone(),
                parent_external_id: comment.parent_external_id.clone(),
                author: comment.author.clone(),
                body: comment.body.clone(),
                score: comment.score,
                created_at: comment.created_at,
                depth: comment.depth,
                is_analyzed_for_scam: false,
                analysis: None,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn comment_count(&self, parent_external_id: &str) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        let Some(report_id) = inner
            .reports
            .iter()
            .find(|r| r.post.external_id == parent_external_id)
            .map(|r| r.id)
        else {
            return Ok(0);
        };
        Ok(inner.comments.iter().filter(|c| c.report_id == report_id).count() as i64)
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<ScamReport>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.reports.iter().find(|r| r.id == id).cloned())
    }

    async fn get_report_by_external_id(&self, external_id: &str) -> Result<Option<ScamReport>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reports
            .iter()
            .find(|r| r.post.external_id == external_id)
            .cloned())
    }

    async fn unprocessed_reports(&self, limit: i64, max_attempts: i32) -> Result<Vec<ScamReport>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reports
            .iter()
            .filter(|r| !r.is_processed && r.processing_attempts < max_attempts)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn complete_report(
        &self,
        id: Uuid,
        enrichment: &ReportEnrichment,
        contribution: Option<&IncidentContribution>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(report) = inner
            .reports
            .iter_mut()
            .find(|r| r.id == id && !r.is_processed)
        else {
            return Ok(false);
        };
        report.is_processed = true;
        report.enrichment = enrichment.clone();
        report.processed_at = Some(Utc::now());

        if let Some(contribution) = contribution {
            contribute(&mut inner, contribution, self.averaging);
        }
        Ok(true)
    }

    async fn record_processing_error(&self, id: Uuid, error: &str) -> Result<Option<i32>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .reports
            .iter_mut()
            .find(|r| r.id == id && !r.is_processed)
            .map(|report| {
                report.processing_errors.push(error.to_string());
                report.processing_attempts += 1;
                report.processing_attempts
            }))
    }

    async fn reset_for_reprocessing(&self, scope: &ResetScope) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut reset = 0;
        for report in inner.reports.iter_mut() {
            let selected = match scope {
                ResetScope::All => true,
                ResetScope::Country(country) => {
                    eq_ignore_case(report.enrichment.location.country.as_deref(), country)
                }
                ResetScope::Stalled { max_attempts } => {
                    !report.is_processed && report.processing_attempts >= *max_attempts
                }
            };
            if selected {
                report.is_processed = false;
                report.enrichment = ReportEnrichment::default();
                report.processing_errors.clear();
                report.processing_attempts = 0;
                report.processed_at = None;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn stalled_reports(&self, max_attempts: i32, limit: i64) -> Result<Vec<ScamReport>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reports
            .iter()
            .filter(|r| !r.is_processed && r.processing_attempts >= max_attempts)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn unanalyzed_comments(&self, limit: i64) -> Result<Vec<RawComment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .comments
            .iter()
            .filter(|c| !c.is_analyzed_for_scam)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn complete_comment(
        &self,
        id: Uuid,
        analysis: &CommentAnalysis,
        contribution: Option<&IncidentContribution>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(comment) = inner
            .comments
            .iter_mut()
            .find(|c| c.id == id && !c.is_analyzed_for_scam)
        else {
            return Ok(false);
        };
        comment.is_analyzed_for_scam = true;
        comment.analysis = Some(analysis.clone());

        if let Some(contribution) = contribution {
            contribute(&mut inner, contribution, self.averaging);
        }
        Ok(true)
    }

    async fn update_fetch_job(
        &self,
        channel: &str,
        search_term: &str,
        update: &JobUpdate,
    ) -> Result<FetchJob> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .entry((channel.to_string(), search_term.to_string()))
            .or_insert_with(|| FetchJob::new(channel, search_term));
        job.apply(update, Utc::now());
        Ok(job.clone())
    }

    async fn fetch_job(&self, channel: &str, search_term: &str) -> Result<Option<FetchJob>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .get(&(channel.to_string(), search_term.to_string()))
            .cloned())
    }

    async fn list_fetch_jobs(&self) -> Result<Vec<FetchJob>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.values().cloned().collect())
    }

    async fn stop_all_jobs(&self, reason: &str) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut stopped = 0;
        for job in inner.jobs.values_mut().filter(|j| j.status.is_active()) {
            job.apply(
                &JobUpdate::Stopped {
                    reason: reason.to_string(),
                },
                now,
            );
            stopped += 1;
        }
        Ok(stopped)
    }

    async fn record_incident(&self, contribution: &IncidentContribution) -> Result<LocationStat> {
        let mut inner = self.inner.lock().unwrap();
        Ok(contribute(&mut inner, contribution, self.averaging))
    }

    async fn location_stat(
        &self,
        country: &str,
        city: Option<&str>,
    ) -> Result<Option<LocationStat>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.stats.get(&stat_key(country, city)).cloned())
    }

    async fn location_stats(&self, limit: i64) -> Result<Vec<LocationStat>> {
        let inner = self.inner.lock().unwrap();
        let mut stats: Vec<LocationStat> = inner.stats.values().cloned().collect();
        stats.sort_by(|a, b| b.total_scams.cmp(&a.total_scams));
        stats.truncate(limit.clamp(1, MAX_PAGE_SIZE) as usize);
        Ok(stats)
    }

    async fn reset_location_stats(&self) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.stats.len() as u64;
        inner.stats.clear();
        Ok(removed)
    }

    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<ScamReport>> {
        let query = query.clone().normalized();
        let inner = self.inner.lock().unwrap();

        let mut matches: Vec<ScamReport> = inner
            .reports
            .iter()
            .filter(|r| r.is_processed)
            .filter(|r| !query.incidents_only || r.enrichment.is_incident)
            .filter(|r| {
                let location = &r.enrichment.location;
                query
                    .country
                    .as_deref()
                    .map_or(true, |c| eq_ignore_case(location.country.as_deref(), c))
                    && query
                        .city
                        .as_deref()
                        .map_or(true, |c| eq_ignore_case(location.city.as_deref(), c))
            })
            .filter(|r| query.category.map_or(true, |c| r.enrichment.category == Some(c)))
            .cloned()
            .collect();

        match query.sort {
            ReportSort::Recent => matches.sort_by(|a, b| b.post.created_at.cmp(&a.post.created_at)),
            ReportSort::Score => matches.sort_by(|a, b| b.post.score.cmp(&a.post.score)),
            ReportSort::Loss => {
                let loss =
                    |r: &ScamReport| r.enrichment.loss.as_ref().map_or(f64::MIN, |l| l.amount);
                matches.sort_by(|a, b| loss(b).total_cmp(&loss(a)));
            }
        }

        Ok(matches
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    /// Case-insensitive match on every word; a stand-in for the database's
    /// full-text ranking.
    async fn search_reports(&self, text: &str, limit: i64) -> Result<Vec<ScamReport>> {
        let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reports
            .iter()
            .filter(|r| r.is_processed)
            .filter(|r| {
                let haystack = format!(
                    "{} {} {}",
                    r.post.title,
                    r.post.body,
                    r.enrichment.summary.as_deref().unwrap_or("")
                )
                .to_lowercase();
                words.iter().all(|w| haystack.contains(w.as_str()))
            })
            .take(limit.clamp(1, MAX_PAGE_SIZE) as usize)
            .cloned()
            .collect())
    }

    async fn report_summary(&self, max_attempts: i32) -> Result<ReportSummary> {
        let inner = self.inner.lock().unwrap();
        let mut summary = ReportSummary {
            total_reports: inner.reports.len() as i64,
            ..Default::default()
        };
        let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
        let mut by_country: BTreeMap<String, i64> = BTreeMap::new();

        for report in &inner.reports {
            if report.is_processed {
                summary.processed += 1;
            } else if report.processing_attempts >= max_attempts {
                summary.stalled += 1;
            } else {
                summary.unprocessed += 1;
            }
            if report.is_processed && report.enrichment.is_incident {
                summary.incidents += 1;
                if let Some(category) = report.enrichment.category {
                    *by_category.entry(category.as_str().to_string()).or_default() += 1;
                }
                if let Some(country) = &report.enrichment.location.country {
                    *by_country.entry(country.clone()).or_default() += 1;
                }
            }
        }

        let ranked = |counts: BTreeMap<String, i64>| -> Vec<NamedCount> {
            let mut named: Vec<NamedCount> = counts
                .into_iter()
                .map(|(name, count)| NamedCount { name, count })
                .collect();
            named.sort_by(|a, b| b.count.cmp(&a.count));
            named
        };
        summary.by_category = ranked(by_category);
        summary.by_country = ranked(by_country);
        Ok(summary)
    }

    async fn record_engagement(
        &self,
        id: Uuid,
        kind: EngagementKind,
    ) -> Result<Option<Engagement>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.reports.iter_mut().find(|r| r.id == id).map(|report| {
            let engagement = &mut report.engagement;
            match kind {
                EngagementKind::Helpful => engagement.helpful += 1,
                EngagementKind::View => engagement.views += 1,
                EngagementKind::Flag => engagement.flags += 1,
            }
            *engagement
        }))
    }
}
