use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use scamwatch_common::{
    CommentAnalysis, Engagement, EngagementKind, FetchJob, IncidentContribution, JobUpdate,
    LocationStat, LossAveraging, NamedCount, NewComment, RawComment, RawPost, ReportEnrichment,
    ReportQuery, ReportSort, ReportSummary, ScamReport, MAX_PAGE_SIZE,
};

use crate::error::Result;
use crate::rows::{
    city_key, into_reports, CommentRow, JobRow, ReportRow, StatRow, COMMENT_COLUMNS, JOB_COLUMNS,
    REPORT_COLUMNS, STAT_COLUMNS,
};
use crate::store::{ReportStore, ResetScope};

/// Rows per multi-VALUES insert. Nine binds per comment keeps a chunk well
/// under the Postgres bind limit.
const COMMENT_CHUNK: usize = 500;

const RESET_REPORT: &str = "UPDATE scam_reports SET \
     is_processed = false, is_incident = false, confidence = 0, category = NULL, \
     loss_amount = NULL, loss_currency = NULL, warning_signals = '{}', prevention_tips = '{}', \
     summary = NULL, country = NULL, city = NULL, specific_location = NULL, latitude = NULL, \
     longitude = NULL, processing_errors = '{}', processing_attempts = 0, processed_at = NULL";

/// Postgres-backed [`ReportStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    averaging: LossAveraging,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            averaging: LossAveraging::default(),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn with_loss_averaging(mut self, averaging: LossAveraging) -> Self {
        self.averaging = averaging;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations applied");
        Ok(())
    }

    async fn reports_by_attempts(
        &self,
        clause: &str,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<ScamReport>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM scam_reports WHERE {clause}");
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(max_attempts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        into_reports(rows)
    }
}

/// Fold one incident into its (country, city) row under a row lock.
async fn contribute(
    conn: &mut PgConnection,
    contribution: &IncidentContribution,
    averaging: LossAveraging,
) -> Result<LocationStat> {
    let city = city_key(contribution.city.as_deref());

    sqlx::query(
        "INSERT INTO location_stats (country, city) VALUES ($1, $2)
         ON CONFLICT (country, city) DO NOTHING",
    )
    .bind(&contribution.country)
    .bind(city)
    .execute(&mut *conn)
    .await?;

    let sql = format!(
        "SELECT {STAT_COLUMNS} FROM location_stats WHERE country = $1 AND city = $2 FOR UPDATE"
    );
    let row = sqlx::query_as::<_, StatRow>(&sql)
        .bind(&contribution.country)
        .bind(city)
        .fetch_one(&mut *conn)
        .await?;

    let mut stat = LocationStat::from(row);
    stat.record(contribution, averaging, Utc::now());

    sqlx::query(
        "UPDATE location_stats SET
            total_scams = $3, top_categories = $4, average_loss = $5, loss_samples = $6,
            latitude = $7, longitude = $8, last_updated = $9
         WHERE country = $1 AND city = $2",
    )
    .bind(&contribution.country)
    .bind(city)
    .bind(stat.total_scams)
    .bind(Json(&stat.top_categories))
    .bind(stat.average_loss)
    .bind(stat.loss_samples)
    .bind(stat.coordinates.map(|p| p.lat))
    .bind(stat.coordinates.map(|p| p.lng))
    .bind(stat.last_updated)
    .execute(&mut *conn)
    .await?;

    Ok(stat)
}

#[async_trait]
impl ReportStore for PgStore {
    async fn upsert_post(&self, post: &RawPost) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO scam_reports
                (id, external_id, channel, author, title, body, posted_at, score,
                 num_comments, permalink)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (external_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(&post.external_id)
        .bind(&post.channel)
        .bind(&post.author)
        .bind(&post.title)
        .bind(&post.body)
        .bind(post.created_at)
        .bind(post.score)
        .bind(post.num_comments)
        .bind(&post.permalink)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_comments(
        &self,
        parent_external_id: &str,
        comments: &[NewComment],
    ) -> Result<usize> {
        if comments.is_empty() {
            return Ok(0);
        }

        let report_id =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM scam_reports WHERE external_id = $1")
                .bind(parent_external_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(report_id) = report_id else {
            debug!(
                parent_external_id,
                dropped = comments.len(),
                "Parent not stored, dropping comments"
            );
            return Ok(0);
        };

        let mut seen: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT external_id FROM raw_comments WHERE report_id = $1",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        let fresh: Vec<&NewComment> = comments
            .iter()
            .filter(|c| seen.insert(c.external_id.clone()))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        for chunk in fresh.chunks(COMMENT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO raw_comments
                    (id, report_id, external_id, parent_external_id, author, body, score,
                     posted_at, depth) ",
            );
            qb.push_values(chunk.iter().copied(), |mut b, c| {
                b.push_bind(Uuid::new_v4())
                    .push_bind(report_id)
                    .push_bind(c.external_id.clone())
                    .push_bind(c.parent_external_id.clone())
                    .push_bind(c.author.clone())
                    .push_bind(c.body.clone())
                    .push_bind(c.score)
                    .push_bind(c.created_at)
                    .push_bind(c.depth);
            });
            qb.push(" ON CONFLICT (report_id, external_id) DO NOTHING");
            inserted += qb.build().execute(&self.pool).await?.rows_affected();
        }

        Ok(inserted as usize)
    }

    async fn comment_count(&self, parent_external_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM raw_comments c
             JOIN scam_reports r ON r.id = c.report_id
             WHERE r.external_id = $1",
        )
        .bind(parent_external_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<ScamReport>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM scam_reports WHERE id = $1");
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ScamReport::try_from).transpose()
    }

    async fn get_report_by_external_id(&self, external_id: &str) -> Result<Option<ScamReport>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM scam_reports WHERE external_id = $1");
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ScamReport::try_from).transpose()
    }

    async fn unprocessed_reports(&self, limit: i64, max_attempts: i32) -> Result<Vec<ScamReport>> {
        self.reports_by_attempts(
            "is_processed = false AND processing_attempts < $1
             ORDER BY ingested_at, posted_at LIMIT $2",
            max_attempts,
            limit,
        )
        .await
    }

    async fn complete_report(
        &self,
        id: Uuid,
        enrichment: &ReportEnrichment,
        contribution: Option<&IncidentContribution>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let location = &enrichment.location;

        let updated = sqlx::query(
            "UPDATE scam_reports SET
                is_processed = true, is_incident = $2, confidence = $3, category = $4,
                loss_amount = $5, loss_currency = $6, warning_signals = $7, prevention_tips = $8,
                summary = $9, country = $10, city = $11, specific_location = $12,
                latitude = $13, longitude = $14, processed_at = now()
             WHERE id = $1 AND is_processed = false",
        )
        .bind(id)
        .bind(enrichment.is_incident)
        .bind(enrichment.confidence)
        .bind(enrichment.category.map(|c| c.as_str()))
        .bind(enrichment.loss.as_ref().map(|l| l.amount))
        .bind(enrichment.loss.as_ref().map(|l| l.currency.clone()))
        .bind(enrichment.warning_signals.as_slice())
        .bind(enrichment.prevention_tips.as_slice())
        .bind(&enrichment.summary)
        .bind(&location.country)
        .bind(&location.city)
        .bind(&location.specific_location)
        .bind(location.coordinates.map(|p| p.lat))
        .bind(location.coordinates.map(|p| p.lng))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            // Someone else finished it first; do not aggregate twice.
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(contribution) = contribution {
            contribute(&mut tx, contribution, self.averaging).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn record_processing_error(&self, id: Uuid, error: &str) -> Result<Option<i32>> {
        let attempts = sqlx::query_scalar::<_, i32>(
            "UPDATE scam_reports SET
                processing_errors = array_append(processing_errors, $2),
                processing_attempts = processing_attempts + 1
             WHERE id = $1 AND is_processed = false
             RETURNING processing_attempts",
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn reset_for_reprocessing(&self, scope: &ResetScope) -> Result<u64> {
        let result = match scope {
            ResetScope::All => sqlx::query(RESET_REPORT).execute(&self.pool).await?,
            ResetScope::Country(country) => {
                let sql = format!("{RESET_REPORT} WHERE lower(country) = lower($1)");
                sqlx::query(&sql).bind(country).execute(&self.pool).await?
            }
            ResetScope::Stalled { max_attempts } => {
                let sql = format!(
                    "{RESET_REPORT} WHERE is_processed = false AND processing_attempts >= $1"
                );
                sqlx::query(&sql).bind(max_attempts).execute(&self.pool).await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn stalled_reports(&self, max_attempts: i32, limit: i64) -> Result<Vec<ScamReport>> {
        self.reports_by_attempts(
            "is_processed = false AND processing_attempts >= $1
             ORDER BY ingested_at LIMIT $2",
            max_attempts,
            limit,
        )
        .await
    }

    async fn unanalyzed_comments(&self, limit: i64) -> Result<Vec<RawComment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM raw_comments
             WHERE is_analyzed_for_scam = false
             ORDER BY posted_at LIMIT $1"
        );
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RawComment::try_from).collect()
    }

    async fn complete_comment(
        &self,
        id: Uuid,
        analysis: &CommentAnalysis,
        contribution: Option<&IncidentContribution>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE raw_comments SET
                is_analyzed_for_scam = true, is_scam_report = $2, scam_category = $3,
                country = $4, city = $5, analyzed_at = now()
             WHERE id = $1 AND is_analyzed_for_scam = false",
        )
        .bind(id)
        .bind(analysis.is_scam_report)
        .bind(analysis.category.map(|c| c.as_str()))
        .bind(&analysis.country)
        .bind(&analysis.city)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(contribution) = contribution {
            contribute(&mut tx, contribution, self.averaging).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn update_fetch_job(
        &self,
        channel: &str,
        search_term: &str,
        update: &JobUpdate,
    ) -> Result<FetchJob> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO fetch_jobs (channel, search_term) VALUES ($1, $2)
             ON CONFLICT (channel, search_term) DO NOTHING",
        )
        .bind(channel)
        .bind(search_term)
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM fetch_jobs
             WHERE channel = $1 AND search_term = $2 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(channel)
            .bind(search_term)
            .fetch_one(&mut *tx)
            .await?;

        let mut job = FetchJob::try_from(row)?;
        job.apply(update, Utc::now());

        sqlx::query(
            "UPDATE fetch_jobs SET
                status = $3, last_fetched_at = $4, last_error = $5,
                posts_processed = $6, updated_at = $7
             WHERE channel = $1 AND search_term = $2",
        )
        .bind(channel)
        .bind(search_term)
        .bind(job.status.as_str())
        .bind(job.last_fetched_at)
        .bind(&job.last_error)
        .bind(job.posts_processed)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn fetch_job(&self, channel: &str, search_term: &str) -> Result<Option<FetchJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM fetch_jobs WHERE channel = $1 AND search_term = $2"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(channel)
            .bind(search_term)
            .fetch_optional(&self.pool)
            .await?;
        row.map(FetchJob::try_from).transpose()
    }

    async fn list_fetch_jobs(&self) -> Result<Vec<FetchJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM fetch_jobs ORDER BY channel, search_term");
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(FetchJob::try_from).collect()
    }

    async fn stop_all_jobs(&self, reason: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE fetch_jobs SET status = 'failed', last_error = $1, updated_at = now()
             WHERE status IN ('pending', 'processing')",
        )
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn record_incident(&self, contribution: &IncidentContribution) -> Result<LocationStat> {
        let mut tx = self.pool.begin().await?;
        let stat = contribute(&mut tx, contribution, self.averaging).await?;
        tx.commit().await?;
        Ok(stat)
    }

    async fn location_stat(
        &self,
        country: &str,
        city: Option<&str>,
    ) -> Result<Option<LocationStat>> {
        let sql = format!(
            "SELECT {STAT_COLUMNS} FROM location_stats WHERE country = $1 AND city = $2"
        );
        let row = sqlx::query_as::<_, StatRow>(&sql)
            .bind(country)
            .bind(city_key(city))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(LocationStat::from))
    }

    async fn location_stats(&self, limit: i64) -> Result<Vec<LocationStat>> {
        let sql = format!(
            "SELECT {STAT_COLUMNS} FROM location_stats
             ORDER BY total_scams DESC, country, city LIMIT $1"
        );
        let rows = sqlx::query_as::<_, StatRow>(&sql)
            .bind(limit.clamp(1, MAX_PAGE_SIZE))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(LocationStat::from).collect())
    }

    async fn reset_location_stats(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM location_stats")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<ScamReport>> {
        let query = query.clone().normalized();

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {REPORT_COLUMNS} FROM scam_reports WHERE is_processed = true"
        ));
        if query.incidents_only {
            qb.push(" AND is_incident = true");
        }
        if let Some(country) = query.country {
            qb.push(" AND lower(country) = lower(").push_bind(country).push(")");
        }
        if let Some(city) = query.city {
            qb.push(" AND lower(city) = lower(").push_bind(city).push(")");
        }
        if let Some(category) = query.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        qb.push(match query.sort {
            ReportSort::Recent => " ORDER BY posted_at DESC",
            ReportSort::Score => " ORDER BY score DESC, posted_at DESC",
            ReportSort::Loss => " ORDER BY loss_amount DESC NULLS LAST, posted_at DESC",
        });
        qb.push(" LIMIT ").push_bind(query.limit);
        qb.push(" OFFSET ").push_bind(query.offset);

        let rows = qb
            .build_query_as::<ReportRow>()
            .fetch_all(&self.pool)
            .await?;
        into_reports(rows)
    }

    async fn search_reports(&self, text: &str, limit: i64) -> Result<Vec<ScamReport>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM scam_reports, websearch_to_tsquery('english', $1) AS q
             WHERE is_processed = true AND search_vector @@ q
             ORDER BY ts_rank(search_vector, q) DESC, posted_at DESC
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(text)
            .bind(limit.clamp(1, MAX_PAGE_SIZE))
            .fetch_all(&self.pool)
            .await?;
        into_reports(rows)
    }

    async fn report_summary(&self, max_attempts: i32) -> Result<ReportSummary> {
        let (total_reports, processed, unprocessed, stalled, incidents) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                "SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE is_processed),
                    COUNT(*) FILTER (WHERE NOT is_processed AND processing_attempts < $1),
                    COUNT(*) FILTER (WHERE NOT is_processed AND processing_attempts >= $1),
                    COUNT(*) FILTER (WHERE is_processed AND is_incident)
                 FROM scam_reports",
            )
            .bind(max_attempts)
            .fetch_one(&self.pool)
            .await?;

        let by_category = sqlx::query_as::<_, (String, i64)>(
            "SELECT category, COUNT(*) FROM scam_reports
             WHERE is_processed AND is_incident AND category IS NOT NULL
             GROUP BY category ORDER BY 2 DESC, 1",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_country = sqlx::query_as::<_, (String, i64)>(
            "SELECT country, COUNT(*) FROM scam_reports
             WHERE is_processed AND is_incident AND country IS NOT NULL
             GROUP BY country ORDER BY 2 DESC, 1",
        )
        .fetch_all(&self.pool)
        .await?;

        let named = |rows: Vec<(String, i64)>| -> Vec<NamedCount> {
            rows.into_iter()
                .map(|(name, count)| NamedCount { name, count })
                .collect()
        };

        Ok(ReportSummary {
            total_reports,
            processed,
            unprocessed,
            stalled,
            incidents,
            by_category: named(by_category),
            by_country: named(by_country),
        })
    }

    async fn record_engagement(
        &self,
        id: Uuid,
        kind: EngagementKind,
    ) -> Result<Option<Engagement>> {
        let column = match kind {
            EngagementKind::Helpful => "helpful_count",
            EngagementKind::View => "view_count",
            EngagementKind::Flag => "flag_count",
        };
        let sql = format!(
            "UPDATE scam_reports SET {column} = {column} + 1 WHERE id = $1
             RETURNING helpful_count, view_count, flag_count"
        );
        let counts = sqlx::query_as::<_, (i64, i64, i64)>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(counts.map(|(helpful, views, flags)| Engagement {
            helpful,
            views,
            flags,
        }))
    }
}
