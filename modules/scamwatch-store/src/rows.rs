// Row types and their conversion into domain types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use scamwatch_common::{
    CategoryCount, CommentAnalysis, Engagement, FetchJob, GeoPoint, JobStatus, LocationStat,
    MonetaryLoss, RawComment, RawPost, ReportEnrichment, ReportLocation, ScamCategory, ScamReport,
    VerificationStatus,
};

use crate::error::{Result, StoreError};

pub(crate) const REPORT_COLUMNS: &str = "id, external_id, channel, author, title, body, posted_at, \
     score, num_comments, permalink, is_processed, is_incident, confidence, category, loss_amount, \
     loss_currency, warning_signals, prevention_tips, summary, country, city, specific_location, \
     latitude, longitude, verification, helpful_count, view_count, flag_count, processing_errors, \
     processing_attempts, ingested_at, processed_at";

pub(crate) const COMMENT_COLUMNS: &str = "id, report_id, external_id, parent_external_id, author, \
     body, score, posted_at, depth, is_analyzed_for_scam, is_scam_report, scam_category, \
     country, city";

pub(crate) const STAT_COLUMNS: &str = "country, city, total_scams, top_categories, average_loss, \
     loss_samples, latitude, longitude, last_updated";

pub(crate) const JOB_COLUMNS: &str =
    "channel, search_term, status, last_fetched_at, last_error, posts_processed, updated_at";

fn parse<T: FromStr>(column: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| StoreError::Corrupt {
        column,
        value: value.to_string(),
    })
}

fn point(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    }
}

/// `''` is the country-level row in storage.
pub(crate) fn city_key(city: Option<&str>) -> &str {
    city.unwrap_or("")
}

// ---------------------------------------------------------------------------
// scam_reports
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ReportRow {
    pub id: Uuid,
    pub external_id: String,
    pub channel: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub posted_at: DateTime<Utc>,
    pub score: i64,
    pub num_comments: i64,
    pub permalink: String,
    pub is_processed: bool,
    pub is_incident: bool,
    pub confidence: f32,
    pub category: Option<String>,
    pub loss_amount: Option<f64>,
    pub loss_currency: Option<String>,
    pub warning_signals: Vec<String>,
    pub prevention_tips: Vec<String>,
    pub summary: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub specific_location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub verification: String,
    pub helpful_count: i64,
    pub view_count: i64,
    pub flag_count: i64,
    pub processing_errors: Vec<String>,
    pub processing_attempts: i32,
    pub ingested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReportRow> for ScamReport {
    type Error = StoreError;

    fn try_from(row: ReportRow) -> Result<Self> {
        let category = row
            .category
            .as_deref()
            .map(|c| parse::<ScamCategory>("category", c))
            .transpose()?;
        let loss = row.loss_amount.map(|amount| MonetaryLoss {
            amount,
            currency: row.loss_currency.unwrap_or_else(|| "USD".to_string()),
        });

        Ok(ScamReport {
            id: row.id,
            post: RawPost {
                external_id: row.external_id,
                channel: row.channel,
                author: row.author,
                title: row.title,
                body: row.body,
                created_at: row.posted_at,
                score: row.score,
                num_comments: row.num_comments,
                permalink: row.permalink,
            },
            is_processed: row.is_processed,
            enrichment: ReportEnrichment {
                is_incident: row.is_incident,
                confidence: row.confidence,
                category,
                loss,
                warning_signals: row.warning_signals,
                prevention_tips: row.prevention_tips,
                summary: row.summary,
                location: ReportLocation {
                    country: row.country,
                    city: row.city,
                    specific_location: row.specific_location,
                    coordinates: point(row.latitude, row.longitude),
                },
            },
            verification: parse::<VerificationStatus>("verification", &row.verification)?,
            engagement: Engagement {
                helpful: row.helpful_count,
                views: row.view_count,
                flags: row.flag_count,
            },
            processing_errors: row.processing_errors,
            processing_attempts: row.processing_attempts,
            ingested_at: row.ingested_at,
            processed_at: row.processed_at,
        })
    }
}

pub(crate) fn into_reports(rows: Vec<ReportRow>) -> Result<Vec<ScamReport>> {
    rows.into_iter().map(ScamReport::try_from).collect()
}

// ---------------------------------------------------------------------------
// raw_comments
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CommentRow {
    pub id: Uuid,
    pub report_id: Uuid,
    pub external_id: String,
    pub parent_external_id: Option<String>,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub posted_at: DateTime<Utc>,
    pub depth: i32,
    pub is_analyzed_for_scam: bool,
    pub is_scam_report: Option<bool>,
    pub scam_category: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

impl TryFrom<CommentRow> for RawComment {
    type Error = StoreError;

    fn try_from(row: CommentRow) -> Result<Self> {
        let analysis = match row.is_scam_report {
            Some(is_scam_report) => Some(CommentAnalysis {
                is_scam_report,
                category: row
                    .scam_category
                    .as_deref()
                    .map(|c| parse::<ScamCategory>("scam_category", c))
                    .transpose()?,
                country: row.country,
                city: row.city,
            }),
            None => None,
        };

        Ok(RawComment {
            id: row.id,
            report_id: row.report_id,
            external_id: row.external_id,
            parent_external_id: row.parent_external_id,
            author: row.author,
            body: row.body,
            score: row.score,
            created_at: row.posted_at,
            depth: row.depth,
            is_analyzed_for_scam: row.is_analyzed_for_scam,
            analysis,
        })
    }
}

// ---------------------------------------------------------------------------
// fetch_jobs
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub channel: String,
    pub search_term: String,
    pub status: String,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub posts_processed: i64,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for FetchJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(FetchJob {
            status: parse::<JobStatus>("status", &row.status)?,
            channel: row.channel,
            search_term: row.search_term,
            last_fetched_at: row.last_fetched_at,
            last_error: row.last_error,
            posts_processed: row.posts_processed,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// location_stats
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatRow {
    pub country: String,
    pub city: String,
    pub total_scams: i64,
    pub top_categories: Json<Vec<CategoryCount>>,
    pub average_loss: f64,
    pub loss_samples: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl From<StatRow> for LocationStat {
    fn from(row: StatRow) -> Self {
        LocationStat {
            country: row.country,
            city: Some(row.city).filter(|c| !c.is_empty()),
            total_scams: row.total_scams,
            top_categories: row.top_categories.0,
            average_loss: row.average_loss,
            loss_samples: row.loss_samples,
            coordinates: point(row.latitude, row.longitude),
            last_updated: row.last_updated,
        }
    }
}
