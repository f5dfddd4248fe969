use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScamwatchError;

// --- Geography ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Great-circle distance in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScamCategory {
    Taxi,
    Accommodation,
    Tour,
    Shopping,
    Restaurant,
    StreetHustle,
    CurrencyExchange,
    Transport,
    FakePolice,
    CardSkimming,
    Online,
    Other,
}

impl ScamCategory {
    pub const ALL: [ScamCategory; 12] = [
        ScamCategory::Taxi,
        ScamCategory::Accommodation,
        ScamCategory::Tour,
        ScamCategory::Shopping,
        ScamCategory::Restaurant,
        ScamCategory::StreetHustle,
        ScamCategory::CurrencyExchange,
        ScamCategory::Transport,
        ScamCategory::FakePolice,
        ScamCategory::CardSkimming,
        ScamCategory::Online,
        ScamCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScamCategory::Taxi => "taxi",
            ScamCategory::Accommodation => "accommodation",
            ScamCategory::Tour => "tour",
            ScamCategory::Shopping => "shopping",
            ScamCategory::Restaurant => "restaurant",
            ScamCategory::StreetHustle => "street_hustle",
            ScamCategory::CurrencyExchange => "currency_exchange",
            ScamCategory::Transport => "transport",
            ScamCategory::FakePolice => "fake_police",
            ScamCategory::CardSkimming => "card_skimming",
            ScamCategory::Online => "online",
            ScamCategory::Other => "other",
        }
    }

    /// Lenient mapping for model output: exact names, a few common
    /// synonyms, and `other` for anything unrecognised.
    pub fn from_model_output(raw: &str) -> Self {
        let key = raw.trim().to_lowercase().replace([' ', '-', '/'], "_");
        if let Ok(category) = key.parse() {
            return category;
        }
        match key.as_str() {
            "tuk_tuk" | "tuktuk" | "cab" | "rideshare" | "ride_share" => ScamCategory::Taxi,
            "hotel" | "hostel" | "airbnb" | "rental" | "lodging" => ScamCategory::Accommodation,
            "tour_guide" | "tours" | "excursion" => ScamCategory::Tour,
            "gem" | "gem_scam" | "market" | "souvenir" => ScamCategory::Shopping,
            "bar" | "food" | "menu" => ScamCategory::Restaurant,
            "street" | "pickpocket" | "distraction" | "friendship_bracelet" => {
                ScamCategory::StreetHustle
            }
            "money_exchange" | "exchange" | "currency" => ScamCategory::CurrencyExchange,
            "bus" | "train" | "ferry" | "airport" => ScamCategory::Transport,
            "police" | "fake_official" | "official" => ScamCategory::FakePolice,
            "atm" | "card" | "skimming" => ScamCategory::CardSkimming,
            "booking" | "phishing" | "internet" | "website" => ScamCategory::Online,
            _ => ScamCategory::Other,
        }
    }
}

impl fmt::Display for ScamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScamCategory {
    type Err = ScamwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScamCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ScamwatchError::unknown("scam category", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    CommunityVerified,
    Verified,
    Disputed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::CommunityVerified => "community_verified",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Disputed => "disputed",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = ScamwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(VerificationStatus::Unverified),
            "community_verified" => Ok(VerificationStatus::CommunityVerified),
            "verified" => Ok(VerificationStatus::Verified),
            "disputed" => Ok(VerificationStatus::Disputed),
            _ => Err(ScamwatchError::unknown("verification status", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Jobs an operator can stop.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ScamwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(ScamwatchError::unknown("job status", s)),
        }
    }
}

// --- Ingestion ---

/// One upstream discussion thread as fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub external_id: String,
    pub channel: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
    pub num_comments: i64,
    pub permalink: String,
}

impl RawPost {
    /// Title and body as one block of text for classification.
    pub fn content(&self) -> String {
        format!("{}\n\n{}", self.title, self.body).trim().to_string()
    }
}

/// A reply as fetched, before it is attached to a stored report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub external_id: String,
    pub parent_external_id: Option<String>,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub depth: i32,
}

/// What the comment pass concluded about a reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentAnalysis {
    pub is_scam_report: bool,
    pub category: Option<ScamCategory>,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// A stored reply, attached to exactly one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawComment {
    pub id: Uuid,
    pub report_id: Uuid,
    pub external_id: String,
    pub parent_external_id: Option<String>,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub depth: i32,
    pub is_analyzed_for_scam: bool,
    pub analysis: Option<CommentAnalysis>,
}

// --- Enrichment ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryLoss {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportLocation {
    pub country: Option<String>,
    pub city: Option<String>,
    pub specific_location: Option<String>,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub helpful: i64,
    pub views: i64,
    pub flags: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    Helpful,
    View,
    Flag,
}

impl FromStr for EngagementKind {
    type Err = ScamwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "helpful" => Ok(EngagementKind::Helpful),
            "view" => Ok(EngagementKind::View),
            "flag" => Ok(EngagementKind::Flag),
            _ => Err(ScamwatchError::unknown("engagement kind", s)),
        }
    }
}

/// The classification fields written when a report becomes processed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportEnrichment {
    pub is_incident: bool,
    pub confidence: f32,
    pub category: Option<ScamCategory>,
    pub loss: Option<MonetaryLoss>,
    pub warning_signals: Vec<String>,
    pub prevention_tips: Vec<String>,
    pub summary: Option<String>,
    pub location: ReportLocation,
}

impl ReportEnrichment {
    /// Terminal state for content that is not an incident, including the
    /// safe default after a failed classification.
    pub fn not_incident() -> Self {
        Self::default()
    }
}

/// A RawPost that has been (or is waiting to be) enriched. Stored as one
/// evolving row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScamReport {
    pub id: Uuid,
    #[serde(flatten)]
    pub post: RawPost,
    pub is_processed: bool,
    #[serde(flatten)]
    pub enrichment: ReportEnrichment,
    pub verification: VerificationStatus,
    pub engagement: Engagement,
    pub processing_errors: Vec<String>,
    pub processing_attempts: i32,
    pub ingested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ScamReport {
    /// A freshly ingested, unprocessed report.
    pub fn unprocessed(post: RawPost) -> Self {
        Self {
            id: Uuid::new_v4(),
            post,
            is_processed: false,
            enrichment: ReportEnrichment::default(),
            verification: VerificationStatus::default(),
            engagement: Engagement::default(),
            processing_errors: Vec::new(),
            processing_attempts: 0,
            ingested_at: Utc::now(),
            processed_at: None,
        }
    }
}

// --- Job ledger ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchJob {
    pub channel: String,
    pub search_term: String,
    pub status: JobStatus,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub posts_processed: i64,
    pub updated_at: DateTime<Utc>,
}

/// Transition applied to a (channel, term) row by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Started,
    Completed { posts_inserted: i64 },
    Failed { error: String },
    Stopped { reason: String },
}

impl JobUpdate {
    pub fn status(&self) -> JobStatus {
        match self {
            JobUpdate::Started => JobStatus::Processing,
            JobUpdate::Completed { .. } => JobStatus::Completed,
            JobUpdate::Failed { .. } | JobUpdate::Stopped { .. } => JobStatus::Failed,
        }
    }
}

impl FetchJob {
    pub fn new(channel: &str, search_term: &str) -> Self {
        Self {
            channel: channel.to_string(),
            search_term: search_term.to_string(),
            status: JobStatus::Pending,
            last_fetched_at: None,
            last_error: None,
            posts_processed: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, update: &JobUpdate, now: DateTime<Utc>) {
        self.status = update.status();
        self.updated_at = now;
        match update {
            JobUpdate::Started => {}
            JobUpdate::Completed { posts_inserted } => {
                self.posts_processed += posts_inserted;
                self.last_fetched_at = Some(now);
                self.last_error = None;
            }
            JobUpdate::Failed { error } | JobUpdate::Stopped { reason: error } => {
                self.last_error = Some(error.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for category in ScamCategory::ALL {
            assert_eq!(category.as_str().parse::<ScamCategory>().unwrap(), category);
        }
        assert!("bogus".parse::<ScamCategory>().is_err());
    }

    #[test]
    fn model_categories_are_repaired() {
        assert_eq!(ScamCategory::from_model_output(" Taxi "), ScamCategory::Taxi);
        assert_eq!(ScamCategory::from_model_output("tuk-tuk"), ScamCategory::Taxi);
        assert_eq!(ScamCategory::from_model_output("Street Hustle"), ScamCategory::StreetHustle);
        assert_eq!(ScamCategory::from_model_output("hotel"), ScamCategory::Accommodation);
        assert_eq!(ScamCategory::from_model_output("alien abduction"), ScamCategory::Other);
    }

    #[test]
    fn completed_job_accumulates_and_clears_error() {
        let now = Utc::now();
        let mut job = FetchJob::new("travel", "scam");
        job.apply(&JobUpdate::Failed { error: "boom".into() }, now);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("boom"));

        job.apply(&JobUpdate::Completed { posts_inserted: 4 }, now);
        job.apply(&JobUpdate::Completed { posts_inserted: 3 }, now);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.posts_processed, 7);
        assert_eq!(job.last_error, None);
        assert_eq!(job.last_fetched_at, Some(now));
    }

    #[test]
    fn haversine_bangkok_to_chiang_mai() {
        let d = haversine_km(13.7563, 100.5018, 18.7883, 98.9853);
        assert!((d - 580.0).abs() < 15.0, "got {d}");
    }

    #[test]
    fn report_serializes_flat() {
        let post = RawPost {
            external_id: "abc".into(),
            channel: "travel".into(),
            author: "u".into(),
            title: "t".into(),
            body: "b".into(),
            created_at: Utc::now(),
            score: 1,
            num_comments: 0,
            permalink: "/r/travel/comments/abc/t/".into(),
        };
        let value = serde_json::to_value(ScamReport::unprocessed(post)).unwrap();
        assert_eq!(value["external_id"], "abc");
        assert_eq!(value["is_incident"], false);
        assert_eq!(value["is_processed"], false);
    }
}
