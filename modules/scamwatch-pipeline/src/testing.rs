// Test doubles for the pipeline's trait seams.
//
// - MockSource (PostSource): scripted search results, comment trees and throttling
// - ScriptedClassifier (Classifier): substring -> Classification
// - MockGeocoder (Geocoder): substring -> candidate, with call counting
// - MockScraper (PageScraper): URL -> rendered page
//
// Plus builders for posts, comments and incident classifications.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use firecrawl_client::{FirecrawlError, ScrapedPage};
use scamwatch_common::{GeoPoint, MonetaryLoss, NewComment, RawPost, ScamCategory};

use crate::classifier::{Classification, Classifier, IncidentClassification, LocationHint};
use crate::geocode::{GeocodeCandidate, GeocodeError, Geocoder};
use crate::ingest_url::PageScraper;
use crate::source::{PostSource, SearchResults, SourceError};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

pub const BANGKOK: (f64, f64) = (13.7563, 100.5018);
/// Delhi, Louisiana.
pub const DELHI_US: (f64, f64) = (32.4571, -91.4932);
/// East Kalimantan, far from the island of Lombok.
pub const LOMBOK_KALIMANTAN: (f64, f64) = (-0.5022, 117.1536);

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn post(external_id: &str, channel: &str, title: &str, body: &str) -> RawPost {
    RawPost {
        external_id: external_id.to_string(),
        channel: channel.to_string(),
        author: "traveller".to_string(),
        title: title.to_string(),
        body: body.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        score: 10,
        num_comments: 0,
        permalink: format!("/r/{channel}/comments/{external_id}/thread/"),
    }
}

pub fn comment(external_id: &str, body: &str) -> NewComment {
    NewComment {
        external_id: external_id.to_string(),
        parent_external_id: None,
        author: "replier".to_string(),
        body: body.to_string(),
        score: 1,
        created_at: Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap(),
        depth: 0,
    }
}

pub fn incident(
    category: ScamCategory,
    country: Option<&str>,
    city: Option<&str>,
    loss: Option<(f64, &str)>,
) -> Classification {
    Classification::Incident(IncidentClassification {
        confidence: 0.9,
        category,
        location: LocationHint {
            country: country.map(str::to_string),
            city: city.map(str::to_string),
            specific_location: None,
        },
        loss: loss.map(|(amount, currency)| MonetaryLoss {
            amount,
            currency: currency.to_string(),
        }),
        warning_signals: vec!["Driver refuses the meter".to_string()],
        prevention_tips: vec!["Insist on the meter or use a ride app".to_string()],
        summary: Some("Overcharged by a driver".to_string()),
    })
}

pub fn candidate(point: (f64, f64), country: &str, city: &str) -> GeocodeCandidate {
    GeocodeCandidate {
        point: GeoPoint::new(point.0, point.1),
        country: Some(country.to_string()),
        city: Some(city.to_string()),
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Scripted upstream. Unregistered (channel, term) pairs return no posts.
#[derive(Default)]
pub struct MockSource {
    searches: HashMap<(String, String), Vec<RawPost>>,
    comments: HashMap<String, Vec<NewComment>>,
    throttled: HashSet<(String, String)>,
    throttled_after: HashMap<(String, String), usize>,
    failing_comments: HashSet<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(mut self, channel: &str, term: &str, posts: Vec<RawPost>) -> Self {
        self.searches.insert((channel.to_string(), term.to_string()), posts);
        self
    }

    pub fn on_comments(mut self, external_id: &str, comments: Vec<NewComment>) -> Self {
        self.comments.insert(external_id.to_string(), comments);
        self
    }

    /// Search for this pair fails as throttled.
    pub fn throttle(mut self, channel: &str, term: &str) -> Self {
        self.throttled.insert((channel.to_string(), term.to_string()));
        self
    }

    /// Search for this pair returns its first `kept` posts, then is cut
    /// short by throttling.
    pub fn throttle_after(mut self, channel: &str, term: &str, kept: usize) -> Self {
        self.throttled_after
            .insert((channel.to_string(), term.to_string()), kept);
        self
    }

    pub fn fail_comments(mut self, external_id: &str) -> Self {
        self.failing_comments.insert(external_id.to_string());
        self
    }

    /// Every (channel, term) searched, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostSource for MockSource {
    async fn search_posts(
        &self,
        channel: &str,
        term: &str,
        limit: u32,
    ) -> Result<SearchResults, SourceError> {
        let key = (channel.to_string(), term.to_string());
        self.calls.lock().unwrap().push(key.clone());
        if self.throttled.contains(&key) {
            return Err(SourceError::Throttled);
        }
        let posts: Vec<RawPost> = self
            .searches
            .get(&key)
            .map(|posts| posts.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default();
        match self.throttled_after.get(&key) {
            Some(&kept) => Ok(SearchResults::partial(
                posts.into_iter().take(kept).collect(),
                SourceError::Throttled,
            )),
            None => Ok(SearchResults::complete(posts)),
        }
    }

    async fn fetch_comments(&self, post: &RawPost) -> Result<Vec<NewComment>, SourceError> {
        if self.failing_comments.contains(&post.external_id) {
            return Err(SourceError::Network("connection reset".to_string()));
        }
        Ok(self.comments.get(&post.external_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// ScriptedClassifier
// ---------------------------------------------------------------------------

/// First rule whose needle occurs in the content wins; otherwise
/// `NotIncident`.
#[derive(Default)]
pub struct ScriptedClassifier {
    rules: Vec<(String, Classification)>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, classification: Classification) -> Self {
        self.rules.push((needle.to_string(), classification));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, content: &str) -> Classification {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rules
            .iter()
            .find(|(needle, _)| content.contains(needle.as_str()))
            .map(|(_, classification)| classification.clone())
            .unwrap_or(Classification::NotIncident)
    }
}

// ---------------------------------------------------------------------------
// MockGeocoder
// ---------------------------------------------------------------------------

/// Matches rules against the query text (case-insensitive substring).
/// Unmatched queries resolve to nothing.
#[derive(Default)]
pub struct MockGeocoder {
    rules: Vec<(String, Result<Option<GeocodeCandidate>, GeocodeError>)>,
    queries: Mutex<Vec<(String, Option<String>)>>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, candidate: GeocodeCandidate) -> Self {
        self.rules.push((needle.to_lowercase(), Ok(Some(candidate))));
        self
    }

    pub fn fail(mut self, needle: &str, error: GeocodeError) -> Self {
        self.rules.push((needle.to_lowercase(), Err(error)));
        self
    }

    /// Every (query, country code) sent, in call order.
    pub fn queries(&self) -> Vec<(String, Option<String>)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn forward(
        &self,
        query: &str,
        country_code: Option<&str>,
    ) -> Result<Option<GeocodeCandidate>, GeocodeError> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), country_code.map(str::to_string)));
        let lowered = query.to_lowercase();
        self.rules
            .iter()
            .find(|(needle, _)| lowered.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or(Ok(None))
    }
}

// ---------------------------------------------------------------------------
// MockScraper
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockScraper {
    pages: HashMap<String, String>,
    crawls: HashMap<String, Vec<String>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, markdown: &str) -> Self {
        self.pages.insert(url.to_string(), markdown.to_string());
        self
    }

    /// Crawling `url` yields the registered pages for `page_urls`.
    pub fn on_crawl(mut self, url: &str, page_urls: &[&str]) -> Self {
        self.crawls
            .insert(url.to_string(), page_urls.iter().map(|u| u.to_string()).collect());
        self
    }

    fn page(&self, url: &str) -> ScrapedPage {
        ScrapedPage {
            url: url.to_string(),
            markdown: self.pages.get(url).cloned(),
            status_code: Some(200),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PageScraper for MockScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, FirecrawlError> {
        if self.pages.contains_key(url) {
            Ok(self.page(url))
        } else {
            Err(FirecrawlError::Empty(url.to_string()))
        }
    }

    async fn crawl(&self, url: &str, limit: u32) -> Result<Vec<ScrapedPage>, FirecrawlError> {
        let urls = self
            .crawls
            .get(url)
            .ok_or_else(|| FirecrawlError::CrawlFailed {
                id: "mock".to_string(),
                status: "failed".to_string(),
            })?;
        Ok(urls.iter().take(limit as usize).map(|u| self.page(u)).collect())
    }
}
