//! URL and crawl ingestion through a scripted scraper.

use std::sync::Arc;

use scamwatch_pipeline::ingest_url::{IngestError, UrlIngestor};
use scamwatch_pipeline::testing::MockScraper;
use scamwatch_store::{MemoryStore, ReportStore};

const CLASSIC: &str = include_str!("fixtures/classic_thread.md");
const MODERN: &str = include_str!("fixtures/modern_thread.md");

const CLASSIC_URL: &str =
    "https://old.reddit.com/r/travel/comments/1abc23/taxi_driver_in_bangkok_refused_the_meter/";
const MODERN_URL: &str =
    "https://www.reddit.com/r/solotravel/comments/1xyz99/fake_police_passport_check_in_lombok/";
const LISTING_URL: &str = "https://old.reddit.com/r/travel/";
const JUNK_URL: &str = "https://old.reddit.com/r/travel/comments/1junk0/whatever/";

#[tokio::test]
async fn single_url_is_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = UrlIngestor::new(
        Arc::new(MockScraper::new().on_page(CLASSIC_URL, CLASSIC)),
        store.clone(),
    );

    let first = ingestor.ingest_url(CLASSIC_URL).await.unwrap();
    assert_eq!(first.external_id, "1abc23");
    assert!(first.inserted);
    assert_eq!(first.comments_inserted, 3);

    let second = ingestor.ingest_url(CLASSIC_URL).await.unwrap();
    assert!(!second.inserted);
    assert_eq!(second.comments_inserted, 0);

    assert_eq!(store.report_count(), 1);
    let stored = store.get_report_by_external_id("1abc23").await.unwrap().unwrap();
    assert!(!stored.is_processed);
    assert_eq!(stored.post.channel, "travel");
}

#[tokio::test]
async fn scrape_failure_is_an_error() {
    let ingestor = UrlIngestor::new(Arc::new(MockScraper::new()), Arc::new(MemoryStore::new()));
    let err = ingestor.ingest_url(CLASSIC_URL).await.unwrap_err();
    assert!(matches!(err, IngestError::Scrape(_)));
}

#[tokio::test]
async fn crawl_counts_parsed_and_failed_pages() {
    let scraper = MockScraper::new()
        .on_page(CLASSIC_URL, CLASSIC)
        .on_page(MODERN_URL, MODERN)
        .on_page(JUNK_URL, "Nothing to see here, just a cookie banner.")
        .on_crawl(LISTING_URL, &[CLASSIC_URL, MODERN_URL, JUNK_URL]);
    let store = Arc::new(MemoryStore::new());
    let ingestor = UrlIngestor::new(Arc::new(scraper), store.clone());

    let summary = ingestor.crawl(LISTING_URL, 10).await.unwrap();
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.parsed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.inserted, 2);
    assert_eq!(store.report_count(), 2);

    let again = ingestor.crawl(LISTING_URL, 10).await.unwrap();
    assert_eq!(again.parsed, 2);
    assert_eq!(again.inserted, 0);
}
