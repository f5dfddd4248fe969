//! Alternative ingestion through the scraping service: one thread URL, or a
//! crawl from a listing page.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use firecrawl_client::{CrawlOptions, FirecrawlClient, FirecrawlError, Format, ScrapedPage};
use scamwatch_store::{ReportStore, StoreError};

use crate::parser::{parse_thread, ParseError, ParsedPost};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("scrape failed: {0}")]
    Scrape(#[from] FirecrawlError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

/// Rendered-page source: a single scrape, or a bounded crawl.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, FirecrawlError>;
    async fn crawl(&self, url: &str, limit: u32) -> Result<Vec<ScrapedPage>, FirecrawlError>;
}

#[async_trait]
impl PageScraper for FirecrawlClient {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, FirecrawlError> {
        FirecrawlClient::scrape(self, url, &[Format::Markdown]).await
    }

    async fn crawl(&self, url: &str, limit: u32) -> Result<Vec<ScrapedPage>, FirecrawlError> {
        let options = CrawlOptions {
            limit,
            include_paths: vec![".*/comments/.*".to_string()],
            ..Default::default()
        };
        FirecrawlClient::crawl(self, url, &options).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestedThread {
    pub external_id: String,
    pub inserted: bool,
    pub comments_inserted: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlSummary {
    pub pages: usize,
    pub parsed: usize,
    pub failed: usize,
    pub inserted: usize,
    pub comments_inserted: usize,
}

pub struct UrlIngestor {
    scraper: Arc<dyn PageScraper>,
    store: Arc<dyn ReportStore>,
}

impl UrlIngestor {
    pub fn new(scraper: Arc<dyn PageScraper>, store: Arc<dyn ReportStore>) -> Self {
        Self { scraper, store }
    }

    pub async fn ingest_url(&self, url: &str) -> Result<IngestedThread, IngestError> {
        let page = self.scraper.scrape(url).await?;
        let parsed = parse_page(&page, url)?;
        self.store_thread(parsed).await
    }

    /// Crawl and ingest every thread page found. Page-level failures are
    /// counted, not returned.
    pub async fn crawl(&self, url: &str, limit: u32) -> Result<CrawlSummary, IngestError> {
        let pages = self.scraper.crawl(url, limit).await?;
        let mut summary = CrawlSummary {
            pages: pages.len(),
            ..Default::default()
        };

        for page in &pages {
            let page_url = if page.url.is_empty() { url } else { page.url.as_str() };
            let parsed = match parse_page(page, page_url) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(url = page_url, error = %e, "Skipping unparseable page");
                    summary.failed += 1;
                    continue;
                }
            };
            summary.parsed += 1;

            match self.store_thread(parsed).await {
                Ok(thread) => {
                    if thread.inserted {
                        summary.inserted += 1;
                    }
                    summary.comments_inserted += thread.comments_inserted;
                }
                Err(e) => {
                    warn!(url = page_url, error = %e, "Failed to store crawled thread");
                    summary.failed += 1;
                }
            }
        }

        info!(
            url,
            pages = summary.pages,
            parsed = summary.parsed,
            failed = summary.failed,
            inserted = summary.inserted,
            "Crawl ingested"
        );
        Ok(summary)
    }

    async fn store_thread(&self, parsed: ParsedPost) -> Result<IngestedThread, IngestError> {
        let inserted = self.store.upsert_post(&parsed.post).await?;
        let comments_inserted = self
            .store
            .insert_comments(&parsed.post.external_id, &parsed.comments)
            .await?;
        info!(
            external_id = %parsed.post.external_id,
            inserted,
            comments = comments_inserted,
            "Thread ingested from page"
        );
        Ok(IngestedThread {
            external_id: parsed.post.external_id,
            inserted,
            comments_inserted,
        })
    }
}

fn parse_page(page: &ScrapedPage, url: &str) -> Result<ParsedPost, ParseError> {
    let markdown = page.markdown.as_deref().unwrap_or_default();
    parse_thread(markdown, url)
}
