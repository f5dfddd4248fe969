pub mod error;
pub mod types;

pub use error::{FirecrawlError, Result};
pub use types::{CrawlOptions, Format, ScrapedPage};

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use types::{
    CrawlRequest, CrawlScrapeOptions, CrawlStartResponse, CrawlStatusResponse, ScrapeRequest,
    ScrapeResponse,
};

const BASE_URL: &str = "https://api.firecrawl.dev/v1";

pub struct FirecrawlClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl FirecrawlClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FirecrawlError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Render a single URL into the requested formats.
    pub async fn scrape(&self, url: &str, formats: &[Format]) -> Result<ScrapedPage> {
        info!(url, "Firecrawl scrape");

        let request = ScrapeRequest {
            url,
            formats,
            only_main_content: true,
        };
        let resp = self
            .client
            .post(format!("{}/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let body: ScrapeResponse = Self::read(resp).await?;
        if !body.success {
            return Err(FirecrawlError::Api {
                status: 200,
                message: body.error.unwrap_or_else(|| "scrape unsuccessful".to_string()),
            });
        }

        let page = body
            .data
            .map(|d| d.into_page(url))
            .filter(ScrapedPage::has_content)
            .ok_or_else(|| FirecrawlError::Empty(url.to_string()))?;
        Ok(page)
    }

    /// Start a crawl job. Returns immediately with the job id.
    pub async fn start_crawl(&self, url: &str, options: &CrawlOptions) -> Result<String> {
        let formats = [Format::Markdown];
        let request = CrawlRequest {
            url,
            limit: options.limit,
            max_depth: options.max_depth,
            include_paths: &options.include_paths,
            exclude_paths: &options.exclude_paths,
            scrape_options: CrawlScrapeOptions {
                formats: &formats,
                only_main_content: true,
            },
        };
        let resp = self
            .client
            .post(format!("{}/crawl", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let body: CrawlStartResponse = Self::read(resp).await?;
        match (body.success, body.id) {
            (true, Some(id)) => Ok(id),
            (_, _) => Err(FirecrawlError::Api {
                status: 200,
                message: body.error.unwrap_or_else(|| "crawl not started".to_string()),
            }),
        }
    }

    /// Poll a crawl until it completes, following result pagination.
    pub async fn wait_for_crawl(&self, id: &str, source_url: &str) -> Result<Vec<ScrapedPage>> {
        let started = tokio::time::Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if started.elapsed() >= self.poll_timeout {
                return Err(FirecrawlError::Timeout(id.to_string()));
            }
            tokio::time::sleep(self.poll_interval).await;
            attempts += 1;

            let resp = self
                .client
                .get(format!("{}/crawl/{}", self.base_url, id))
                .bearer_auth(&self.api_key)
                .send()
                .await?;
            let status: CrawlStatusResponse = Self::read(resp).await?;

            match status.status.as_str() {
                "completed" => return self.collect_pages(status, source_url).await,
                "failed" | "cancelled" => {
                    return Err(FirecrawlError::CrawlFailed {
                        id: id.to_string(),
                        status: status.status,
                    });
                }
                _ if attempts % 6 == 0 => info!(
                    crawl_id = id,
                    completed = ?status.completed,
                    total = ?status.total,
                    "Crawl in progress"
                ),
                _ => debug!(crawl_id = id, status = %status.status, "Crawl still in progress"),
            }
        }
    }

    async fn collect_pages(
        &self,
        first: CrawlStatusResponse,
        source_url: &str,
    ) -> Result<Vec<ScrapedPage>> {
        let mut pages: Vec<ScrapedPage> = Vec::new();
        let mut next = first.next;
        pages.extend(first.data.into_iter().map(|d| d.into_page(source_url)));

        while let Some(url) = next.take() {
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await?;
            let status: CrawlStatusResponse = Self::read(resp).await?;
            pages.extend(status.data.into_iter().map(|d| d.into_page(source_url)));
            next = status.next;
        }

        pages.retain(ScrapedPage::has_content);
        info!(url = source_url, count = pages.len(), "Crawl completed");
        Ok(pages)
    }

    /// Crawl end-to-end: start, poll, collect.
    pub async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<Vec<ScrapedPage>> {
        let id = self.start_crawl(url, options).await?;
        info!(crawl_id = %id, url, limit = options.limit, "Started Firecrawl crawl");
        self.wait_for_crawl(&id, url).await
    }
}
