use serde::{Deserialize, Serialize};

/// Output formats Firecrawl can render a page into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Format {
    Markdown,
    Html,
    RawHtml,
}

/// A rendered page, from either a scrape or one entry of a crawl.
#[derive(Debug, Clone, Default)]
pub struct ScrapedPage {
    pub url: String,
    pub title: Option<String>,
    pub markdown: Option<String>,
    pub html: Option<String>,
    pub status_code: Option<u16>,
}

impl ScrapedPage {
    pub fn has_content(&self) -> bool {
        self.markdown.as_deref().is_some_and(|m| !m.trim().is_empty())
            || self.html.as_deref().is_some_and(|h| !h.trim().is_empty())
    }
}

/// Crawl limits. The defaults cover a handful of thread pages per call.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub limit: u32,
    pub max_depth: u32,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            max_depth: 2,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
        }
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScrapeRequest<'a> {
    pub url: &'a str,
    pub formats: &'a [Format],
    pub only_main_content: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CrawlRequest<'a> {
    pub url: &'a str,
    pub limit: u32,
    pub max_depth: u32,
    #[serde(skip_serializing_if = "no_paths")]
    pub include_paths: &'a [String],
    #[serde(skip_serializing_if = "no_paths")]
    pub exclude_paths: &'a [String],
    pub scrape_options: CrawlScrapeOptions<'a>,
}

fn no_paths(paths: &&[String]) -> bool {
    paths.is_empty()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CrawlScrapeOptions<'a> {
    pub formats: &'a [Format],
    pub only_main_content: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScrapeResponse {
    pub success: bool,
    pub data: Option<PageData>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CrawlStartResponse {
    pub success: bool,
    pub id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CrawlStatusResponse {
    pub status: String,
    pub completed: Option<u32>,
    pub total: Option<u32>,
    #[serde(default)]
    pub data: Vec<PageData>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageData {
    pub markdown: Option<String>,
    pub html: Option<String>,
    #[serde(rename = "rawHtml")]
    pub raw_html: Option<String>,
    pub metadata: Option<PageMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageMetadata {
    pub title: Option<String>,
    #[serde(rename = "sourceURL")]
    pub source_url: Option<String>,
    #[serde(rename = "statusCode")]
    pub status_code: Option<u16>,
}

impl PageData {
    pub(crate) fn into_page(self, fallback_url: &str) -> ScrapedPage {
        let (title, source_url, status_code) = match self.metadata {
            Some(m) => (m.title, m.source_url, m.status_code),
            None => (None, None, None),
        };
        ScrapedPage {
            url: source_url.unwrap_or_else(|| fallback_url.to_string()),
            title,
            markdown: self.markdown,
            html: self.html.or(self.raw_html),
            status_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_status_page_converts_with_metadata() {
        let json = r##"{
            "status": "completed",
            "completed": 1,
            "total": 1,
            "data": [{
                "markdown": "# Title",
                "metadata": {
                    "title": "Title",
                    "sourceURL": "https://example.com/a",
                    "statusCode": 200
                }
            }]
        }"##;
        let status: CrawlStatusResponse = serde_json::from_str(json).unwrap();
        let page = status.data.into_iter().next().unwrap().into_page("https://example.com");
        assert_eq!(page.url, "https://example.com/a");
        assert_eq!(page.title.as_deref(), Some("Title"));
        assert_eq!(page.status_code, Some(200));
        assert!(page.has_content());
    }

    #[test]
    fn scrape_request_uses_camel_case() {
        let formats = [Format::Markdown, Format::RawHtml];
        let req = ScrapeRequest {
            url: "https://example.com",
            formats: &formats,
            only_main_content: true,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["onlyMainContent"], true);
        assert_eq!(value["formats"][1], "rawHtml");
    }
}
