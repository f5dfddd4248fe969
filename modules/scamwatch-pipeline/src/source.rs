use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use scamwatch_common::{NewComment, RawPost};
use scamwatch_store::ReportStore;

use crate::rate_limit::Throttling;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Throttled by upstream")]
    Throttled,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response shape: {0}")]
    Parse(String),
}

impl Throttling for SourceError {
    fn is_throttled(&self) -> bool {
        matches!(self, SourceError::Throttled)
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

/// Posts collected by one search. `interrupted` holds the error that cut
/// paging short after earlier pages had already produced posts.
#[derive(Debug, Default)]
pub struct SearchResults {
    pub posts: Vec<RawPost>,
    pub interrupted: Option<SourceError>,
}

impl SearchResults {
    pub fn complete(posts: Vec<RawPost>) -> Self {
        Self {
            posts,
            interrupted: None,
        }
    }

    pub fn partial(posts: Vec<RawPost>, error: SourceError) -> Self {
        Self {
            posts,
            interrupted: Some(error),
        }
    }
}

/// Upstream discussion platform: keyword search within a channel, plus the
/// reply tree of a single post.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn search_posts(
        &self,
        channel: &str,
        term: &str,
        limit: u32,
    ) -> Result<SearchResults, SourceError>;

    /// Flattened reply tree for one post.
    async fn fetch_comments(&self, post: &RawPost) -> Result<Vec<NewComment>, SourceError>;
}

/// Outcome of one (channel, term) work unit. Never an `Err`: failures are
/// recorded here so the scheduler can move on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitReport {
    pub channel: String,
    pub term: String,
    pub posts_seen: usize,
    pub posts_inserted: usize,
    pub comments_inserted: usize,
    pub comment_failures: usize,
    pub throttled: bool,
    pub error: Option<String>,
}

impl UnitReport {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Source plus dedup store: fetches one work unit and hardens every post and
/// comment against duplicate insertion before returning.
#[derive(Clone)]
pub struct SourceClient {
    source: Arc<dyn PostSource>,
    store: Arc<dyn ReportStore>,
}

impl SourceClient {
    pub fn new(source: Arc<dyn PostSource>, store: Arc<dyn ReportStore>) -> Self {
        Self { source, store }
    }

    pub async fn fetch_unit(
        &self,
        channel: &str,
        term: &str,
        limit: u32,
        with_comments: bool,
    ) -> UnitReport {
        let mut report = UnitReport {
            channel: channel.to_string(),
            term: term.to_string(),
            ..Default::default()
        };

        let SearchResults { posts, interrupted } =
            match self.source.search_posts(channel, term, limit).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(channel, term, error = %e, "Search failed");
                    report.throttled = e.is_throttled();
                    report.error = Some(e.to_string());
                    return report;
                }
            };
        report.posts_seen = posts.len();
        // Partial pages are still stored; the unit is reported as failed.
        if let Some(e) = interrupted {
            warn!(channel, term, kept = posts.len(), error = %e, "Search interrupted");
            report.throttled = e.is_throttled();
            report.error = Some(e.to_string());
        }

        for post in &posts {
            let inserted = match self.store.upsert_post(post).await {
                Ok(inserted) => inserted,
                Err(e) => {
                    warn!(external_id = %post.external_id, error = %e, "Failed to store post");
                    report.error = Some(format!("store: {e}"));
                    continue;
                }
            };
            if inserted {
                report.posts_inserted += 1;
            } else {
                debug!(external_id = %post.external_id, "Post already stored");
            }

            if with_comments
                && post.num_comments > 0
                && self.needs_comments(post, inserted).await
            {
                self.ingest_comments(post, &mut report).await;
            }
        }

        info!(
            channel,
            term,
            seen = report.posts_seen,
            inserted = report.posts_inserted,
            comments = report.comments_inserted,
            "Work unit fetched"
        );
        report
    }

    /// New posts always need their comments. A known post is retried only
    /// while it has none stored, so an earlier failed fetch is picked up by
    /// a later run.
    async fn needs_comments(&self, post: &RawPost, inserted: bool) -> bool {
        if inserted {
            return true;
        }
        match self.store.comment_count(&post.external_id).await {
            Ok(count) => count == 0,
            Err(e) => {
                warn!(external_id = %post.external_id, error = %e, "Failed to count comments");
                false
            }
        }
    }

    /// Best effort: a failure here is logged and counted, never fatal to the
    /// sibling posts.
    async fn ingest_comments(&self, post: &RawPost, report: &mut UnitReport) {
        let comments = match self.source.fetch_comments(post).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(external_id = %post.external_id, error = %e, "Comment fetch failed");
                report.comment_failures += 1;
                if e.is_throttled() {
                    report.throttled = true;
                }
                return;
            }
        };

        match self.store.insert_comments(&post.external_id, &comments).await {
            Ok(inserted) => report.comments_inserted += inserted,
            Err(e) => {
                warn!(external_id = %post.external_id, error = %e, "Failed to store comments");
                report.comment_failures += 1;
            }
        }
    }
}
