// JSON listing client for the discussion platform.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use scamwatch_common::{NewComment, RawPost};

use crate::rate_limit::RateLimiter;
use crate::source::{PostSource, SearchResults, SourceError};

const BASE_URL: &str = "https://www.reddit.com";
const MAX_PAGE: u32 = 100;
const COMMENT_LIMIT: u32 = 500;
const COMMENT_DEPTH: u32 = 5;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData {
    #[serde(default)]
    pub children: Vec<Thing>,
    pub after: Option<String>,
}

/// `kind` is `t3` for posts, `t1` for comments, `more` for collapsed stubs.
#[derive(Debug, Deserialize)]
pub(crate) struct Thing {
    pub kind: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostData {
    pub id: String,
    pub subreddit: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    pub permalink: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentData {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: f64,
    /// Either `""` or a nested listing.
    #[serde(default)]
    pub replies: Value,
}

fn is_deleted(text: &str) -> bool {
    matches!(text.trim(), "[deleted]" | "[removed]")
}

fn timestamp(secs: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

impl PostData {
    fn into_post(self) -> RawPost {
        let body = if is_deleted(&self.selftext) {
            String::new()
        } else {
            self.selftext
        };
        RawPost {
            external_id: self.id,
            channel: self.subreddit,
            author: self.author.unwrap_or_else(|| "[deleted]".to_string()),
            title: self.title,
            body,
            created_at: timestamp(self.created_utc),
            score: self.score,
            num_comments: self.num_comments,
            permalink: self.permalink,
        }
    }
}

pub(crate) fn posts_from_listing(listing: Listing) -> Vec<RawPost> {
    listing
        .data
        .children
        .into_iter()
        .filter(|t| t.kind == "t3")
        .filter_map(|t| match serde_json::from_value::<PostData>(t.data) {
            Ok(data) => Some(data.into_post()),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable post");
                None
            }
        })
        .collect()
}

/// Depth-first flattening of a reply tree. `more` stubs and deleted
/// comments are dropped; replies under a deleted comment are kept.
pub(crate) fn flatten_comments(
    children: Vec<Thing>,
    parent: Option<&str>,
    depth: i32,
    out: &mut Vec<NewComment>,
) {
    for thing in children {
        if thing.kind != "t1" {
            continue;
        }
        let Ok(data) = serde_json::from_value::<CommentData>(thing.data) else {
            continue;
        };

        if !is_deleted(&data.body) && !data.body.trim().is_empty() {
            out.push(NewComment {
                external_id: data.id.clone(),
                parent_external_id: parent.map(str::to_string),
                author: data.author.unwrap_or_else(|| "[deleted]".to_string()),
                body: data.body,
                score: data.score,
                created_at: timestamp(data.created_utc),
                depth,
            });
        }

        if data.replies.is_object() {
            if let Ok(replies) = serde_json::from_value::<Listing>(data.replies) {
                flatten_comments(replies.data.children, Some(&data.id), depth + 1, out);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RedditClient {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl RedditClient {
    pub fn new(user_agent: &str, limiter: RateLimiter) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            limiter,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let resp = self.http.get(url).query(query).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Throttled);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: message.chars().take(300).collect(),
            });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))
    }

    async fn search_page(
        &self,
        channel: &str,
        term: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Listing, SourceError> {
        let url = format!("{}/r/{}/search.json", self.base_url, channel);
        self.limiter
            .run("search", |attempt| {
                // A retry after throttling asks for half as much.
                let page_limit = if attempt == 0 { limit } else { (limit / 2).max(1) };
                let mut query = vec![
                    ("q", term.to_string()),
                    ("restrict_sr", "1".to_string()),
                    ("sort", "new".to_string()),
                    ("t", "year".to_string()),
                    ("limit", page_limit.to_string()),
                ];
                if let Some(after) = after {
                    query.push(("after", after.to_string()));
                }
                let url = url.clone();
                async move { self.get_json::<Listing>(&url, &query).await }
            })
            .await
    }
}

#[async_trait]
impl PostSource for RedditClient {
    async fn search_posts(
        &self,
        channel: &str,
        term: &str,
        limit: u32,
    ) -> Result<SearchResults, SourceError> {
        let mut posts: Vec<RawPost> = Vec::new();
        let mut after: Option<String> = None;

        while (posts.len() as u32) < limit {
            let remaining = limit - posts.len() as u32;
            let page = match self
                .search_page(channel, term, remaining.min(MAX_PAGE), after.as_deref())
                .await
            {
                Ok(page) => page,
                // Keep what earlier pages produced.
                Err(e) if !posts.is_empty() => {
                    warn!(channel, term, kept = posts.len(), error = %e, "Paging stopped early");
                    posts.truncate(limit as usize);
                    return Ok(SearchResults::partial(posts, e));
                }
                Err(e) => return Err(e),
            };

            after = page.data.after.clone();
            let batch = posts_from_listing(page);
            if batch.is_empty() {
                break;
            }
            posts.extend(batch);
            if after.is_none() {
                break;
            }
        }

        posts.truncate(limit as usize);
        Ok(SearchResults::complete(posts))
    }

    async fn fetch_comments(&self, post: &RawPost) -> Result<Vec<NewComment>, SourceError> {
        let url = format!(
            "{}{}.json",
            self.base_url,
            post.permalink.trim_end_matches('/')
        );
        let query = [
            ("limit", COMMENT_LIMIT.to_string()),
            ("depth", COMMENT_DEPTH.to_string()),
        ];

        // [post listing, comment listing]
        let listings: Vec<Listing> = self
            .limiter
            .run("comments", |_| self.get_json(&url, &query))
            .await?;

        let mut comments = Vec::new();
        if let Some(tree) = listings.into_iter().nth(1) {
            flatten_comments(tree.data.children, None, 0, &mut comments);
        }
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(id: &str, body: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "author": "someone",
                "body": body,
                "score": 3,
                "created_utc": 1_700_000_000.0,
                "replies": replies
            }
        })
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({ "kind": "Listing", "data": { "children": children, "after": null } })
    }

    #[test]
    fn search_listing_keeps_posts_only() {
        let raw = json!({
            "data": {
                "after": "t3_next",
                "children": [
                    {"kind": "t3", "data": {
                        "id": "abc", "subreddit": "travel", "author": "alice",
                        "title": "Taxi scam in Bangkok", "selftext": "[removed]",
                        "created_utc": 1_700_000_000.0, "score": 12, "num_comments": 4,
                        "permalink": "/r/travel/comments/abc/taxi_scam/"
                    }},
                    {"kind": "t5", "data": {"id": "sub"}}
                ]
            }
        });
        let listing: Listing = serde_json::from_value(raw).unwrap();
        assert_eq!(listing.data.after.as_deref(), Some("t3_next"));

        let posts = posts_from_listing(listing);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].external_id, "abc");
        assert_eq!(posts[0].body, "");
        assert_eq!(posts[0].num_comments, 4);
    }

    #[test]
    fn reply_tree_is_flattened_depth_first() {
        let tree = listing(vec![
            comment(
                "c1",
                "The driver refused to use the meter",
                listing(vec![
                    comment("c2", "Same thing happened to me", json!("")),
                    json!({"kind": "more", "data": {"children": ["c9"]}}),
                ]),
            ),
            comment("c3", "[deleted]", listing(vec![comment("c4", "Orphaned reply", json!(""))])),
        ]);
        let listing: Listing = serde_json::from_value(tree).unwrap();

        let mut out = Vec::new();
        flatten_comments(listing.data.children, None, 0, &mut out);

        let ids: Vec<&str> = out.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c4"]);
        assert_eq!(out[1].parent_external_id.as_deref(), Some("c1"));
        assert_eq!(out[1].depth, 1);
        assert_eq!(out[2].parent_external_id.as_deref(), Some("c3"));
    }
}
