// Structured extraction from rendered thread markdown, for pages that come
// through the scraping service instead of the JSON API.
//
// Two layouts are recognised:
// - classic: "submitted ... by [user](...)" byline, comments introduced by
//   "[-] [user](...) N points ..."
// - modern: "# title" heading with "r/channel" crumbs and "u/user" bylines
//   (or user-profile links)

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use scamwatch_common::{NewComment, RawPost};

static RE_POST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/comments/([A-Za-z0-9]+)").unwrap());
static RE_CHANNEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/|\s)r/([A-Za-z0-9_]+)").unwrap());
static RE_COMMENT_PERMALINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/comments/[A-Za-z0-9]+/[^/\s)]*/([A-Za-z0-9]+)").unwrap());
static RE_MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static RE_CLASSIC_BYLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^submitted\b.*?\bby\s+\[([^\]]+)\]").unwrap()
});
static RE_CLASSIC_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[[-+–]\]\s*\[([^\]]+)\]\([^)]*\)\s*(-?\d+)\s+points?").unwrap()
});
static RE_CLASSIC_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^all\s+(\d+)\s+comments").unwrap());
static RE_SCORE_POINTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(-?\d+)\s+points?\b").unwrap());
static RE_MODERN_USER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:u/([A-Za-z0-9_-]+)|\[(?:u/)?([A-Za-z0-9_-]+)\]\([^)]*/user/[^)]*\))\s*$")
        .unwrap()
});
static RE_TIME_AGO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\d+\s*(?:s|sec|m|min|h|hr|d|mo|y|yr)\.?|\d+\s+\w+)\s+ago$").unwrap()
});

/// Lines that are page chrome rather than content in the modern layout.
const MODERN_CHROME: &[&str] = &[
    "•", "Reply", "Share", "Upvote", "Downvote", "Award", "more replies", "Sort by:",
    "Best", "Top", "New", "Join", "Go to comments",
];

/// Action links under classic posts and comments.
const CLASSIC_CHROME: &[&str] = &[
    "share", "save", "hide", "report", "permalink", "embed", "reply", "give", "award",
    "crosspost", "source", "parent",
];

/// Headings that open the comment section of a modern page.
const MODERN_COMMENTS_MARKERS: &[&str] = &["Comments Section", "Sort by:", "Add a comment"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("page layout not recognised")]
    UnrecognizedLayout,

    #[error("no thread title found")]
    MissingTitle,

    #[error("no post ID in URL {0}")]
    MissingPostId(String),

    #[error("page has no content")]
    EmptyContent,
}

/// A thread recovered from markdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPost {
    pub post: RawPost,
    pub comments: Vec<NewComment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Classic,
    Modern,
}

fn is_heading(line: &str) -> bool {
    line == "#" || line.starts_with("# ")
}

fn detect_layout(lines: &[&str]) -> Option<Layout> {
    if lines.iter().any(|l| RE_CLASSIC_BYLINE.is_match(l)) {
        return Some(Layout::Classic);
    }
    let has_heading = lines.iter().any(|l| is_heading(l));
    let has_crumb = lines.iter().any(|l| RE_CHANNEL.is_match(l));
    if has_heading && has_crumb {
        return Some(Layout::Modern);
    }
    None
}

/// Strip link markup, keeping the link text.
fn plain(line: &str) -> String {
    RE_MD_LINK.replace_all(line, "$1").trim().to_string()
}

fn is_classic_chrome(line: &str) -> bool {
    let text = plain(line).to_lowercase();
    !text.is_empty() && text.split_whitespace().all(|w| CLASSIC_CHROME.contains(&w))
}

fn join_body(lines: &[&str]) -> String {
    let text = lines
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    text.trim().to_string()
}

/// FNV-1a over the inputs; stable across runs and toolchains.
fn stable_id(parts: &[&str]) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for part in parts {
        for byte in part.bytes().chain(std::iter::once(0)) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    format!("md{hash:016x}")
}

pub fn parse_thread(markdown: &str, url: &str) -> Result<ParsedPost, ParseError> {
    if markdown.trim().is_empty() {
        return Err(ParseError::EmptyContent);
    }
    let post_id = RE_POST_ID
        .captures(url)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ParseError::MissingPostId(url.to_string()))?;

    let lines: Vec<&str> = markdown.lines().map(str::trim).collect();
    let layout = detect_layout(&lines).ok_or(ParseError::UnrecognizedLayout)?;

    let channel = RE_CHANNEL
        .captures(url)
        .map(|c| c[1].to_string())
        .or_else(|| {
            lines
                .iter()
                .find_map(|l| RE_CHANNEL.captures(l).map(|c| c[1].to_string()))
        })
        .unwrap_or_default();

    let mut parsed = match layout {
        Layout::Classic => parse_classic(&lines, &post_id)?,
        Layout::Modern => parse_modern(&lines, &post_id)?,
    };
    parsed.post.channel = channel;
    parsed.post.permalink = permalink_path(url);
    if parsed.post.num_comments == 0 {
        parsed.post.num_comments = parsed.comments.len() as i64;
    }
    Ok(parsed)
}

fn permalink_path(url: &str) -> String {
    match url.find("/r/") {
        Some(idx) => url[idx..].split(['?', '#']).next().unwrap_or("").to_string(),
        None => url.to_string(),
    }
}

fn skeleton(post_id: &str, title: String, author: String, body: String) -> RawPost {
    RawPost {
        external_id: post_id.to_string(),
        channel: String::new(),
        author,
        title,
        body,
        created_at: Utc::now(),
        score: 0,
        num_comments: 0,
        permalink: String::new(),
    }
}

// ---------------------------------------------------------------------------
// Classic layout
// ---------------------------------------------------------------------------

fn parse_classic(lines: &[&str], post_id: &str) -> Result<ParsedPost, ParseError> {
    let byline_idx = lines
        .iter()
        .position(|l| RE_CLASSIC_BYLINE.is_match(l))
        .ok_or(ParseError::UnrecognizedLayout)?;
    let author = RE_CLASSIC_BYLINE
        .captures(lines[byline_idx])
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    // Title is the nearest heading (or link line) above the byline.
    let title = lines[..byline_idx]
        .iter()
        .rev()
        .find(|l| l.starts_with('#') || (l.starts_with('[') && l.contains("](")))
        .map(|l| plain(l.trim_start_matches('#')))
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingTitle)?;

    let score = lines[..byline_idx]
        .iter()
        .find_map(|l| RE_SCORE_POINTS.captures(l))
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);

    // Comment headers above the byline are sidebar or promoted content.
    let first_comment = lines[byline_idx + 1..]
        .iter()
        .position(|l| RE_CLASSIC_COMMENT.is_match(l))
        .map(|p| p + byline_idx + 1)
        .unwrap_or(lines.len());
    let mut num_comments = 0;
    let body_end = lines[byline_idx + 1..first_comment]
        .iter()
        .position(|l| {
            if let Some(c) = RE_CLASSIC_COUNT.captures(l) {
                num_comments = c[1].parse().unwrap_or(0);
                true
            } else {
                false
            }
        })
        .map(|p| p + byline_idx + 1)
        .unwrap_or(first_comment);
    let body_lines: Vec<&str> = lines[byline_idx + 1..body_end]
        .iter()
        .copied()
        .filter(|l| !is_classic_chrome(l))
        .collect();
    let body = join_body(&body_lines);

    let mut comments = Vec::new();
    let mut idx = first_comment;
    while idx < lines.len() {
        let Some(header) = RE_CLASSIC_COMMENT.captures(lines[idx]) else {
            idx += 1;
            continue;
        };
        let next = lines[idx + 1..]
            .iter()
            .position(|l| RE_CLASSIC_COMMENT.is_match(l))
            .map(|p| p + idx + 1)
            .unwrap_or(lines.len());

        let block = &lines[idx + 1..next];
        let body_lines: Vec<&str> = block
            .iter()
            .copied()
            .filter(|l| !is_classic_chrome(l))
            .collect();
        let body = join_body(&body_lines);
        if !body.is_empty() {
            let author = header[1].to_string();
            let external_id = block
                .iter()
                .find_map(|l| RE_COMMENT_PERMALINK.captures(l).map(|c| c[1].to_string()))
                .unwrap_or_else(|| stable_id(&[post_id, &author, &body]));
            comments.push(NewComment {
                external_id,
                parent_external_id: None,
                author,
                body,
                score: header[2].parse().unwrap_or(0),
                created_at: Utc::now(),
                depth: 0,
            });
        }
        idx = next;
    }

    let mut post = skeleton(post_id, title, author, body);
    post.score = score;
    post.num_comments = num_comments;
    Ok(ParsedPost { post, comments })
}

// ---------------------------------------------------------------------------
// Modern layout
// ---------------------------------------------------------------------------

fn modern_user(line: &str) -> Option<String> {
    RE_MODERN_USER.captures(line).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .map(|m| m.as_str().to_string())
    })
}

fn is_chrome(line: &str) -> bool {
    line.is_empty() || MODERN_CHROME.contains(&line) || RE_TIME_AGO.is_match(line)
}

fn parse_modern(lines: &[&str], post_id: &str) -> Result<ParsedPost, ParseError> {
    let title_idx = lines
        .iter()
        .position(|l| is_heading(l))
        .ok_or(ParseError::MissingTitle)?;
    let title = plain(lines[title_idx].trim_start_matches('#'));
    if title.is_empty() {
        return Err(ParseError::MissingTitle);
    }

    let author = lines[..title_idx]
        .iter()
        .rev()
        .find_map(|l| modern_user(l))
        .unwrap_or_else(|| "[unknown]".to_string());

    // Body runs until the comment section or the first commenter byline.
    let rest = &lines[title_idx + 1..];
    let body_end = rest
        .iter()
        .position(|l| {
            MODERN_COMMENTS_MARKERS.iter().any(|m| l.starts_with(m)) || modern_user(l).is_some()
        })
        .unwrap_or(rest.len());
    let body_lines: Vec<&str> = rest[..body_end]
        .iter()
        .copied()
        .filter(|l| !MODERN_CHROME.contains(l))
        .collect();
    let body = join_body(&body_lines);

    let mut comments = Vec::new();
    let section = &rest[body_end..];
    let mut idx = 0;
    while idx < section.len() {
        let Some(author) = modern_user(section[idx]) else {
            idx += 1;
            continue;
        };
        let next = section[idx + 1..]
            .iter()
            .position(|l| modern_user(l).is_some())
            .map(|p| p + idx + 1)
            .unwrap_or(section.len());
        let body_lines: Vec<&str> = section[idx + 1..next]
            .iter()
            .copied()
            .filter(|l| {
                !is_chrome(l) && !MODERN_COMMENTS_MARKERS.iter().any(|m| l.starts_with(m))
            })
            .collect();
        let body = join_body(&body_lines);
        if !body.is_empty() {
            comments.push(NewComment {
                external_id: stable_id(&[post_id, &author, &body]),
                parent_external_id: None,
                author,
                body,
                score: 0,
                created_at: Utc::now(),
                depth: 0,
            });
        }
        idx = next;
    }

    Ok(ParsedPost {
        post: skeleton(post_id, title, author, body),
        comments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_id_comes_from_url() {
        let md = "# Title\n\nr/travel\n\nbody";
        let err = parse_thread(md, "https://www.reddit.com/r/travel/").unwrap_err();
        assert!(matches!(err, ParseError::MissingPostId(_)));
    }

    #[test]
    fn blank_page_is_empty_content() {
        assert_eq!(
            parse_thread("  \n ", "https://www.reddit.com/r/travel/comments/abc/x/"),
            Err(ParseError::EmptyContent)
        );
    }

    #[test]
    fn unknown_layout_is_rejected() {
        assert_eq!(
            parse_thread("Just some text", "https://www.reddit.com/r/travel/comments/abc/x/"),
            Err(ParseError::UnrecognizedLayout)
        );
    }

    #[test]
    fn stable_ids_are_deterministic() {
        assert_eq!(stable_id(&["a", "b"]), stable_id(&["a", "b"]));
        assert_ne!(stable_id(&["ab", ""]), stable_id(&["a", "b"]));
    }

    #[test]
    fn permalink_drops_host_and_query() {
        assert_eq!(
            permalink_path("https://old.reddit.com/r/travel/comments/abc/taxi/?sort=new"),
            "/r/travel/comments/abc/taxi/"
        );
    }
}
