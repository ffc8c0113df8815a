use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::{actor::ActorId, from_millis};
use crate::ingest::timestamp::Precision;
use crate::utils::hash::stable_id;

/// Composite identity of a post as observed in the scraped data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostKey {
    pub keyword: String,
    pub post_number: i64,
}

impl PostKey {
    pub fn new(keyword: impl Into<String>, post_number: i64) -> Self {
        Self {
            keyword: keyword.into(),
            post_number,
        }
    }

    /// Stable storage id derived from `(keyword, post_number)`.
    pub fn post_id(&self) -> String {
        stable_id("post", &[&self.keyword, &self.post_number.to_string()])
    }
}

impl std::fmt::Display for PostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.keyword, self.post_number)
    }
}

/// A post as stored after normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub keyword: String,
    pub post_number: i64,
    pub author_id: ActorId,
    pub content: String,
    pub content_hash: String,
    pub post_url: Option<String>,

    pub raw_timestamp: String,
    pub relative_age: Option<String>,
    pub approx_instant: Option<DateTime<Utc>>,
    pub precision: Precision,
    pub edited: bool,
    pub visibility: Option<String>,

    /// Counters as reported by the platform at `observed_at`.
    pub total_likers: i64,
    pub total_comments: i64,

    /// Scrape time of the engagement snapshot currently applied.
    pub observed_at: DateTime<Utc>,
    pub first_ingested_at: DateTime<Utc>,
}

impl Post {
    pub fn key(&self) -> PostKey {
        PostKey::new(self.keyword.clone(), self.post_number)
    }
}

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct PostRow {
    pub id: String,
    pub keyword: String,
    pub post_number: i64,
    pub author_id: String,
    pub content: String,
    pub content_hash: String,
    pub post_url: Option<String>,
    pub raw_timestamp: String,
    pub relative_age: Option<String>,
    pub approx_instant_ms: Option<i64>,
    pub sort_key: i64,
    pub precision: String,
    pub edited: bool,
    pub visibility: Option<String>,
    pub total_likers: i64,
    pub total_comments: i64,
    pub observed_ms: i64,
    pub first_ingested_ms: i64,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            keyword: row.keyword,
            post_number: row.post_number,
            author_id: ActorId(row.author_id),
            content: row.content,
            content_hash: row.content_hash,
            post_url: row.post_url,
            raw_timestamp: row.raw_timestamp,
            relative_age: row.relative_age,
            approx_instant: row.approx_instant_ms.map(from_millis),
            precision: Precision::parse(&row.precision),
            edited: row.edited,
            visibility: row.visibility,
            total_likers: row.total_likers,
            total_comments: row.total_comments,
            observed_at: from_millis(row.observed_ms),
            first_ingested_at: from_millis(row.first_ingested_ms),
        }
    }
}

/// Position of the last post of a page; the next page starts after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCursorPosition {
    pub sort_key: i64,
    pub post_number: i64,
}

impl PostCursorPosition {
    /// Opaque `"<sort_key>:<post_number>"` form used in query strings.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.sort_key, self.post_number)
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let (sort_key, post_number) = raw.split_once(':')?;
        Some(Self {
            sort_key: sort_key.parse().ok()?,
            post_number: post_number.parse().ok()?,
        })
    }
}

/// Query parameters for listing posts of a keyword.
#[derive(Debug, Deserialize, Validate)]
pub struct PostListParams {
    #[validate(length(min = 1, max = 200, message = "Keyword must be between 1 and 200 chars"))]
    pub keyword: String,

    /// Number of items to return (default: 20, max: 100).
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,

    /// Cursor returned by the previous page.
    pub cursor: Option<String>,
}

/// One page of a keyword listing.
#[derive(Debug, Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}
