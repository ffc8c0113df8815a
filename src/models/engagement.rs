use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::{
    actor::{Actor, ActorId},
    from_millis,
};

/// Point-in-time capture of a post's engagement.
///
/// Platforms cap the identities they return, so `total_*` (reported) and
/// `observed_*` (identities actually captured) are kept apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementSnapshot {
    pub post_id: String,
    pub observed_at: DateTime<Utc>,
    pub total_likers: i64,
    pub total_comments: i64,
    pub observed_likers: i64,
    pub observed_comments: i64,
    /// More identities were captured than the platform reported.
    pub overflow: bool,
    pub likers: Vec<ActorId>,
}

/// Represents the 'engagement_snapshots' table in the database.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SnapshotRow {
    pub id: i64,
    pub post_id: String,
    pub observed_ms: i64,
    pub total_likers: i64,
    pub total_comments: i64,
    pub observed_likers: i64,
    pub observed_comments: i64,
    pub overflow: bool,
}

impl SnapshotRow {
    pub(crate) fn into_snapshot(self, likers: Vec<ActorId>) -> EngagementSnapshot {
        EngagementSnapshot {
            post_id: self.post_id,
            observed_at: from_millis(self.observed_ms),
            total_likers: self.total_likers,
            total_comments: self.total_comments,
            observed_likers: self.observed_likers,
            observed_comments: self.observed_comments,
            overflow: self.overflow,
            likers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Author,
    Liker,
    Commenter,
}

/// An actor taking part in a post, with every role they played.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub actor: Actor,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Like,
    Comment,
    Reply,
}

/// Directed interaction between two actors: a like or comment on someone's
/// post, or a reply to someone's comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionEdge {
    pub from: ActorId,
    pub to: ActorId,
    pub kind: EdgeKind,
    pub post_id: String,
}

/// An actor ranked by the number of distinct posts they engaged with.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActorActivity {
    pub actor_id: String,
    pub display_name: String,
    pub posts: i64,
}

/// Query parameters for ranking actors.
#[derive(Debug, Deserialize, Validate)]
pub struct TopActorsParams {
    /// 'liker' or 'commenter'.
    pub role: Role,

    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
}

/// An ingestion held back because it claimed a different author.
#[derive(Debug, Clone, Serialize)]
pub struct QuarantineEntry {
    pub id: i64,
    pub post_id: String,
    pub keyword: String,
    pub post_number: i64,
    pub stored_author_id: ActorId,
    pub incoming_author_id: ActorId,
    pub observed_at: DateTime<Utc>,
    pub status: String,
    pub raw_document: serde_json::Value,
}

/// Represents the 'quarantine' table in the database.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct QuarantineRow {
    pub id: i64,
    pub post_id: String,
    pub keyword: String,
    pub post_number: i64,
    pub stored_author_id: String,
    pub incoming_author_id: String,
    pub raw_document: String,
    pub observed_ms: i64,
    pub status: String,
}

impl From<QuarantineRow> for QuarantineEntry {
    fn from(row: QuarantineRow) -> Self {
        QuarantineEntry {
            id: row.id,
            post_id: row.post_id,
            keyword: row.keyword,
            post_number: row.post_number,
            stored_author_id: ActorId(row.stored_author_id),
            incoming_author_id: ActorId(row.incoming_author_id),
            observed_at: from_millis(row.observed_ms),
            status: row.status,
            raw_document: serde_json::from_str(&row.raw_document)
                .unwrap_or(serde_json::Value::String(row.raw_document)),
        }
    }
}

/// Same content stored under more than one keyword; left for manual review.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewFlag {
    pub content_hash: String,
    pub post_id: String,
    pub other_post_id: String,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}

/// Represents the 'review_flags' table in the database.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ReviewFlagRow {
    pub content_hash: String,
    pub post_id: String,
    pub other_post_id: String,
    pub reason: String,
    pub flagged_ms: i64,
}

impl From<ReviewFlagRow> for ReviewFlag {
    fn from(row: ReviewFlagRow) -> Self {
        ReviewFlag {
            content_hash: row.content_hash,
            post_id: row.post_id,
            other_post_id: row.other_post_id,
            reason: row.reason,
            flagged_at: from_millis(row.flagged_ms),
        }
    }
}
