//! Idempotent merge of a resolved post into the store.
//!
//! Lock order for every writer: post identity, then actor identities in sorted
//! order, then the store transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, Transaction};

use super::resolver::{ResolvedActor, ResolvedPost};
use super::timestamp::normalize_timestamp;
use crate::error::{IngestError, Result};
use crate::models::post::PostKey;
use crate::store::Store;
use crate::utils::hash::{content_hash, stable_id};
use crate::utils::html::strip_markup;
use crate::utils::text::normalize_key;

/// Sort key of posts whose timestamp could not be interpreted; they list last.
pub const UNKNOWN_SORT_KEY: i64 = i64::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    /// First time this post identity was seen.
    Inserted,
    /// Newer snapshot; engagement counters moved forward.
    Refreshed,
    /// Same or older snapshot; counters left alone.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub key: PostKey,
    pub post_id: String,
    pub status: UpsertStatus,
    pub new_comments: u64,
    pub snapshot_recorded: bool,
    /// More comments or likers were captured than the platform reported.
    pub overflow: bool,
    /// Content differs from what was first stored; the stored content was kept.
    pub content_drift: bool,
    /// Posts under other keywords with identical content, flagged for review.
    pub cross_keyword_duplicates: Vec<String>,
}

pub async fn upsert_post(
    store: &Store,
    post: &ResolvedPost,
    observed_at: DateTime<Utc>,
    raw: &serde_json::Value,
) -> Result<UpsertOutcome> {
    let key = &post.parsed.key;
    let post_id = key.post_id();
    let observed_ms = observed_at.timestamp_millis();

    // 1. Serialize writers of this post and of every actor it touches
    let _post_guard = store.post_locks().lock(&post_id).await;
    let actors = post.distinct_actors();
    let _actor_guards = store
        .actor_locks()
        .lock_all(actors.iter().map(|a| a.id.as_str()))
        .await;

    let mut tx = store.writer().begin().await?;

    // 2. Identity check
    let existing: Option<(String, i64, String)> =
        sqlx::query_as("SELECT author_id, observed_ms, content_hash FROM posts WHERE id = ?")
            .bind(&post_id)
            .fetch_optional(&mut *tx)
            .await?;

    if let Some((stored_author, _, _)) = &existing {
        if stored_author != post.author.id.as_str() {
            tx.rollback().await?;
            quarantine(store, post, &post_id, stored_author, observed_ms, raw).await?;
            tracing::warn!(
                "Identity conflict on post {}: stored author {}, incoming author {}",
                key,
                stored_author,
                post.author.id
            );
            return Err(IngestError::IdentityConflict {
                keyword: key.keyword.clone(),
                post_number: key.post_number,
                stored_author: stored_author.clone(),
                incoming_author: post.author.id.to_string(),
            });
        }
    }

    // 3. Actors, every occurrence so each name seen in the document is kept
    for actor in post.occurrences() {
        upsert_actor(&mut tx, actor, observed_ms).await?;
    }

    // 4. Post row
    let hash = content_hash(&post.parsed.content);
    let (status, content_drift) = match existing {
        None => {
            insert_post(&mut tx, post, &post_id, &hash, observed_at).await?;
            (UpsertStatus::Inserted, false)
        }
        Some((_, stored_ms, stored_hash)) => {
            let drift = stored_hash != hash;
            if drift {
                tracing::warn!("Content of post {} changed since first ingestion; keeping stored content", key);
            }
            if observed_ms > stored_ms {
                sqlx::query(
                    "UPDATE posts SET total_likers = ?, total_comments = ?, observed_ms = ? WHERE id = ?",
                )
                .bind(post.parsed.total_likers)
                .bind(post.parsed.total_comments)
                .bind(observed_ms)
                .bind(&post_id)
                .execute(&mut *tx)
                .await?;
                (UpsertStatus::Refreshed, drift)
            } else {
                (UpsertStatus::Unchanged, drift)
            }
        }
    };

    // 5. Cross-keyword duplicates are flagged, never merged
    let cross_keyword_duplicates = if status == UpsertStatus::Inserted {
        flag_cross_keyword(&mut tx, key, &post_id, &post.parsed.content, &hash, observed_ms).await?
    } else {
        Vec::new()
    };

    // 6. Engagement snapshot
    let (snapshot_recorded, overflow) = record_snapshot(&mut tx, post, &post_id, observed_ms).await?;

    // 7. Comments
    let new_comments = upsert_comments(&mut tx, post, &post_id, observed_at).await?;

    tx.commit().await?;

    match status {
        UpsertStatus::Unchanged => tracing::debug!("Post {} unchanged", key),
        _ => tracing::info!(
            "Post {} {:?}: {} new comments, snapshot recorded: {}",
            key,
            status,
            new_comments,
            snapshot_recorded
        ),
    }

    Ok(UpsertOutcome {
        key: key.clone(),
        post_id,
        status,
        new_comments,
        snapshot_recorded,
        overflow,
        content_drift,
        cross_keyword_duplicates,
    })
}

/// Inserts a new actor or refreshes display attributes from a newer sighting.
/// Identity and the first display name are never overwritten; a materially
/// different name is kept as an alias.
async fn upsert_actor(
    tx: &mut Transaction<'_, Sqlite>,
    actor: &ResolvedActor,
    observed_ms: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO actors (
            id, kind, confidence, canonical_url, display_name, title, image_url,
            first_seen_ms, last_seen_ms
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            title = COALESCE(excluded.title, actors.title),
            image_url = COALESCE(excluded.image_url, actors.image_url),
            last_seen_ms = excluded.last_seen_ms
        WHERE excluded.last_seen_ms > actors.last_seen_ms
        "#,
    )
    .bind(actor.id.as_str())
    .bind(actor.kind.as_str())
    .bind(actor.confidence.as_str())
    .bind(actor.canonical_url.as_deref())
    .bind(&actor.display_name)
    .bind(actor.title.as_deref())
    .bind(actor.image_url.as_deref())
    .bind(observed_ms)
    .bind(observed_ms)
    .execute(&mut **tx)
    .await?;

    sqlx::query("UPDATE actors SET first_seen_ms = ? WHERE id = ? AND first_seen_ms > ?")
        .bind(observed_ms)
        .bind(actor.id.as_str())
        .bind(observed_ms)
        .execute(&mut **tx)
        .await?;

    let stored_name: String = sqlx::query_scalar("SELECT display_name FROM actors WHERE id = ?")
        .bind(actor.id.as_str())
        .fetch_one(&mut **tx)
        .await?;

    let alias_key = normalize_key(&actor.display_name);
    if !alias_key.is_empty() && alias_key != normalize_key(&stored_name) {
        let added = sqlx::query(
            r#"
            INSERT INTO actor_aliases (actor_id, alias_key, alias, first_seen_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (actor_id, alias_key) DO NOTHING
            "#,
        )
        .bind(actor.id.as_str())
        .bind(&alias_key)
        .bind(&actor.display_name)
        .bind(observed_ms)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if added > 0 {
            tracing::debug!(
                "Actor {} seen as {:?}, stored as {:?}; alias recorded",
                actor.id,
                actor.display_name,
                stored_name
            );
        }
    }

    Ok(())
}

async fn insert_post(
    tx: &mut Transaction<'_, Sqlite>,
    post: &ResolvedPost,
    post_id: &str,
    hash: &str,
    observed_at: DateTime<Utc>,
) -> Result<()> {
    let parsed = &post.parsed;
    let ts = normalize_timestamp(&parsed.raw_timestamp, observed_at);
    let approx_ms = ts.approx_instant.map(|t| t.timestamp_millis());
    let visibility = parsed.visibility.clone().or(ts.visibility);
    let observed_ms = observed_at.timestamp_millis();

    sqlx::query(
        r#"
        INSERT INTO posts (
            id, keyword, post_number, author_id, content, content_hash, post_url,
            raw_timestamp, relative_age, approx_instant_ms, sort_key, precision,
            edited, visibility, total_likers, total_comments, observed_ms, first_ingested_ms
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(post_id)
    .bind(&parsed.key.keyword)
    .bind(parsed.key.post_number)
    .bind(post.author.id.as_str())
    .bind(&parsed.content)
    .bind(hash)
    .bind(parsed.post_url.as_deref())
    .bind(&parsed.raw_timestamp)
    .bind(ts.relative_age.as_deref())
    .bind(approx_ms)
    .bind(approx_ms.unwrap_or(UNKNOWN_SORT_KEY))
    .bind(ts.precision.as_str())
    .bind(ts.edited)
    .bind(visibility.as_deref())
    .bind(parsed.total_likers)
    .bind(parsed.total_comments)
    .bind(observed_ms)
    .bind(observed_ms)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn flag_cross_keyword(
    tx: &mut Transaction<'_, Sqlite>,
    key: &PostKey,
    post_id: &str,
    content: &str,
    hash: &str,
    observed_ms: i64,
) -> Result<Vec<String>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let others: Vec<String> =
        sqlx::query_scalar("SELECT id FROM posts WHERE content_hash = ? AND keyword <> ? AND id <> ?")
            .bind(hash)
            .bind(&key.keyword)
            .bind(post_id)
            .fetch_all(&mut **tx)
            .await?;

    for other in &others {
        sqlx::query(
            r#"
            INSERT INTO review_flags (content_hash, post_id, other_post_id, reason, flagged_ms)
            VALUES (?, ?, ?, 'same content stored under another keyword', ?)
            ON CONFLICT (post_id, other_post_id) DO NOTHING
            "#,
        )
        .bind(hash)
        .bind(post_id)
        .bind(other)
        .bind(observed_ms)
        .execute(&mut **tx)
        .await?;

        tracing::warn!("Post {} duplicates post {} under another keyword; flagged for review", key, other);
    }

    Ok(others)
}

/// Records one snapshot per (post, scrape time). Returns whether a new row was
/// written and whether more identities were captured than reported.
async fn record_snapshot(
    tx: &mut Transaction<'_, Sqlite>,
    post: &ResolvedPost,
    post_id: &str,
    observed_ms: i64,
) -> Result<(bool, bool)> {
    let parsed = &post.parsed;
    let observed_likers = post.likers.len() as i64;
    let observed_comments = parsed.comments.len() as i64;
    let overflow =
        observed_comments > parsed.total_comments || observed_likers > parsed.total_likers;

    if overflow {
        tracing::warn!(
            "Post {} captured {} comments / {} likers but reports {} / {}",
            parsed.key,
            observed_comments,
            observed_likers,
            parsed.total_comments,
            parsed.total_likers
        );
    }

    let snapshot_id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO engagement_snapshots (
            post_id, observed_ms, total_likers, total_comments,
            observed_likers, observed_comments, overflow
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (post_id, observed_ms) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(post_id)
    .bind(observed_ms)
    .bind(parsed.total_likers)
    .bind(parsed.total_comments)
    .bind(observed_likers)
    .bind(observed_comments)
    .bind(overflow)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(snapshot_id) = snapshot_id else {
        return Ok((false, overflow));
    };

    for (position, liker) in post.likers.iter().enumerate() {
        sqlx::query("INSERT INTO snapshot_likers (snapshot_id, position, actor_id) VALUES (?, ?, ?)")
            .bind(snapshot_id)
            .bind(position as i64)
            .bind(liker.id.as_str())
            .execute(&mut **tx)
            .await?;
    }

    Ok((true, overflow))
}

/// Identity of a comment: post, parent, author, normalized text and position
/// among siblings. The data carries no platform comment ids, so an edited
/// comment becomes a new comment.
pub fn comment_id(
    post_id: &str,
    parent_id: Option<&str>,
    author_id: &str,
    normalized_text: &str,
    position: usize,
) -> String {
    stable_id(
        "comment",
        &[
            post_id,
            parent_id.unwrap_or_default(),
            author_id,
            normalized_text,
            &position.to_string(),
        ],
    )
}

pub fn normalize_comment_text(content: &str) -> String {
    normalize_key(&strip_markup(content))
}

async fn upsert_comments(
    tx: &mut Transaction<'_, Sqlite>,
    post: &ResolvedPost,
    post_id: &str,
    observed_at: DateTime<Utc>,
) -> Result<u64> {
    let tree = &post.parsed.comments;
    if tree.is_empty() {
        return Ok(0);
    }

    let count_sql = "SELECT COUNT(*) FROM comments WHERE post_id = ?";
    let before: i64 = sqlx::query_scalar(count_sql)
        .bind(post_id)
        .fetch_one(&mut **tx)
        .await?;

    let observed_ms = observed_at.timestamp_millis();
    let mut ids: Vec<String> = Vec::with_capacity(tree.len());

    // Parents precede children in the arena, so a parent's id is always known.
    for (index, node) in tree.nodes.iter().enumerate() {
        let comment = &node.item;
        let author = &post.commenters[index];
        let parent_id = node.parent.map(|p| ids[p].as_str());
        let normalized_text = normalize_comment_text(&comment.content);
        let id = comment_id(post_id, parent_id, author.id.as_str(), &normalized_text, node.position);
        let ts = normalize_timestamp(&comment.raw_timestamp, observed_at);

        sqlx::query(
            r#"
            INSERT INTO comments (
                id, post_id, parent_id, position, author_id, content, normalized_text,
                raw_timestamp, relative_age, approx_instant_ms, precision,
                reactions_count, first_seen_ms, last_seen_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                reactions_count = excluded.reactions_count,
                last_seen_ms = excluded.last_seen_ms
            WHERE excluded.last_seen_ms > comments.last_seen_ms
            "#,
        )
        .bind(&id)
        .bind(post_id)
        .bind(parent_id)
        .bind(node.position as i64)
        .bind(author.id.as_str())
        .bind(&comment.content)
        .bind(&normalized_text)
        .bind(&comment.raw_timestamp)
        .bind(ts.relative_age.as_deref())
        .bind(ts.approx_instant.map(|t| t.timestamp_millis()))
        .bind(ts.precision.as_str())
        .bind(comment.reactions_count)
        .bind(observed_ms)
        .bind(observed_ms)
        .execute(&mut **tx)
        .await?;

        ids.push(id);
    }

    let after: i64 = sqlx::query_scalar(count_sql)
        .bind(post_id)
        .fetch_one(&mut **tx)
        .await?;

    Ok((after - before).max(0) as u64)
}

/// Holds back a conflicting document for manual resolution.
async fn quarantine(
    store: &Store,
    post: &ResolvedPost,
    post_id: &str,
    stored_author: &str,
    observed_ms: i64,
    raw: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO quarantine (
            post_id, keyword, post_number, stored_author_id, incoming_author_id,
            raw_document, observed_ms
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (post_id, incoming_author_id, observed_ms) DO NOTHING
        "#,
    )
    .bind(post_id)
    .bind(&post.parsed.key.keyword)
    .bind(post.parsed.key.post_number)
    .bind(stored_author)
    .bind(post.author.id.as_str())
    .bind(raw.to_string())
    .bind(observed_ms)
    .execute(store.writer())
    .await?;

    Ok(())
}
