// src/query.rs
//
// Read-only access to the merged store. Nothing here writes.

use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::ingest::upsert::UNKNOWN_SORT_KEY;
use crate::models::actor::{Actor, ActorId, ActorRow};
use crate::models::comment::{Comment, CommentRow, CommentTree};
use crate::models::engagement::{
    ActorActivity, EdgeKind, EngagementSnapshot, InteractionEdge, Participant, QuarantineEntry,
    QuarantineRow, ReviewFlag, ReviewFlagRow, Role, SnapshotRow,
};
use crate::models::post::{Post, PostCursorPosition, PostKey, PostRow};
use crate::store::Store;

const POST_COLUMNS: &str = r#"
    id, keyword, post_number, author_id, content, content_hash, post_url,
    raw_timestamp, relative_age, approx_instant_ms, sort_key, precision,
    edited, visibility, total_likers, total_comments, observed_ms, first_ingested_ms
"#;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Fetch a post by its `(keyword, post_number)` identity.
pub async fn get_post(
    store: &Store,
    keyword: &str,
    post_number: i64,
) -> Result<Option<Post>, sqlx::Error> {
    get_post_by_id(store, &PostKey::new(keyword, post_number).post_id()).await
}

pub async fn get_post_by_id(store: &Store, post_id: &str) -> Result<Option<Post>, sqlx::Error> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?");
    let row: Option<PostRow> = sqlx::query_as(&sql)
        .bind(post_id)
        .fetch_optional(store.pool())
        .await?;

    Ok(row.map(Post::from))
}

/// One page of a keyword, newest first; posts with an unknown timestamp list
/// last and ties go to the lower post number.
pub async fn list_posts_page(
    store: &Store,
    keyword: &str,
    after: Option<PostCursorPosition>,
    limit: i64,
) -> Result<(Vec<Post>, Option<PostCursorPosition>), sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts
        WHERE keyword = ?1
          AND (?2 IS NULL OR sort_key < ?2 OR (sort_key = ?2 AND post_number > ?3))
        ORDER BY sort_key DESC, post_number ASC
        LIMIT ?4
        "#
    );

    let rows: Vec<PostRow> = sqlx::query_as(&sql)
        .bind(keyword)
        .bind(after.map(|p| p.sort_key))
        .bind(after.map(|p| p.post_number))
        .bind(limit)
        .fetch_all(store.pool())
        .await?;

    let posts: Vec<Post> = rows.into_iter().map(Post::from).collect();

    // Only return a cursor if we got a full page (more results likely)
    let next = if posts.len() as i64 == limit {
        posts.last().map(position_of)
    } else {
        None
    };

    Ok((posts, next))
}

fn position_of(post: &Post) -> PostCursorPosition {
    PostCursorPosition {
        sort_key: post
            .approx_instant
            .map(|t| t.timestamp_millis())
            .unwrap_or(UNKNOWN_SORT_KEY),
        post_number: post.post_number,
    }
}

/// Lazy listing of every post under `keyword`.
/// Each call starts from the top, so a listing can always be restarted.
pub fn list_posts(store: &Store, keyword: &str) -> PostCursor {
    PostCursor {
        store: store.clone(),
        keyword: keyword.to_string(),
        page_size: DEFAULT_PAGE_SIZE,
        after: None,
        exhausted: false,
    }
}

/// Keyset-paginated cursor over a keyword's posts.
pub struct PostCursor {
    store: Store,
    keyword: String,
    page_size: i64,
    after: Option<PostCursorPosition>,
    exhausted: bool,
}

impl PostCursor {
    pub fn page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Resume after a position handed out by an earlier page.
    pub fn starting_after(mut self, position: Option<PostCursorPosition>) -> Self {
        self.after = position;
        self
    }

    /// Next page, or `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Post>>, sqlx::Error> {
        if self.exhausted {
            return Ok(None);
        }

        let (posts, next) =
            list_posts_page(&self.store, &self.keyword, self.after, self.page_size).await?;

        match next {
            Some(position) => self.after = Some(position),
            None => self.exhausted = true,
        }

        if posts.is_empty() {
            return Ok(None);
        }
        Ok(Some(posts))
    }

    pub async fn collect_all(mut self) -> Result<Vec<Post>, sqlx::Error> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

pub async fn get_actor(store: &Store, id: &ActorId) -> Result<Option<Actor>, sqlx::Error> {
    fetch_actor(store.pool(), id.as_str()).await
}

async fn fetch_actor(pool: &SqlitePool, id: &str) -> Result<Option<Actor>, sqlx::Error> {
    let row: Option<ActorRow> = sqlx::query_as(
        r#"
        SELECT id, kind, confidence, canonical_url, display_name, title, image_url,
               first_seen_ms, last_seen_ms
        FROM actors
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let aliases: Vec<String> = sqlx::query_scalar(
        "SELECT alias FROM actor_aliases WHERE actor_id = ? ORDER BY first_seen_ms, alias",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(row.into_actor(aliases)))
}

/// Author, likers from every snapshot, and commenters of a post, each actor once.
pub async fn list_participants(
    store: &Store,
    post_id: &str,
) -> Result<Vec<Participant>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT author_id AS actor_id, 'author' AS role FROM posts WHERE id = ?1
        UNION
        SELECT sl.actor_id, 'liker'
        FROM snapshot_likers sl
        JOIN engagement_snapshots s ON s.id = sl.snapshot_id
        WHERE s.post_id = ?1
        UNION
        SELECT author_id, 'commenter' FROM comments WHERE post_id = ?1
        "#,
    )
    .bind(post_id)
    .fetch_all(store.pool())
    .await?;

    let mut roles: HashMap<String, Vec<Role>> = HashMap::new();
    for (actor_id, role) in rows {
        let role = match role.as_str() {
            "author" => Role::Author,
            "liker" => Role::Liker,
            _ => Role::Commenter,
        };
        roles.entry(actor_id).or_default().push(role);
    }

    let mut participants = Vec::with_capacity(roles.len());
    for (actor_id, mut actor_roles) in roles {
        actor_roles.sort();
        if let Some(actor) = fetch_actor(store.pool(), &actor_id).await? {
            participants.push(Participant {
                actor,
                roles: actor_roles,
            });
        }
    }

    // Author first, then by name
    participants.sort_by(|a, b| {
        a.roles[0]
            .cmp(&b.roles[0])
            .then_with(|| a.actor.display_name.cmp(&b.actor.display_name))
            .then_with(|| a.actor.id.cmp(&b.actor.id))
    });

    Ok(participants)
}

/// Full comment tree of a post, siblings in captured order.
pub async fn get_comment_tree(
    store: &Store,
    post_id: &str,
) -> Result<CommentTree<Comment>, sqlx::Error> {
    let rows: Vec<CommentRow> = sqlx::query_as(
        r#"
        SELECT id, post_id, parent_id, position, author_id, content, raw_timestamp,
               relative_age, approx_instant_ms, precision, reactions_count,
               first_seen_ms, last_seen_ms
        FROM comments
        WHERE post_id = ?
        ORDER BY position ASC, first_seen_ms ASC, id ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(store.pool())
    .await?;

    let mut children: HashMap<Option<String>, Vec<Comment>> = HashMap::new();
    for row in rows {
        let comment = Comment::from(row);
        children
            .entry(comment.parent_id.clone())
            .or_default()
            .push(comment);
    }

    let mut tree = CommentTree::new();
    let mut stack: Vec<(Option<usize>, Comment)> = children
        .remove(&None)
        .unwrap_or_default()
        .into_iter()
        .rev()
        .map(|c| (None, c))
        .collect();

    while let Some((parent, comment)) = stack.pop() {
        let replies = children.remove(&Some(comment.id.clone())).unwrap_or_default();
        let index = tree.push(parent, comment);
        stack.extend(replies.into_iter().rev().map(|c| (Some(index), c)));
    }

    Ok(tree)
}

/// Most recent engagement snapshot of a post, likers in captured order.
pub async fn latest_snapshot(
    store: &Store,
    post_id: &str,
) -> Result<Option<EngagementSnapshot>, sqlx::Error> {
    let row: Option<SnapshotRow> = sqlx::query_as(
        r#"
        SELECT id, post_id, observed_ms, total_likers, total_comments,
               observed_likers, observed_comments, overflow
        FROM engagement_snapshots
        WHERE post_id = ?
        ORDER BY observed_ms DESC
        LIMIT 1
        "#,
    )
    .bind(post_id)
    .fetch_optional(store.pool())
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let likers: Vec<String> = sqlx::query_scalar(
        "SELECT actor_id FROM snapshot_likers WHERE snapshot_id = ? ORDER BY position",
    )
    .bind(row.id)
    .fetch_all(store.pool())
    .await?;

    Ok(Some(
        row.into_snapshot(likers.into_iter().map(ActorId).collect()),
    ))
}

/// Like, comment and reply edges between actors for every post of a keyword.
/// Self-interactions are left out.
pub async fn interaction_edges(
    store: &Store,
    keyword: &str,
) -> Result<Vec<InteractionEdge>, sqlx::Error> {
    let queries = [
        (
            EdgeKind::Like,
            r#"
            SELECT DISTINCT sl.actor_id, p.author_id, p.id
            FROM snapshot_likers sl
            JOIN engagement_snapshots s ON s.id = sl.snapshot_id
            JOIN posts p ON p.id = s.post_id
            WHERE p.keyword = ? AND sl.actor_id <> p.author_id
            "#,
        ),
        (
            EdgeKind::Comment,
            r#"
            SELECT DISTINCT c.author_id, p.author_id, p.id
            FROM comments c
            JOIN posts p ON p.id = c.post_id
            WHERE p.keyword = ? AND c.parent_id IS NULL AND c.author_id <> p.author_id
            "#,
        ),
        (
            EdgeKind::Reply,
            r#"
            SELECT DISTINCT c.author_id, parent.author_id, c.post_id
            FROM comments c
            JOIN comments parent ON parent.id = c.parent_id
            JOIN posts p ON p.id = c.post_id
            WHERE p.keyword = ? AND c.author_id <> parent.author_id
            "#,
        ),
    ];

    let mut edges = Vec::new();
    for (kind, sql) in queries {
        let rows: Vec<(String, String, String)> = sqlx::query_as(sql)
            .bind(keyword)
            .fetch_all(store.pool())
            .await?;

        edges.extend(rows.into_iter().map(|(from, to, post_id)| InteractionEdge {
            from: ActorId(from),
            to: ActorId(to),
            kind,
            post_id,
        }));
    }

    Ok(edges)
}

/// Actors ranked by how many distinct posts they engaged with in `role`.
pub async fn top_actors(
    store: &Store,
    role: Role,
    limit: i64,
) -> Result<Vec<ActorActivity>, sqlx::Error> {
    let sql = match role {
        Role::Author => {
            r#"
            SELECT a.id AS actor_id, a.display_name, COUNT(p.id) AS posts
            FROM posts p
            JOIN actors a ON a.id = p.author_id
            GROUP BY a.id
            ORDER BY posts DESC, a.id ASC
            LIMIT ?
            "#
        }
        Role::Liker => {
            r#"
            SELECT a.id AS actor_id, a.display_name, COUNT(DISTINCT s.post_id) AS posts
            FROM snapshot_likers sl
            JOIN engagement_snapshots s ON s.id = sl.snapshot_id
            JOIN actors a ON a.id = sl.actor_id
            GROUP BY a.id
            ORDER BY posts DESC, a.id ASC
            LIMIT ?
            "#
        }
        Role::Commenter => {
            r#"
            SELECT a.id AS actor_id, a.display_name, COUNT(DISTINCT c.post_id) AS posts
            FROM comments c
            JOIN actors a ON a.id = c.author_id
            GROUP BY a.id
            ORDER BY posts DESC, a.id ASC
            LIMIT ?
            "#
        }
    };

    sqlx::query_as(sql)
        .bind(limit)
        .fetch_all(store.pool())
        .await
}

/// Identity conflicts still awaiting manual resolution.
pub async fn list_quarantine(store: &Store) -> Result<Vec<QuarantineEntry>, sqlx::Error> {
    let rows: Vec<QuarantineRow> = sqlx::query_as(
        r#"
        SELECT id, post_id, keyword, post_number, stored_author_id, incoming_author_id,
               raw_document, observed_ms, status
        FROM quarantine
        WHERE status = 'pending'
        ORDER BY id
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    Ok(rows.into_iter().map(QuarantineEntry::from).collect())
}

pub async fn list_review_flags(store: &Store) -> Result<Vec<ReviewFlag>, sqlx::Error> {
    let rows: Vec<ReviewFlagRow> = sqlx::query_as(
        r#"
        SELECT content_hash, post_id, other_post_id, reason, flagged_ms
        FROM review_flags
        ORDER BY flagged_ms, post_id
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    Ok(rows.into_iter().map(ReviewFlag::from).collect())
}
