use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::post::{Post, PostCursorPosition, PostListParams, PostPage},
    query,
    store::Store,
};

/// List posts of a keyword, newest first.
/// Supports cursor-based pagination.
pub async fn list_posts(
    State(store): State<Store>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = params.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let limit = params.limit.unwrap_or(20); // Default 20, max 100

    let after = match params.cursor.as_deref() {
        Some(raw) => Some(
            PostCursorPosition::decode(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid cursor: {raw}")))?,
        ),
        None => None,
    };

    let (posts, next) = query::list_posts_page(&store, &params.keyword, after, limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list posts: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(PostPage {
        posts,
        next_cursor: next.map(|p| p.encode()),
    }))
}

async fn find_post(store: &Store, keyword: &str, post_number: i64) -> Result<Post, AppError> {
    query::get_post(store, keyword, post_number)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))
}

/// Get a single post with its latest engagement snapshot.
pub async fn get_post(
    State(store): State<Store>,
    Path((keyword, post_number)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let post = find_post(&store, &keyword, post_number).await?;
    let snapshot = query::latest_snapshot(&store, &post.id).await?;

    Ok(Json(serde_json::json!({
        "post": post,
        "latest_snapshot": snapshot,
    })))
}

/// Everyone who authored, liked or commented on a post.
pub async fn list_participants(
    State(store): State<Store>,
    Path((keyword, post_number)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let post = find_post(&store, &keyword, post_number).await?;
    let participants = query::list_participants(&store, &post.id).await?;

    Ok(Json(participants))
}

pub async fn get_comments(
    State(store): State<Store>,
    Path((keyword, post_number)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let post = find_post(&store, &keyword, post_number).await?;
    let tree = query::get_comment_tree(&store, &post.id).await?;

    Ok(Json(tree))
}
