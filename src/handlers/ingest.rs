use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    error::AppError,
    ingest::{ingest_document, upsert::UpsertStatus},
    query,
    store::Store,
};

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    /// Scrape time of the document (RFC 3339). Defaults to the time of the request.
    pub observed_at: Option<DateTime<Utc>>,
}

/// Ingest a single raw post document.
/// Returns 201 when the post is new, 200 otherwise.
pub async fn ingest_post(
    State(store): State<Store>,
    Query(params): Query<IngestParams>,
    Json(document): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let observed_at = params.observed_at.unwrap_or_else(Utc::now);

    let outcome = ingest_document(&store, &document, observed_at).await?;

    let status = match outcome.status {
        UpsertStatus::Inserted => StatusCode::CREATED,
        _ => StatusCode::OK,
    };

    Ok((status, Json(outcome)))
}

/// Identity conflicts awaiting manual resolution.
pub async fn list_quarantine(State(store): State<Store>) -> Result<impl IntoResponse, AppError> {
    let entries = query::list_quarantine(&store).await?;
    Ok(Json(entries))
}

/// Posts whose content also appears under another keyword.
pub async fn list_reviews(State(store): State<Store>) -> Result<impl IntoResponse, AppError> {
    let flags = query::list_review_flags(&store).await?;
    Ok(Json(flags))
}
