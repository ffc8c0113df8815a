use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::AppError,
    models::{actor::ActorId, engagement::TopActorsParams},
    query,
    store::Store,
};

pub async fn get_actor(
    State(store): State<Store>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let actor = query::get_actor(&store, &ActorId(id))
        .await?
        .ok_or(AppError::NotFound("Actor not found".to_string()))?;

    Ok(Json(actor))
}

/// Rank actors by the number of distinct posts they engaged with.
pub async fn top_actors(
    State(store): State<Store>,
    Query(params): Query<TopActorsParams>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = params.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let limit = params.limit.unwrap_or(10);
    let ranking = query::top_actors(&store, params.role, limit).await?;

    Ok(Json(ranking))
}

#[derive(Debug, Deserialize, Validate)]
pub struct GraphParams {
    #[validate(length(min = 1, max = 200))]
    pub keyword: String,
}

/// Interaction graph of a keyword as a flat edge list.
pub async fn interaction_graph(
    State(store): State<Store>,
    Query(params): Query<GraphParams>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = params.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let edges = query::interaction_edges(&store, &params.keyword).await?;

    Ok(Json(edges))
}
