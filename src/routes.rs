// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{actors, ingest, posts},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (posts, actors, ingest).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Store, Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let post_routes = Router::new()
        .route("/", get(posts::list_posts))
        .route("/{keyword}/{post_number}", get(posts::get_post))
        .route(
            "/{keyword}/{post_number}/participants",
            get(posts::list_participants),
        )
        .route("/{keyword}/{post_number}/comments", get(posts::get_comments));

    let actor_routes = Router::new()
        .route("/top", get(actors::top_actors))
        .route("/{id}", get(actors::get_actor));

    Router::new()
        .nest("/api/posts", post_routes)
        .nest("/api/actors", actor_routes)
        .route("/api/graph", get(actors::interaction_graph))
        .route("/api/ingest", post(ingest::ingest_post))
        .route("/api/quarantine", get(ingest::list_quarantine))
        .route("/api/reviews", get(ingest::list_reviews))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
