// src/ingest/mod.rs

pub mod batch;
pub mod locks;
pub mod parser;
pub mod resolver;
pub mod timestamp;
pub mod upsert;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::Store;
use upsert::UpsertOutcome;

/// Parse, resolve and merge one raw document scraped at `observed_at`.
pub async fn ingest_document(
    store: &Store,
    raw: &serde_json::Value,
    observed_at: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let parsed = parser::parse_post(raw)?;
    let resolved = resolver::resolve_post(parsed);
    upsert::upsert_post(store, &resolved, observed_at, raw).await
}
