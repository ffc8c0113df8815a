//! Batch ingestion with per-record isolation.
//!
//! A malformed document or an identity conflict only affects that document.
//! A store failure stops the batch: in-flight documents finish, the rest are
//! reported as not attempted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::ingest_document;
use super::upsert::UpsertOutcome;
use crate::error::{BatchAborted, IngestError};
use crate::store::Store;

/// One raw document waiting to be ingested.
#[derive(Debug, Clone)]
pub struct IncomingDocument {
    /// Where the document came from, for reporting (usually a file path).
    pub source: String,
    /// When the document was scraped.
    pub observed_at: DateTime<Utc>,
    /// Raw bytes, or why they could not be read.
    pub body: Result<Vec<u8>, String>,
}

impl IncomingDocument {
    pub fn new(source: impl Into<String>, observed_at: DateTime<Utc>, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            observed_at,
            body: Ok(raw.into()),
        }
    }

    /// A document that could not be read; reported as failed, never ingested.
    pub fn unreadable(source: impl Into<String>, observed_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            observed_at,
            body: Err(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommittedRecord {
    pub index: usize,
    pub source: String,
    pub outcome: UpsertOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub committed: Vec<CommittedRecord>,
    /// Malformed documents, skipped.
    pub skipped: Vec<RejectedRecord>,
    /// Identity conflicts, quarantined for manual resolution.
    pub conflicts: Vec<RejectedRecord>,
    /// Documents whose ingestion failed without committing.
    pub failed: Vec<RejectedRecord>,
    /// Documents never started because the batch was aborted.
    pub not_attempted: Vec<String>,
}

impl BatchReport {
    fn sort(&mut self) {
        self.committed.sort_by_key(|r| r.index);
        self.skipped.sort_by_key(|r| r.index);
        self.conflicts.sort_by_key(|r| r.index);
        self.failed.sort_by_key(|r| r.index);
    }
}

async fn ingest_raw(
    store: &Store,
    raw: &[u8],
    observed_at: DateTime<Utc>,
) -> Result<UpsertOutcome, IngestError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| IngestError::MalformedRecord(format!("invalid UTF-8: {e}")))?;
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| IngestError::MalformedRecord(format!("invalid JSON: {e}")))?;
    ingest_document(store, &value, observed_at).await
}

type TaskOutput = (usize, String, Result<UpsertOutcome, IngestError>);

struct Collector {
    report: BatchReport,
    sources: HashMap<tokio::task::Id, (usize, String)>,
    fatal: Option<String>,
}

impl Collector {
    fn record(&mut self, joined: Result<(tokio::task::Id, TaskOutput), tokio::task::JoinError>) {
        let (index, source, result) = match joined {
            Ok((id, output)) => {
                self.sources.remove(&id);
                output
            }
            Err(join_error) => {
                let (index, source) = self
                    .sources
                    .remove(&join_error.id())
                    .unwrap_or((usize::MAX, String::from("<unknown>")));
                tracing::error!("Ingestion task for {} failed: {}", source, join_error);
                self.report.failed.push(RejectedRecord {
                    index,
                    source,
                    reason: join_error.to_string(),
                });
                return;
            }
        };

        match result {
            Ok(outcome) => self.report.committed.push(CommittedRecord {
                index,
                source,
                outcome,
            }),
            Err(err @ IngestError::MalformedRecord(_)) => {
                tracing::warn!("Skipping {}: {}", source, err);
                self.report.skipped.push(RejectedRecord {
                    index,
                    source,
                    reason: err.to_string(),
                });
            }
            Err(err @ IngestError::IdentityConflict { .. }) => {
                self.report.conflicts.push(RejectedRecord {
                    index,
                    source,
                    reason: err.to_string(),
                });
            }
            Err(err @ IngestError::StoreUnavailable(_)) => {
                tracing::error!("Store failure while ingesting {}: {}", source, err);
                self.fatal.get_or_insert_with(|| err.to_string());
                self.report.failed.push(RejectedRecord {
                    index,
                    source,
                    reason: err.to_string(),
                });
            }
        }
    }
}

/// Ingest documents with at most `concurrency` in flight.
pub async fn ingest_batch(
    store: &Store,
    docs: Vec<IncomingDocument>,
    concurrency: usize,
) -> Result<BatchReport, BatchAborted> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
    let mut collector = Collector {
        report: BatchReport::default(),
        sources: HashMap::new(),
        fatal: None,
    };

    let total = docs.len();
    let mut pending = docs.into_iter().enumerate();

    for (index, doc) in pending.by_ref() {
        let permit = semaphore.clone().acquire_owned().await;

        while let Some(joined) = tasks.try_join_next_with_id() {
            collector.record(joined);
        }

        let IncomingDocument {
            source,
            observed_at,
            body,
        } = doc;

        let permit = match permit {
            Ok(permit) if collector.fatal.is_none() => permit,
            _ => {
                collector.report.not_attempted.push(source);
                break;
            }
        };

        let raw = match body {
            Ok(raw) => raw,
            Err(reason) => {
                tracing::warn!("Cannot read {}: {}", source, reason);
                collector.report.failed.push(RejectedRecord {
                    index,
                    source,
                    reason,
                });
                continue;
            }
        };

        let store = store.clone();
        let task_source = source.clone();
        let handle = tasks.spawn(async move {
            let _permit = permit;
            let result = ingest_raw(&store, &raw, observed_at).await;
            (index, task_source, result)
        });
        collector.sources.insert(handle.id(), (index, source));
    }

    collector
        .report
        .not_attempted
        .extend(pending.map(|(_, doc)| doc.source));

    while let Some(joined) = tasks.join_next_with_id().await {
        collector.record(joined);
    }

    let mut report = collector.report;
    report.sort();

    tracing::info!(
        "Batch of {} documents: {} committed, {} skipped, {} conflicts, {} failed, {} not attempted",
        total,
        report.committed.len(),
        report.skipped.len(),
        report.conflicts.len(),
        report.failed.len(),
        report.not_attempted.len()
    );

    match collector.fatal {
        Some(cause) => Err(BatchAborted { report, cause }),
        None => Ok(report),
    }
}

/// Read every `*.json` file of `dir`, one document per file, in file name order.
///
/// `observed_at` overrides the scrape time; otherwise each file's modification
/// time stands in for it, so re-running over unchanged files is a no-op.
/// Only a failure to list `dir` is an error; a file that cannot be read is
/// returned as an unreadable document and reported by the batch.
pub async fn load_directory(
    dir: &Path,
    observed_at: Option<DateTime<Utc>>,
) -> std::io::Result<Vec<IncomingDocument>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths: Vec<PathBuf> = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        // Symlinks and entries of unknown type are kept; reading them reports the problem
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        if !is_dir {
            paths.push(path);
        }
    }
    paths.sort();

    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let source = path.display().to_string();
        let fallback_at = observed_at.unwrap_or_default();

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                docs.push(IncomingDocument::unreadable(source, fallback_at, e.to_string()));
                continue;
            }
        };

        let observed_at = match observed_at {
            Some(at) => at,
            None => match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) => {
                    docs.push(IncomingDocument::unreadable(source, fallback_at, e.to_string()));
                    continue;
                }
            },
        };

        docs.push(IncomingDocument::new(source, observed_at, bytes));
    }

    tracing::info!("Loaded {} documents from {}", docs.len(), dir.display());
    Ok(docs)
}
