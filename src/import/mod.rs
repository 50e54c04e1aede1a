//! Bulk subscription import with bounded fan-out, and OPML export.
//!
//! Outlines are processed in fixed batches: every outline in a batch runs
//! concurrently and reports through a fan-in channel, batches run
//! sequentially, and no task outlives its batch. This bounds peak
//! concurrent connections against the remote while keeping most of the work
//! parallel. One bad outline never blocks the rest — its error is recorded
//! and the import moves on.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::api::NewsApi;
use crate::opml::{self, OpmlError, Outline};
use crate::storage::{Database, StorageError};
use crate::util::validate_url;

/// Outlines per batch; all of a batch's outlines are in flight at once.
const BATCH_SIZE: usize = 10;

// ============================================================================
// Error & Result Types
// ============================================================================

/// Errors that abort an import outright. Per-outline failures do not —
/// they accumulate in [`ImportResult::errors`] instead.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The document itself is unusable.
    #[error(transparent)]
    Opml(#[from] OpmlError),

    /// The local cache failed; corrupt storage is never worked around.
    #[error(transparent)]
    Cache(#[from] StorageError),
}

/// Aggregate outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub added: usize,
    pub updated: usize,
    pub failed: usize,
    /// One `"<url>: <reason>"` line per failed outline.
    pub errors: Vec<String>,
}

/// Live progress: `imported` counts completed outlines (whatever their
/// outcome) and never decreases; `total` is fixed after parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportProgress {
    pub imported: usize,
    pub total: usize,
}

enum ItemOutcome {
    Added,
    Updated,
}

enum ItemFailure {
    /// This outline failed; the import continues.
    Rejected(String),
    /// The cache failed; the import stops after the current batch drains.
    Cache(StorageError),
}

// ============================================================================
// Importer
// ============================================================================

pub struct Importer {
    db: Database,
    api: Arc<dyn NewsApi>,
    progress: watch::Sender<ImportProgress>,
}

impl Importer {
    pub fn new(db: Database, api: Arc<dyn NewsApi>) -> Self {
        let (progress, _) = watch::channel(ImportProgress::default());
        Self { db, api, progress }
    }

    /// Subscribe to live `(imported, total)` progress.
    pub fn progress(&self) -> watch::Receiver<ImportProgress> {
        self.progress.subscribe()
    }

    /// Import subscriptions from an OPML document.
    ///
    /// An outline whose canonical URL already exists in the cache only has
    /// its import-controlled preference fields merged (counted as
    /// `updated`); anything else is added via the remote. Failures are
    /// per-outline and recorded, never fatal — except a cache error, which
    /// aborts after the in-flight batch completes.
    pub async fn import_opml(&self, document: &str) -> Result<ImportResult, ImportError> {
        let outlines = opml::parse_opml(document)?;
        let total = outlines.len();
        let _ = self
            .progress
            .send_replace(ImportProgress { imported: 0, total });
        tracing::info!(outlines = total, "Starting bulk import");

        let mut result = ImportResult::default();
        let mut imported = 0usize;
        let mut cache_failure: Option<StorageError> = None;

        for batch in outlines.chunks(BATCH_SIZE) {
            let (tx, mut rx) = mpsc::channel(batch.len());
            let mut handles = Vec::with_capacity(batch.len());

            for outline in batch.iter().cloned() {
                let db = self.db.clone();
                let api = Arc::clone(&self.api);
                let tx = tx.clone();
                handles.push(tokio::spawn(async move {
                    let outcome = import_one(&db, api.as_ref(), &outline).await;
                    let _ = tx.send((outline.xml_url, outcome)).await;
                }));
            }
            drop(tx);

            // Fan-in: each completed outline lands here, ticking progress
            // per item rather than per batch.
            while let Some((url, outcome)) = rx.recv().await {
                match outcome {
                    Ok(ItemOutcome::Added) => result.added += 1,
                    Ok(ItemOutcome::Updated) => result.updated += 1,
                    Err(ItemFailure::Rejected(reason)) => {
                        tracing::warn!(url = %url, reason = %reason, "Outline import failed");
                        result.failed += 1;
                        result.errors.push(format!("{url}: {reason}"));
                    }
                    Err(ItemFailure::Cache(e)) => {
                        tracing::error!(url = %url, error = %e, "Cache failure during import");
                        cache_failure.get_or_insert(e);
                    }
                }
                imported += 1;
                let _ = self
                    .progress
                    .send_replace(ImportProgress { imported, total });
            }

            // A batch's tasks share its lifetime: every handle is awaited
            // before the next batch starts.
            for handle in handles {
                let _ = handle.await;
            }

            if let Some(e) = cache_failure.take() {
                return Err(ImportError::Cache(e));
            }
        }

        tracing::info!(
            added = result.added,
            updated = result.updated,
            failed = result.failed,
            "Bulk import finished"
        );
        Ok(result)
    }
}

async fn import_one(
    db: &Database,
    api: &dyn NewsApi,
    outline: &Outline,
) -> Result<ItemOutcome, ItemFailure> {
    if let Err(e) = validate_url(&outline.xml_url) {
        return Err(ItemFailure::Rejected(e.to_string()));
    }

    // Already subscribed: merge preferences only, never re-add.
    if let Some(feed) = db
        .find_feed_by_url(&outline.xml_url)
        .await
        .map_err(ItemFailure::Cache)?
    {
        db.update_feed_preferences(feed.id, &outline.prefs)
            .await
            .map_err(ItemFailure::Cache)?;
        return Ok(ItemOutcome::Updated);
    }

    let descriptor = api
        .add_feed(&outline.xml_url)
        .await
        .map_err(|e| ItemFailure::Rejected(e.to_string()))?;
    db.apply_remote_feed(&descriptor)
        .await
        .map_err(ItemFailure::Cache)?;
    db.update_feed_preferences(descriptor.id, &outline.prefs)
        .await
        .map_err(ItemFailure::Cache)?;
    Ok(ItemOutcome::Added)
}

/// Serialize the cached feeds to OPML. Read-only: no cache mutation.
pub async fn export_opml(db: &Database) -> Result<String, ImportError> {
    let feeds = db.all_feeds().await?;
    Ok(opml::export_opml(&feeds)?)
}
