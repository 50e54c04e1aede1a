//! The sync and reconciliation engine.
//!
//! Orchestrates initial sync, incremental sync, and flag-only sync against
//! the active transport. The engine is deliberately stateless between calls:
//! all progress lives in the cache (the watermark, the `synced_*` flag
//! markers, the `initial_sync_completed` bit), so any operation can be
//! interrupted at any await point and re-run safely.

pub mod job;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;

use crate::api::{ApiError, EntryDescriptor, EntryQuery, NewsApi};
use crate::storage::{Database, StorageError};

/// Entries are pulled in bounded pages during initial sync so the full
/// remote dataset is never buffered in memory.
const PAGE_SIZE: u32 = 100;

// ============================================================================
// Error Types
// ============================================================================

/// A failed sync step. Remote failures may be worth retrying; cache
/// failures indicate corrupt local storage and never are.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Cache(#[from] StorageError),
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Api(e) => e.is_transient(),
            SyncError::Cache(_) => false,
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    InitialSync,
    Incremental,
}

/// Live progress published on a watch channel; `entries_synced` counts
/// committed entries during initial sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub entries_synced: usize,
}

/// Cache counters reported by [`SyncEngine::status`].
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub feeds: i64,
    pub entries: i64,
    pub unread: i64,
    pub pending_flags: usize,
    pub initial_sync_completed: bool,
    pub last_sync: i64,
}

// ============================================================================
// Sync Engine
// ============================================================================

pub struct SyncEngine {
    db: Database,
    api: Arc<dyn NewsApi>,
    progress: watch::Sender<SyncProgress>,
}

impl SyncEngine {
    pub fn new(db: Database, api: Arc<dyn NewsApi>) -> Self {
        let (progress, _) = watch::channel(SyncProgress::default());
        Self { db, api, progress }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Subscribe to live sync progress.
    pub fn progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    fn set_progress(&self, phase: SyncPhase, entries_synced: usize) {
        let _ = self.progress.send_replace(SyncProgress {
            phase,
            entries_synced,
        });
    }

    // ========================================================================
    // Initial Sync
    // ========================================================================

    /// Pull the full remote snapshot into an empty (or partially filled)
    /// cache. Idempotent: each page commits as it arrives, and a re-run
    /// after interruption upserts over the committed prefix instead of
    /// duplicating it. `initial_sync_completed` is written last, so the
    /// flag being true guarantees the dataset write finished.
    pub async fn perform_initial_sync(&self) -> Result<(), SyncError> {
        let conf = self.db.conf().await?;
        if conf.initial_sync_completed {
            tracing::debug!("Initial sync already completed, nothing to do");
            return Ok(());
        }

        self.set_progress(SyncPhase::InitialSync, 0);
        let result = self.initial_sync_inner().await;
        self.set_progress(SyncPhase::Idle, 0);
        result
    }

    async fn initial_sync_inner(&self) -> Result<(), SyncError> {
        // Watermark taken before the pull: entries published while the sync
        // runs fall into the next incremental window instead of a gap.
        let started = Utc::now().timestamp();

        let feeds = self.api.list_feeds().await?;
        for feed in &feeds {
            self.db.apply_remote_feed(feed).await?;
        }
        tracing::info!(feeds = feeds.len(), "Initial sync: feed list stored");

        let mut offset = 0u64;
        let mut synced = 0usize;
        loop {
            let page = self
                .api
                .list_entries(EntryQuery::page(offset, PAGE_SIZE))
                .await?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len();
            self.db.apply_remote_entries(&page).await?;
            self.record_enclosures(&page).await?;

            synced += fetched;
            offset += fetched as u64;
            self.set_progress(SyncPhase::InitialSync, synced);
            tracing::debug!(entries = synced, "Initial sync: page committed");

            if fetched < PAGE_SIZE as usize {
                break;
            }
        }

        self.db.complete_initial_sync(started).await?;
        tracing::info!(entries = synced, "Initial sync completed");
        Ok(())
    }

    // ========================================================================
    // Incremental Sync
    // ========================================================================

    /// One incremental sync pass: push flags, pull feeds, pull entries,
    /// record enclosures, advance the watermark. Steps run strictly in that
    /// order — a local flag must reach the remote before a pull could echo
    /// a stale value back. A failure in step N leaves steps 1..N-1
    /// committed; nothing is rolled back (best-effort forward).
    pub async fn sync(&self) -> Result<(), SyncError> {
        if !self.api.is_remote() {
            tracing::debug!("Standalone mode, sync is a no-op");
            return Ok(());
        }

        self.set_progress(SyncPhase::Incremental, 0);
        let result = self.sync_inner().await;
        self.set_progress(SyncPhase::Idle, 0);
        result
    }

    async fn sync_inner(&self) -> Result<(), SyncError> {
        // Step 1: push local flag deltas.
        self.push_pending_flags().await?;

        let started = Utc::now().timestamp();
        let conf = self.db.conf().await?;

        // Step 2: reconcile the feed list by id. New feeds insert, missing
        // feeds delete with cascade, known feeds take remote content while
        // keeping local preferences.
        let feeds = self.api.list_feeds().await?;
        for feed in &feeds {
            self.db.apply_remote_feed(feed).await?;
        }
        let remote_ids: Vec<i64> = feeds.iter().map(|f| f.id).collect();
        let removed = self.db.delete_feeds_not_in(&remote_ids).await?;
        if removed > 0 {
            tracing::info!(removed, "Feeds removed during reconcile");
        }

        // Step 3: pull entries changed since the watermark.
        let entries = self
            .api
            .list_entries(EntryQuery::since(conf.last_sync))
            .await?;
        self.db.apply_remote_entries(&entries).await?;

        // Step 4: enclosure references for newly seen entries.
        self.record_enclosures(&entries).await?;

        self.db.set_last_sync(started).await?;
        tracing::debug!(entries = entries.len(), "Incremental sync finished");
        Ok(())
    }

    /// Push-only sync used after single-entry flag edits so the UI never
    /// waits on a full pull. The pending set is recomputed from the cache at
    /// call time, which coalesces rapid edits into one delta per entry; an
    /// empty set performs no network call at all.
    pub async fn sync_entry_flags(&self) -> Result<(), SyncError> {
        self.push_pending_flags().await
    }

    async fn push_pending_flags(&self) -> Result<(), SyncError> {
        let pending = self.db.pending_flags().await?;
        if pending.is_empty() {
            return Ok(());
        }
        tracing::debug!(flags = pending.len(), "Pushing flag changes");
        self.api.push_flags(&pending).await?;
        // Markers record the pushed values; edits made during the push stay
        // pending for the next call.
        self.db.confirm_flags_pushed(&pending).await?;
        Ok(())
    }

    async fn record_enclosures(&self, entries: &[EntryDescriptor]) -> Result<(), SyncError> {
        for entry in entries {
            if let Some(href) = &entry.enclosure_link {
                self.db.record_enclosure(entry.id, href).await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Intents
    // ========================================================================

    /// Subscribe to a feed via the remote and cache its descriptor.
    /// Returns the feed id.
    pub async fn add_feed(&self, url: &str) -> Result<i64, SyncError> {
        let descriptor = self.api.add_feed(url).await?;
        self.db.apply_remote_feed(&descriptor).await?;
        tracing::info!(feed_id = descriptor.id, url = url, "Feed added");
        Ok(descriptor.id)
    }

    /// Rename a feed remotely, then locally.
    pub async fn rename_feed(&self, feed_id: i64, title: &str) -> Result<(), SyncError> {
        self.api.rename_feed(feed_id, title).await?;
        self.db.rename_feed(feed_id, title).await?;
        Ok(())
    }

    /// Delete a feed remotely, then locally (cascades to entries, links,
    /// enclosures).
    pub async fn delete_feed(&self, feed_id: i64) -> Result<(), SyncError> {
        self.api.delete_feed(feed_id).await?;
        self.db.delete_feed(feed_id).await?;
        Ok(())
    }

    /// Mark an entry read/unread. Cache-first: the write is immediate and
    /// offline-safe; the follow-up push is opportunistic and a failure just
    /// leaves the flag pending for the next sync.
    pub async fn mark_read(&self, entry_id: i64, read: bool) -> Result<(), SyncError> {
        self.db.set_read(entry_id, read).await?;
        if let Err(e) = self.sync_entry_flags().await {
            tracing::debug!(entry_id, error = %e, "Flag push deferred");
        }
        Ok(())
    }

    /// Bookmark or unbookmark an entry. Same semantics as [`mark_read`].
    ///
    /// [`mark_read`]: SyncEngine::mark_read
    pub async fn mark_bookmarked(&self, entry_id: i64, bookmarked: bool) -> Result<(), SyncError> {
        self.db.set_bookmarked(entry_id, bookmarked).await?;
        if let Err(e) = self.sync_entry_flags().await {
            tracing::debug!(entry_id, error = %e, "Flag push deferred");
        }
        Ok(())
    }

    /// Mark every entry of a feed — or the whole cache — read. The batch
    /// becomes pending as one delta and goes out on the next flag push.
    pub async fn mark_feed_read(&self, feed_id: Option<i64>) -> Result<u64, SyncError> {
        let changed = self.db.set_read_by_feed(feed_id, true).await?;
        if changed > 0 {
            if let Err(e) = self.sync_entry_flags().await {
                tracing::debug!(error = %e, "Flag push deferred");
            }
        }
        Ok(changed)
    }

    /// Cache counters for the status report.
    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let conf = self.db.conf().await?;
        Ok(SyncStatus {
            feeds: self.db.count_feeds().await?,
            entries: self.db.count_entries().await?,
            unread: self.db.count_unread().await?,
            pending_flags: self.db.pending_flags().await?.len(),
            initial_sync_completed: conf.initial_sync_completed,
            last_sync: conf.last_sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::FeedDescriptor;
    use crate::storage::FlagChanges;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted in-memory remote. `entry_calls_before_failure` makes
    /// `list_entries` fail after N successful calls to simulate an
    /// interrupted initial sync.
    struct FakeApi {
        feeds: Mutex<Vec<FeedDescriptor>>,
        entries: Mutex<Vec<EntryDescriptor>>,
        pushed: Mutex<Vec<FlagChanges>>,
        entry_calls: AtomicUsize,
        entry_calls_before_failure: Option<usize>,
        fail_push: bool,
    }

    impl FakeApi {
        fn new(feeds: Vec<FeedDescriptor>, entries: Vec<EntryDescriptor>) -> Self {
            Self {
                feeds: Mutex::new(feeds),
                entries: Mutex::new(entries),
                pushed: Mutex::new(Vec::new()),
                entry_calls: AtomicUsize::new(0),
                entry_calls_before_failure: None,
                fail_push: false,
            }
        }

        fn failing_entries_after(mut self, calls: usize) -> Self {
            self.entry_calls_before_failure = Some(calls);
            self
        }

        fn failing_push(mut self) -> Self {
            self.fail_push = true;
            self
        }
    }

    #[async_trait]
    impl NewsApi for FakeApi {
        async fn list_feeds(&self) -> Result<Vec<FeedDescriptor>, ApiError> {
            Ok(self.feeds.lock().unwrap().clone())
        }

        async fn list_entries(
            &self,
            query: EntryQuery,
        ) -> Result<Vec<EntryDescriptor>, ApiError> {
            let call = self.entry_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.entry_calls_before_failure {
                if call >= limit {
                    return Err(ApiError::Timeout);
                }
            }
            let entries = self.entries.lock().unwrap();
            if let Some(since) = query.since {
                return Ok(entries
                    .iter()
                    .filter(|e| e.published.unwrap_or(0) > since)
                    .cloned()
                    .collect());
            }
            let offset = query.offset.unwrap_or(0) as usize;
            let limit = query.limit.unwrap_or(u32::MAX) as usize;
            Ok(entries.iter().skip(offset).take(limit).cloned().collect())
        }

        async fn push_flags(&self, changes: &FlagChanges) -> Result<(), ApiError> {
            if self.fail_push {
                return Err(ApiError::Timeout);
            }
            // Idempotent upsert, like a real server: pushed flags become
            // remote truth and echo back on later pulls.
            let mut entries = self.entries.lock().unwrap();
            for entry in entries.iter_mut() {
                if changes.read.contains(&entry.id) {
                    entry.read = true;
                }
                if changes.unread.contains(&entry.id) {
                    entry.read = false;
                }
                if changes.bookmarked.contains(&entry.id) {
                    entry.bookmarked = true;
                }
                if changes.unbookmarked.contains(&entry.id) {
                    entry.bookmarked = false;
                }
            }
            self.pushed.lock().unwrap().push(changes.clone());
            Ok(())
        }

        async fn add_feed(&self, url: &str) -> Result<FeedDescriptor, ApiError> {
            Ok(FeedDescriptor {
                id: 777,
                title: url.to_string(),
                self_link: url.to_string(),
                alternate_link: None,
            })
        }

        async fn rename_feed(&self, _feed_id: i64, _title: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn delete_feed(&self, _feed_id: i64) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn feed(id: i64) -> FeedDescriptor {
        FeedDescriptor {
            id,
            title: format!("Feed {id}"),
            self_link: format!("https://feed{id}.example.com/rss"),
            alternate_link: None,
        }
    }

    fn entry(id: i64, feed_id: i64) -> EntryDescriptor {
        EntryDescriptor {
            id,
            feed_id,
            title: format!("Entry {id}"),
            published: Some(1700000000 + id),
            summary: None,
            read: false,
            bookmarked: false,
            alternate_link: None,
            enclosure_link: None,
            enclosure_link_type: None,
        }
    }

    async fn engine_with(api: FakeApi) -> (SyncEngine, Arc<FakeApi>) {
        let db = Database::open(":memory:").await.unwrap();
        let api = Arc::new(api);
        (SyncEngine::new(db, api.clone()), api)
    }

    #[tokio::test]
    async fn initial_sync_pages_and_sets_flag_last() {
        let entries: Vec<_> = (1..=250).map(|i| entry(i, 1)).collect();
        let (engine, _) = engine_with(FakeApi::new(vec![feed(1)], entries)).await;

        engine.perform_initial_sync().await.unwrap();

        let status = engine.status().await.unwrap();
        assert_eq!(status.entries, 250);
        assert!(status.initial_sync_completed);
    }

    #[tokio::test]
    async fn interrupted_initial_sync_keeps_flag_false_and_resumes() {
        let entries: Vec<_> = (1..=250).map(|i| entry(i, 1)).collect();
        // First run dies after two entry pages (200 entries committed).
        let (engine, _) =
            engine_with(FakeApi::new(vec![feed(1)], entries.clone()).failing_entries_after(2))
                .await;

        let err = engine.perform_initial_sync().await.unwrap_err();
        assert!(err.is_transient());

        let status = engine.status().await.unwrap();
        assert!(!status.initial_sync_completed);
        assert_eq!(status.entries, 200, "committed prefix survives");

        // Resume against the same cache with a healthy remote.
        let resumed = SyncEngine::new(
            engine.database().clone(),
            Arc::new(FakeApi::new(vec![feed(1)], entries)),
        );
        resumed.perform_initial_sync().await.unwrap();

        let status = resumed.status().await.unwrap();
        assert!(status.initial_sync_completed);
        assert_eq!(status.entries, 250, "no duplicates after resume");
    }

    #[tokio::test]
    async fn second_initial_sync_is_a_no_op() {
        let (engine, _) = engine_with(FakeApi::new(vec![feed(1)], vec![entry(1, 1)])).await;
        engine.perform_initial_sync().await.unwrap();
        engine.perform_initial_sync().await.unwrap();
        assert_eq!(engine.status().await.unwrap().entries, 1);
    }

    #[tokio::test]
    async fn sync_pushes_local_flag_before_pull_so_local_edit_wins() {
        // Published far in the future so the incremental pull re-delivers
        // this entry after the push — the adversarial interleaving.
        let mut concurrent = entry(1, 1);
        concurrent.published = Some(4102444800);
        concurrent.read = false; // remote still believes unread
        let (engine, api) = engine_with(FakeApi::new(vec![feed(1)], vec![concurrent])).await;

        engine.perform_initial_sync().await.unwrap();
        engine.database().set_read(1, true).await.unwrap();

        engine.sync().await.unwrap();

        // The push delivered the local edit to the remote...
        let pushed = api.pushed.lock().unwrap().clone();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].read, vec![1]);
        let remote_read = api.entries.lock().unwrap()[0].read;
        assert!(remote_read, "remote state must equal the local edit");

        // ...and the pull that followed echoed it back consistently.
        let e = engine.database().get_entry(1).await.unwrap().unwrap();
        assert!(e.read);
        assert_eq!(engine.status().await.unwrap().pending_flags, 0);
    }

    #[tokio::test]
    async fn failed_push_retains_flag_for_next_sync() {
        let (engine, _) =
            engine_with(FakeApi::new(vec![feed(1)], vec![entry(1, 1)]).failing_push()).await;
        engine.perform_initial_sync().await.unwrap();
        engine.database().set_read(1, true).await.unwrap();

        let err = engine.sync_entry_flags().await.unwrap_err();
        assert!(err.is_transient());

        // No data loss: flag still set locally, still pending.
        let e = engine.database().get_entry(1).await.unwrap().unwrap();
        assert!(e.read);
        assert_eq!(engine.status().await.unwrap().pending_flags, 1);
    }

    #[tokio::test]
    async fn flag_only_sync_skips_network_when_nothing_pending() {
        // A failing push transport proves no call happens for an empty set.
        let (engine, _) =
            engine_with(FakeApi::new(vec![feed(1)], vec![entry(1, 1)]).failing_push()).await;
        engine.perform_initial_sync().await.unwrap();

        engine.sync_entry_flags().await.unwrap();
    }

    #[tokio::test]
    async fn sync_reconciles_removed_feeds_with_cascade() {
        let api = FakeApi::new(vec![feed(1), feed(2)], vec![entry(1, 1), entry(2, 2)]);
        let (engine, _) = engine_with(api).await;
        engine.perform_initial_sync().await.unwrap();

        // Remote now lists only feed 2.
        let api2 = FakeApi::new(vec![feed(2)], vec![]);
        let engine2 = SyncEngine::new(engine.database().clone(), Arc::new(api2));
        engine2.sync().await.unwrap();

        assert_eq!(engine2.status().await.unwrap().feeds, 1);
        assert!(engine2.database().get_entry(1).await.unwrap().is_none());
        assert!(engine2.database().get_entry(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_entry_pull_keeps_earlier_steps_and_watermark() {
        let (engine, _) = engine_with(FakeApi::new(vec![feed(1)], vec![])).await;
        engine.perform_initial_sync().await.unwrap();
        let watermark = engine.status().await.unwrap().last_sync;

        // Feed list succeeds (1 call budget is irrelevant there), entry pull
        // fails on the first call of this engine.
        let api = FakeApi::new(vec![feed(1), feed(3)], vec![]).failing_entries_after(0);
        let engine2 = SyncEngine::new(engine.database().clone(), Arc::new(api));

        let err = engine2.sync().await.unwrap_err();
        assert!(err.is_transient());

        // Step 2 committed: feed 3 arrived. Watermark untouched.
        assert_eq!(engine2.status().await.unwrap().feeds, 2);
        assert_eq!(engine2.status().await.unwrap().last_sync, watermark);
    }

    #[tokio::test]
    async fn enclosures_recorded_for_new_entries() {
        let mut e = entry(5, 1);
        e.enclosure_link = Some("https://pod.example.com/5.mp3".to_string());
        e.enclosure_link_type = Some("audio/mpeg".to_string());
        let (engine, _) = engine_with(FakeApi::new(vec![feed(1)], vec![e])).await;

        engine.perform_initial_sync().await.unwrap();

        let enc = engine.database().enclosure(5).await.unwrap().unwrap();
        assert_eq!(enc.href, "https://pod.example.com/5.mp3");
        assert_eq!(enc.download_progress, 0);
    }
}
