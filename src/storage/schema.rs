use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StorageError;
use super::watch::ChangeNotifier;

// ============================================================================
// Database
// ============================================================================

/// Handle to the local cache: a SQLite pool plus the change notifier that
/// backs reactive subscriptions. Cheap to clone; all clones share both.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    pub(crate) notifier: ChangeNotifier,
}

impl Database {
    /// Open the cache and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InstanceLocked` if another lede process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `StorageError::Migration` if the schema could not be created.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to
        // release before returning SQLITE_BUSY, absorbing transient
        // contention between a foreground intent and a background sync job.
        // Both pragmas are per-connection, so they ride on the connect
        // options and apply to every connection the pool opens.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StorageError::from_sqlx)?
            .pragma("foreign_keys", "ON")
            .pragma("busy_timeout", "5000");

        // SQLite is single-writer; 5 connections covers peak concurrent
        // readers (sync pull + subscriptions + CLI queries). An in-memory
        // database exists per connection, so it gets exactly one.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StorageError::from_sqlx)?;

        let db = Self {
            pool,
            notifier: ChangeNotifier::new(),
        };
        db.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                StorageError::InstanceLocked
            } else {
                StorageError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Access the change notifier for reactive subscriptions.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Run migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS` / `OR IGNORE`, so re-running on an
    /// existing database is a no-op. If any step fails the transaction rolls
    /// back and the previous schema remains intact.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                self_link TEXT NOT NULL UNIQUE,
                alternate_link TEXT,
                open_entries_in_browser INTEGER NOT NULL DEFAULT 0,
                blocked_words TEXT,
                show_preview_images INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                published INTEGER,
                summary TEXT,
                enclosure_link_type TEXT,
                read INTEGER NOT NULL DEFAULT 0,
                bookmarked INTEGER NOT NULL DEFAULT 0,
                synced_read INTEGER NOT NULL DEFAULT 0,
                synced_bookmarked INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                feed_id INTEGER REFERENCES feeds(id) ON DELETE CASCADE,
                entry_id INTEGER REFERENCES entries(id) ON DELETE CASCADE,
                rel TEXT NOT NULL CHECK (rel IN ('self', 'alternate')),
                href TEXT NOT NULL,
                CHECK ((feed_id IS NULL) != (entry_id IS NULL))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS enclosures (
                entry_id INTEGER PRIMARY KEY REFERENCES entries(id) ON DELETE CASCADE,
                href TEXT NOT NULL,
                cache_uri TEXT,
                download_progress INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conf (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                initial_sync_completed INTEGER NOT NULL DEFAULT 0,
                last_sync INTEGER NOT NULL DEFAULT 0,
                sort_order TEXT NOT NULL DEFAULT 'newest_first',
                show_read_entries INTEGER NOT NULL DEFAULT 1,
                sync_on_startup INTEGER NOT NULL DEFAULT 1,
                show_preview_images INTEGER NOT NULL DEFAULT 1,
                show_preview_text INTEGER NOT NULL DEFAULT 1,
                crop_preview_images INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // The singleton row exists from the start so readers never need an
        // insert-if-missing path.
        sqlx::query("INSERT OR IGNORE INTO conf (id) VALUES (1)")
            .execute(&mut *tx)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_feed ON entries(feed_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_published ON entries(published DESC)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_read ON entries(read)")
            .execute(&mut *tx)
            .await?;
        // Pending flag deltas are recomputed from this difference on every push
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_pending
             ON entries(id) WHERE read != synced_read OR bookmarked != synced_bookmarked",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_feed ON links(feed_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_entry ON links(entry_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
