use sqlx::QueryBuilder;

use crate::api::types::FeedDescriptor;
use crate::util::canonical_url;

use super::schema::Database;
use super::types::{Feed, FeedPreferences, Link, StorageError};
use super::watch::Table;

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Apply one remote feed descriptor: insert it, or overwrite the content
    /// fields of the existing row. Local preference fields are never touched
    /// by a remote pull. Link rows are rewritten to match the descriptor.
    pub async fn apply_remote_feed(&self, feed: &FeedDescriptor) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO feeds (id, title, self_link, alternate_link)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                self_link = excluded.self_link,
                alternate_link = excluded.alternate_link
        "#,
        )
        .bind(feed.id)
        .bind(&feed.title)
        .bind(&feed.self_link)
        .bind(&feed.alternate_link)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM links WHERE feed_id = ?")
            .bind(feed.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO links (feed_id, rel, href) VALUES (?, 'self', ?)")
            .bind(feed.id)
            .bind(&feed.self_link)
            .execute(&mut *tx)
            .await?;
        if let Some(alternate) = &feed.alternate_link {
            sqlx::query("INSERT INTO links (feed_id, rel, href) VALUES (?, 'alternate', ?)")
                .bind(feed.id)
                .bind(alternate)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.notifier.notify(Table::Feeds);
        Ok(())
    }

    /// Delete every feed whose id is absent from `remote_ids`, cascading to
    /// its entries, links, and enclosures. Returns the number of feeds
    /// removed. Called during reconcile: a feed the remote no longer lists
    /// is gone.
    pub async fn delete_feeds_not_in(&self, remote_ids: &[i64]) -> Result<u64, StorageError> {
        let removed = if remote_ids.is_empty() {
            sqlx::query("DELETE FROM feeds")
                .execute(&self.pool)
                .await?
                .rows_affected()
        } else {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("DELETE FROM feeds WHERE id NOT IN (");
            let mut separated = builder.separated(", ");
            for id in remote_ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            builder.build().execute(&self.pool).await?.rows_affected()
        };

        if removed > 0 {
            self.notifier.notify(Table::Feeds);
            self.notifier.notify(Table::Entries);
        }
        Ok(removed)
    }

    /// Delete one feed (cascades to entries, links, enclosures).
    /// Returns false if no such feed existed.
    pub async fn delete_feed(&self, id: i64) -> Result<bool, StorageError> {
        let affected = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected > 0 {
            self.notifier.notify(Table::Feeds);
            self.notifier.notify(Table::Entries);
        }
        Ok(affected > 0)
    }

    /// Rename a feed locally (the engine pushes the rename to the remote
    /// before calling this).
    pub async fn rename_feed(&self, id: i64, title: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE feeds SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.notifier.notify(Table::Feeds);
        Ok(())
    }

    /// Merge import-controlled preference fields into a feed. `None` fields
    /// are left as they are — an OPML outline that omits an attribute must
    /// not reset a locally chosen preference.
    pub async fn update_feed_preferences(
        &self,
        id: i64,
        prefs: &FeedPreferences,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE feeds SET
                open_entries_in_browser = COALESCE(?, open_entries_in_browser),
                blocked_words = COALESCE(?, blocked_words),
                show_preview_images = COALESCE(?, show_preview_images)
            WHERE id = ?
        "#,
        )
        .bind(prefs.open_entries_in_browser)
        .bind(&prefs.blocked_words)
        .bind(prefs.show_preview_images)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.notifier.notify(Table::Feeds);
        Ok(())
    }

    pub async fn get_feed(&self, id: i64) -> Result<Option<Feed>, StorageError> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, title, self_link, alternate_link,
                   open_entries_in_browser, blocked_words, show_preview_images
            FROM feeds WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Find a feed whose self link matches `url` in canonical form. Feed
    /// counts are small, so the comparison happens in Rust rather than in a
    /// normalized SQL column.
    pub async fn find_feed_by_url(&self, url: &str) -> Result<Option<Feed>, StorageError> {
        let wanted = canonical_url(url);
        let feeds = self.all_feeds().await?;
        Ok(feeds
            .into_iter()
            .find(|f| canonical_url(&f.self_link) == wanted))
    }

    pub async fn all_feeds(&self) -> Result<Vec<Feed>, StorageError> {
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, title, self_link, alternate_link,
                   open_entries_in_browser, blocked_words, show_preview_images
            FROM feeds ORDER BY title
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn count_feeds(&self) -> Result<i64, StorageError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // ========================================================================
    // Link Operations
    // ========================================================================

    pub async fn links_for_feed(&self, feed_id: i64) -> Result<Vec<Link>, StorageError> {
        let links = sqlx::query_as::<_, Link>(
            "SELECT id, feed_id, entry_id, rel, href FROM links WHERE feed_id = ? ORDER BY rel",
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    pub async fn links_for_entry(&self, entry_id: i64) -> Result<Vec<Link>, StorageError> {
        let links = sqlx::query_as::<_, Link>(
            "SELECT id, feed_id, entry_id, rel, href FROM links WHERE entry_id = ? ORDER BY rel",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }
}
