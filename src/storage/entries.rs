use sqlx::QueryBuilder;

use crate::api::types::EntryDescriptor;

use super::schema::Database;
use super::types::{Entry, FlagChanges, SortOrder, StorageError};
use super::watch::Table;

impl Database {
    // ========================================================================
    // Remote Reconciliation
    // ========================================================================

    /// Apply one page of remote entries, committed as a single transaction.
    ///
    /// Content fields are remote-authoritative and always overwritten. Flags
    /// are adopted from the remote only when the row has no pending local
    /// edit (`read == synced_read`, same for bookmarked); a pending local
    /// value survives the pull untouched so an unpushed edit is never lost
    /// to a stale remote snapshot. Returns the number of rows written.
    pub async fn apply_remote_entries(
        &self,
        entries: &[EntryDescriptor],
    ) -> Result<usize, StorageError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO entries
                    (id, feed_id, title, published, summary, enclosure_link_type,
                     read, bookmarked, synced_read, synced_bookmarked)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    feed_id = excluded.feed_id,
                    title = excluded.title,
                    published = excluded.published,
                    summary = excluded.summary,
                    enclosure_link_type = excluded.enclosure_link_type,
                    read = CASE WHEN entries.read != entries.synced_read
                                THEN entries.read ELSE excluded.read END,
                    synced_read = CASE WHEN entries.read != entries.synced_read
                                       THEN entries.synced_read ELSE excluded.read END,
                    bookmarked = CASE WHEN entries.bookmarked != entries.synced_bookmarked
                                      THEN entries.bookmarked ELSE excluded.bookmarked END,
                    synced_bookmarked = CASE WHEN entries.bookmarked != entries.synced_bookmarked
                                             THEN entries.synced_bookmarked ELSE excluded.bookmarked END
            "#,
            )
            .bind(entry.id)
            .bind(entry.feed_id)
            .bind(&entry.title)
            .bind(entry.published)
            .bind(&entry.summary)
            .bind(&entry.enclosure_link_type)
            .bind(entry.read)
            .bind(entry.bookmarked)
            .bind(entry.read)
            .bind(entry.bookmarked)
            .execute(&mut *tx)
            .await?;

            if let Some(alternate) = &entry.alternate_link {
                sqlx::query("DELETE FROM links WHERE entry_id = ? AND rel = 'alternate'")
                    .bind(entry.id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("INSERT INTO links (entry_id, rel, href) VALUES (?, 'alternate', ?)")
                    .bind(entry.id)
                    .bind(alternate)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        self.notifier.notify(Table::Entries);
        Ok(entries.len())
    }

    // ========================================================================
    // Flag Operations
    // ========================================================================

    /// Mark an entry read or unread. Cache-first: takes effect immediately
    /// and offline; the difference against `synced_read` makes it pending.
    /// Returns false if no such entry exists.
    pub async fn set_read(&self, entry_id: i64, read: bool) -> Result<bool, StorageError> {
        let affected = sqlx::query("UPDATE entries SET read = ? WHERE id = ?")
            .bind(read)
            .bind(entry_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected > 0 {
            self.notifier.notify(Table::Entries);
        }
        Ok(affected > 0)
    }

    /// Mark or unmark an entry as bookmarked. Same semantics as [`set_read`].
    ///
    /// [`set_read`]: Database::set_read
    pub async fn set_bookmarked(
        &self,
        entry_id: i64,
        bookmarked: bool,
    ) -> Result<bool, StorageError> {
        let affected = sqlx::query("UPDATE entries SET bookmarked = ? WHERE id = ?")
            .bind(bookmarked)
            .bind(entry_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected > 0 {
            self.notifier.notify(Table::Entries);
        }
        Ok(affected > 0)
    }

    /// Mark every entry of one feed (or of the whole cache) read or unread.
    /// Each touched entry whose flag actually changed becomes pending, so
    /// the next flag push carries the whole batch. Returns the number of
    /// entries changed.
    pub async fn set_read_by_feed(
        &self,
        feed_id: Option<i64>,
        read: bool,
    ) -> Result<u64, StorageError> {
        let affected = match feed_id {
            Some(feed_id) => {
                sqlx::query("UPDATE entries SET read = ? WHERE feed_id = ? AND read != ?")
                    .bind(read)
                    .bind(feed_id)
                    .bind(read)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            None => {
                sqlx::query("UPDATE entries SET read = ? WHERE read != ?")
                    .bind(read)
                    .bind(read)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
        };
        if affected > 0 {
            self.notifier.notify(Table::Entries);
        }
        Ok(affected)
    }

    /// Recompute the set of flag deltas not yet confirmed by the remote.
    ///
    /// Derived entirely from entry state, so it survives interruption and
    /// coalesces rapid edits: whatever the flags are *now* is what gets
    /// pushed, once.
    pub async fn pending_flags(&self) -> Result<FlagChanges, StorageError> {
        let rows: Vec<(i64, bool, bool, bool, bool)> = sqlx::query_as(
            r#"
            SELECT id, read, bookmarked, synced_read, synced_bookmarked
            FROM entries
            WHERE read != synced_read OR bookmarked != synced_bookmarked
            ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut changes = FlagChanges::default();
        for (id, read, bookmarked, synced_read, synced_bookmarked) in rows {
            if read != synced_read {
                if read {
                    changes.read.push(id);
                } else {
                    changes.unread.push(id);
                }
            }
            if bookmarked != synced_bookmarked {
                if bookmarked {
                    changes.bookmarked.push(id);
                } else {
                    changes.unbookmarked.push(id);
                }
            }
        }
        Ok(changes)
    }

    /// Record that exactly the flag values in `pushed` were acknowledged by
    /// the remote. Sets the synced markers to the *pushed* values, not the
    /// current ones — an edit made while the push was in flight stays
    /// pending and goes out on the next push.
    pub async fn confirm_flags_pushed(&self, pushed: &FlagChanges) -> Result<(), StorageError> {
        if pushed.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for (ids, column, value) in [
            (&pushed.read, "synced_read", true),
            (&pushed.unread, "synced_read", false),
            (&pushed.bookmarked, "synced_bookmarked", true),
            (&pushed.unbookmarked, "synced_bookmarked", false),
        ] {
            if ids.is_empty() {
                continue;
            }
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new(format!("UPDATE entries SET {column} = "));
            builder.push_bind(value);
            builder.push(" WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        self.notifier.notify(Table::Entries);
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_entry(&self, id: i64) -> Result<Option<Entry>, StorageError> {
        let entry = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, feed_id, title, published, summary, enclosure_link_type,
                   read, bookmarked, synced_read, synced_bookmarked
            FROM entries WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn entries_for_feed(&self, feed_id: i64) -> Result<Vec<Entry>, StorageError> {
        let entries = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, feed_id, title, published, summary, enclosure_link_type,
                   read, bookmarked, synced_read, synced_bookmarked
            FROM entries WHERE feed_id = ?
            ORDER BY published DESC, id DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// All entries honoring the display preferences: read entries can be
    /// filtered out and the sort order flipped.
    pub async fn entries_for_display(
        &self,
        show_read: bool,
        sort: SortOrder,
    ) -> Result<Vec<Entry>, StorageError> {
        let order = match sort {
            SortOrder::NewestFirst => "published DESC, id DESC",
            SortOrder::OldestFirst => "published ASC, id ASC",
        };
        let filter = if show_read { "1 = 1" } else { "read = 0" };
        let sql = format!(
            r#"
            SELECT id, feed_id, title, published, summary, enclosure_link_type,
                   read, bookmarked, synced_read, synced_bookmarked
            FROM entries WHERE {filter}
            ORDER BY {order}
        "#
        );
        let entries = sqlx::query_as::<_, Entry>(&sql).fetch_all(&self.pool).await?;
        Ok(entries)
    }

    pub async fn count_entries(&self) -> Result<i64, StorageError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn count_unread(&self) -> Result<i64, StorageError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries WHERE read = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
