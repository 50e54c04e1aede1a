use super::schema::Database;
use super::types::{Enclosure, StorageError};
use super::watch::Table;

impl Database {
    // ========================================================================
    // Enclosure Operations
    // ========================================================================

    /// Record an enclosure reference discovered during sync. Existing state
    /// (download progress, cache location) is preserved; only the href is
    /// refreshed.
    pub async fn record_enclosure(&self, entry_id: i64, href: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO enclosures (entry_id, href)
            VALUES (?, ?)
            ON CONFLICT(entry_id) DO UPDATE SET href = excluded.href
        "#,
        )
        .bind(entry_id)
        .bind(href)
        .execute(&self.pool)
        .await?;
        self.notifier.notify(Table::Enclosures);
        Ok(())
    }

    /// Reset download state to zero progress for a fresh download attempt.
    pub async fn begin_enclosure_download(&self, entry_id: i64) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE enclosures SET download_progress = 0, cache_uri = NULL WHERE entry_id = ?",
        )
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        self.notifier.notify(Table::Enclosures);
        Ok(())
    }

    /// Update download progress (0..=100).
    pub async fn set_enclosure_progress(
        &self,
        entry_id: i64,
        progress: i64,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE enclosures SET download_progress = ? WHERE entry_id = ?")
            .bind(progress.clamp(0, 100))
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        self.notifier.notify(Table::Enclosures);
        Ok(())
    }

    /// Record a finished download and where the media file landed.
    pub async fn complete_enclosure_download(
        &self,
        entry_id: i64,
        cache_uri: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE enclosures SET download_progress = 100, cache_uri = ? WHERE entry_id = ?",
        )
        .bind(cache_uri)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        self.notifier.notify(Table::Enclosures);
        Ok(())
    }

    pub async fn enclosure(&self, entry_id: i64) -> Result<Option<Enclosure>, StorageError> {
        let enclosure = sqlx::query_as::<_, Enclosure>(
            "SELECT entry_id, href, cache_uri, download_progress FROM enclosures WHERE entry_id = ?",
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enclosure)
    }
}

#[cfg(test)]
mod tests {
    use crate::api::types::{EntryDescriptor, FeedDescriptor};
    use crate::storage::Database;

    async fn db_with_entry() -> Database {
        let db = Database::open(":memory:").await.unwrap();
        db.apply_remote_feed(&FeedDescriptor {
            id: 1,
            title: "Podcast".to_string(),
            self_link: "https://pod.example.com/rss".to_string(),
            alternate_link: None,
        })
        .await
        .unwrap();
        db.apply_remote_entries(&[EntryDescriptor {
            id: 10,
            feed_id: 1,
            title: "Episode 1".to_string(),
            published: Some(1700000000),
            summary: None,
            read: false,
            bookmarked: false,
            alternate_link: None,
            enclosure_link: Some("https://pod.example.com/ep1.mp3".to_string()),
            enclosure_link_type: Some("audio/mpeg".to_string()),
        }])
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn enclosure_lifecycle() {
        let db = db_with_entry().await;
        db.record_enclosure(10, "https://pod.example.com/ep1.mp3")
            .await
            .unwrap();

        db.begin_enclosure_download(10).await.unwrap();
        db.set_enclosure_progress(10, 40).await.unwrap();
        db.complete_enclosure_download(10, "file:///cache/ep1.mp3")
            .await
            .unwrap();

        let enc = db.enclosure(10).await.unwrap().unwrap();
        assert_eq!(enc.download_progress, 100);
        assert_eq!(enc.cache_uri.as_deref(), Some("file:///cache/ep1.mp3"));
    }

    #[tokio::test]
    async fn re_recording_preserves_download_state() {
        let db = db_with_entry().await;
        db.record_enclosure(10, "https://pod.example.com/ep1.mp3")
            .await
            .unwrap();
        db.complete_enclosure_download(10, "file:///cache/ep1.mp3")
            .await
            .unwrap();

        // The next sync sees the same entry again.
        db.record_enclosure(10, "https://pod.example.com/ep1.mp3")
            .await
            .unwrap();

        let enc = db.enclosure(10).await.unwrap().unwrap();
        assert_eq!(enc.download_progress, 100);
        assert!(enc.cache_uri.is_some());
    }

    #[tokio::test]
    async fn deleting_entry_cascades_to_enclosure() {
        let db = db_with_entry().await;
        db.record_enclosure(10, "https://pod.example.com/ep1.mp3")
            .await
            .unwrap();

        db.delete_feed(1).await.unwrap();

        assert!(db.enclosure(10).await.unwrap().is_none());
    }
}
