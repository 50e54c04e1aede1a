use super::schema::Database;
use super::types::{Conf, SortOrder, StorageError};
use super::watch::Table;

type ConfRow = (bool, i64, String, bool, bool, bool, bool, bool);

impl Database {
    // ========================================================================
    // Conf Singleton
    // ========================================================================

    /// Read the configuration singleton. The row is created by migration, so
    /// this never needs an insert path.
    pub async fn conf(&self) -> Result<Conf, StorageError> {
        let (
            initial_sync_completed,
            last_sync,
            sort_order,
            show_read_entries,
            sync_on_startup,
            show_preview_images,
            show_preview_text,
            crop_preview_images,
        ): ConfRow = sqlx::query_as(
            r#"
            SELECT initial_sync_completed, last_sync, sort_order,
                   show_read_entries, sync_on_startup, show_preview_images,
                   show_preview_text, crop_preview_images
            FROM conf WHERE id = 1
        "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Conf {
            initial_sync_completed,
            last_sync,
            sort_order: SortOrder::parse(&sort_order),
            show_read_entries,
            sync_on_startup,
            show_preview_images,
            show_preview_text,
            crop_preview_images,
        })
    }

    /// Overwrite the configuration singleton. This is the single controlled
    /// write path for preference edits; the sync engine uses the dedicated
    /// methods below for its own fields.
    pub async fn update_conf(&self, conf: &Conf) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE conf SET
                initial_sync_completed = ?,
                last_sync = ?,
                sort_order = ?,
                show_read_entries = ?,
                sync_on_startup = ?,
                show_preview_images = ?,
                show_preview_text = ?,
                crop_preview_images = ?
            WHERE id = 1
        "#,
        )
        .bind(conf.initial_sync_completed)
        .bind(conf.last_sync)
        .bind(conf.sort_order.as_str())
        .bind(conf.show_read_entries)
        .bind(conf.sync_on_startup)
        .bind(conf.show_preview_images)
        .bind(conf.show_preview_text)
        .bind(conf.crop_preview_images)
        .execute(&self.pool)
        .await?;
        self.notifier.notify(Table::Conf);
        Ok(())
    }

    /// Mark initial sync as durably complete and record the watermark, in
    /// one statement. This is the final write of a successful initial sync:
    /// if the flag reads true, the dataset write preceding it committed.
    pub async fn complete_initial_sync(&self, watermark: i64) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE conf SET initial_sync_completed = 1, last_sync = ? WHERE id = 1",
        )
        .bind(watermark)
        .execute(&self.pool)
        .await?;
        self.notifier.notify(Table::Conf);
        Ok(())
    }

    /// Advance the incremental sync watermark.
    pub async fn set_last_sync(&self, watermark: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE conf SET last_sync = ? WHERE id = 1")
            .bind(watermark)
            .execute(&self.pool)
            .await?;
        self.notifier.notify(Table::Conf);
        Ok(())
    }
}
