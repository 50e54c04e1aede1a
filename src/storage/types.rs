use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Cache-level errors. These are treated as fatal by the sync engine:
/// a failing local store is surfaced, never silently retried.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another process has the database locked
    #[error("The local cache is locked by another lede process")]
    InstanceLocked,

    /// Migration failed
    #[error("Cache migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Cache error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    /// Classify a sqlx error, detecting SQLite lock conditions.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StorageError::InstanceLocked;
        }

        StorageError::Other(err)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A subscribed feed. Identity is the remote-assigned id; `self_link` is the
/// feed's canonical URL and is what OPML import matches against.
///
/// Content fields (`title`, the two links) are remote-authoritative and
/// overwritten on every reconcile. Preference fields
/// (`open_entries_in_browser`, `blocked_words`, `show_preview_images`) are
/// local-authoritative and never touched by a remote pull.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    pub self_link: String,
    pub alternate_link: Option<String>,
    pub open_entries_in_browser: bool,
    pub blocked_words: Option<String>,
    pub show_preview_images: Option<bool>,
}

/// Link relation: a feed or entry owns at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRel {
    SelfLink,
    Alternate,
}

impl LinkRel {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkRel::SelfLink => "self",
            LinkRel::Alternate => "alternate",
        }
    }
}

/// A link row, owned by exactly one feed or one entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Link {
    pub id: i64,
    pub feed_id: Option<i64>,
    pub entry_id: Option<i64>,
    pub rel: String,
    pub href: String,
}

/// An article. Created only by sync; `read` and `bookmarked` are the only
/// user-mutable fields. `synced_read`/`synced_bookmarked` record the last
/// flag values confirmed pushed to the remote — the pending-flag set is
/// recomputed from the difference, so flag sync needs no separate queue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub published: Option<i64>,
    pub summary: Option<String>,
    pub enclosure_link_type: Option<String>,
    pub read: bool,
    pub bookmarked: bool,
    pub synced_read: bool,
    pub synced_bookmarked: bool,
}

/// Media attachment state. Created on demand when a download is requested;
/// its lifecycle is independent of the owning entry's content.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Enclosure {
    pub entry_id: i64,
    pub href: String,
    pub cache_uri: Option<String>,
    pub download_progress: i64,
}

/// Entry list sort order preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "newest_first",
            SortOrder::OldestFirst => "oldest_first",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "oldest_first" => SortOrder::OldestFirst,
            _ => SortOrder::NewestFirst,
        }
    }
}

/// The configuration singleton (row id = 1).
///
/// `initial_sync_completed` is written only by the sync engine, and only as
/// the final write of a completed initial sync. `last_sync` is the
/// incremental entries watermark (epoch seconds, 0 = never synced).
#[derive(Debug, Clone)]
pub struct Conf {
    pub initial_sync_completed: bool,
    pub last_sync: i64,
    pub sort_order: SortOrder,
    pub show_read_entries: bool,
    pub sync_on_startup: bool,
    pub show_preview_images: bool,
    pub show_preview_text: bool,
    pub crop_preview_images: bool,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            initial_sync_completed: false,
            last_sync: 0,
            sort_order: SortOrder::NewestFirst,
            show_read_entries: true,
            sync_on_startup: true,
            show_preview_images: true,
            show_preview_text: true,
            crop_preview_images: false,
        }
    }
}

/// Flag deltas not yet confirmed by the remote, grouped by direction.
///
/// Recomputed from entry state at push time, so rapid repeated edits
/// coalesce naturally: only the latest flag value per entry is ever
/// transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct FlagChanges {
    pub read: Vec<i64>,
    pub unread: Vec<i64>,
    pub bookmarked: Vec<i64>,
    pub unbookmarked: Vec<i64>,
}

impl FlagChanges {
    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
            && self.unread.is_empty()
            && self.bookmarked.is_empty()
            && self.unbookmarked.is_empty()
    }

    /// Total number of entry flags awaiting push.
    pub fn len(&self) -> usize {
        self.read.len() + self.unread.len() + self.bookmarked.len() + self.unbookmarked.len()
    }
}

/// Import-controlled per-feed preferences carried by OPML outlines.
/// `None` fields leave the cached value untouched (non-destructive merge).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPreferences {
    pub open_entries_in_browser: Option<bool>,
    pub blocked_words: Option<String>,
    pub show_preview_images: Option<bool>,
}
