use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::storage::FlagChanges;

use super::types::{ApiError, EntryDescriptor, EntryQuery, FeedDescriptor};
use super::NewsApi;

/// Provisional feed ids start far above anything a server would assign, so a
/// later switch to a networked mode cannot collide with locally added feeds.
const PROVISIONAL_ID_BASE: i64 = 1 << 40;

/// Standalone transport for offline operation: pulls return nothing, pushes
/// acknowledge immediately (the cache is the only truth), and added feeds
/// get provisional ids.
pub struct LocalApi {
    next_id: AtomicI64,
}

impl LocalApi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(PROVISIONAL_ID_BASE),
        }
    }
}

impl Default for LocalApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NewsApi for LocalApi {
    fn is_remote(&self) -> bool {
        false
    }

    async fn list_feeds(&self) -> Result<Vec<FeedDescriptor>, ApiError> {
        Ok(Vec::new())
    }

    async fn list_entries(&self, _query: EntryQuery) -> Result<Vec<EntryDescriptor>, ApiError> {
        Ok(Vec::new())
    }

    async fn push_flags(&self, _changes: &FlagChanges) -> Result<(), ApiError> {
        Ok(())
    }

    async fn add_feed(&self, url: &str) -> Result<FeedDescriptor, ApiError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(FeedDescriptor {
            id,
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
