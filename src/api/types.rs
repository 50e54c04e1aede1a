use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by a remote transport. Always a tagged value at the sync
/// engine boundary — a raw transport error never crosses it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with an unexpected status code
    #[error("HTTP error: status {0}")]
    Http(u16),
    /// Server rejected the session or credentials
    #[error("Authentication rejected by the server")]
    Auth,
    /// Response body could not be decoded
    #[error("Malformed server response: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether a retry can reasonably succeed without user action.
    /// Network faults, timeouts, and server-side errors are transient;
    /// authentication rejections, client errors, and malformed payloads
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Http(status) => *status >= 500,
            ApiError::Auth | ApiError::Parse(_) => false,
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// A feed as described by the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDescriptor {
    pub id: i64,
    pub title: String,
    pub self_link: String,
    #[serde(default)]
    pub alternate_link: Option<String>,
}

/// An entry (article) as described by the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDescriptor {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    #[serde(default)]
    pub published: Option<i64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub alternate_link: Option<String>,
    #[serde(default)]
    pub enclosure_link: Option<String>,
    #[serde(default)]
    pub enclosure_link_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedsResponse {
    pub feeds: Vec<FeedDescriptor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EntriesResponse {
    pub entries: Vec<EntryDescriptor>,
}

// ============================================================================
// Queries
// ============================================================================

/// Parameters for `list_entries`: either a watermark pull (incremental sync)
/// or an offset/limit page (initial sync), optionally scoped to one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryQuery {
    pub since: Option<i64>,
    pub feed_id: Option<i64>,
    pub offset: Option<u64>,
    pub limit: Option<u32>,
}

impl EntryQuery {
    /// One bounded page of the full dataset, for initial sync.
    pub fn page(offset: u64, limit: u32) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Everything new or changed since the watermark.
    pub fn since(timestamp: i64) -> Self {
        Self {
            since: Some(timestamp),
            ..Self::default()
        }
    }

    /// Scope the query to a single feed.
    pub fn for_feed(mut self, feed_id: i64) -> Self {
        self.feed_id = Some(feed_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::Http(503).is_transient());
        assert!(!ApiError::Http(404).is_transient());
        assert!(!ApiError::Auth.is_transient());
        assert!(!ApiError::Parse("bad json".into()).is_transient());
    }

    #[test]
    fn entry_descriptor_tolerates_missing_optionals() {
        let entry: EntryDescriptor = serde_json::from_str(
            r#"{"id": 1, "feedId": 2, "title": "Hello"}"#,
        )
        .unwrap();
        assert_eq!(entry.feed_id, 2);
        assert!(!entry.read);
        assert!(entry.enclosure_link.is_none());
    }
}
