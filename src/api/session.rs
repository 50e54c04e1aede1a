use async_trait::async_trait;
use secrecy::SecretString;
use url::Url;

use crate::storage::FlagChanges;

use super::http::NewsClient;
use super::types::{ApiError, EntryDescriptor, EntryQuery, FeedDescriptor};
use super::NewsApi;

/// App-session transport: authenticates once against the server's login
/// endpoint and carries the resulting session cookie on every call.
pub struct SessionApi {
    client: NewsClient,
}

impl SessionApi {
    /// Log in and hold the session. Fails with `ApiError::Auth` when the
    /// server rejects the login.
    pub async fn connect(
        base: Url,
        username: &str,
        password: &SecretString,
    ) -> Result<Self, ApiError> {
        let client = NewsClient::with_cookie_store(base)?;
        client.login(username, password).await?;
        tracing::debug!(user = username, "App session established");
        Ok(Self { client })
    }
}

#[async_trait]
impl NewsApi for SessionApi {
    async fn list_feeds(&self) -> Result<Vec<FeedDescriptor>, ApiError> {
        self.client.list_feeds().await
    }

    async fn list_entries(&self, query: EntryQuery) -> Result<Vec<EntryDescriptor>, ApiError> {
        self.client.list_entries(query).await
    }

    async fn push_flags(&self, changes: &FlagChanges) -> Result<(), ApiError> {
        self.client.push_flags(changes).await
    }

    async fn add_feed(&self, url: &str) -> Result<FeedDescriptor, ApiError> {
        self.client.add_feed(url).await
    }

    async fn rename_feed(&self, feed_id: i64, title: &str) -> Result<(), ApiError> {
        self.client.rename_feed(feed_id, title).await
    }

    async fn delete_feed(&self, feed_id: i64) -> Result<(), ApiError> {
        self.client.delete_feed(feed_id).await
    }
}
