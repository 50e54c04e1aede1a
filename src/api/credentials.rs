use async_trait::async_trait;
use secrecy::SecretString;
use url::Url;

use crate::storage::FlagChanges;

use super::http::NewsClient;
use super::types::{ApiError, EntryDescriptor, EntryQuery, FeedDescriptor};
use super::NewsApi;

/// Direct-credentials transport: no session state, HTTP basic auth on every
/// request. The password lives in a [`SecretString`] and is only exposed at
/// the moment a request is built.
pub struct CredentialsApi {
    client: NewsClient,
}

impl CredentialsApi {
    pub fn new(base: Url, username: String, password: SecretString) -> Result<Self, ApiError> {
        let client = NewsClient::with_basic_auth(base, username, password)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NewsApi for CredentialsApi {
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
