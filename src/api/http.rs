//! Shared HTTP plumbing for the two networked transports.
//!
//! The session and credentials variants speak the same endpoint protocol;
//! they differ only in how requests are authenticated. Both delegate to
//! [`NewsClient`], which owns the base URL, timeouts, and status/body
//! decoding.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use crate::storage::FlagChanges;

use super::types::{
    ApiError, EntriesResponse, EntryDescriptor, EntryQuery, FeedDescriptor, FeedsResponse,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) struct NewsClient {
    client: reqwest::Client,
    base: Url,
    basic_auth: Option<(String, SecretString)>,
}

impl NewsClient {
    /// Build a client for per-request basic auth (direct-credentials mode).
    pub(crate) fn with_basic_auth(
        base: Url,
        username: String,
        password: SecretString,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("lede/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base: ensure_trailing_slash(base),
            basic_auth: Some((username, password)),
        })
    }

    /// Build a client with a cookie store (app-session mode); authentication
    /// happens once via [`login`] and rides along as cookies afterwards.
    ///
    /// [`login`]: NewsClient::login
    pub(crate) fn with_cookie_store(base: Url) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("lede/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            base: ensure_trailing_slash(base),
            basic_auth: None,
        })
    }

    /// Establish an app session; the server's session cookie lands in the
    /// cookie store and authenticates every later call.
    pub(crate) async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "user": username,
            "password": password.expose_secret(),
        });
        let request = self.request(Method::POST, "login")?.json(&body);
        self.send(request).await?;
        Ok(())
    }

    // ========================================================================
    // Endpoint Protocol
    // ========================================================================

    pub(crate) async fn list_feeds(&self) -> Result<Vec<FeedDescriptor>, ApiError> {
        let response: FeedsResponse = self.get_json("feeds", &[]).await?;
        Ok(response.feeds)
    }

    pub(crate) async fn list_entries(
        &self,
        query: EntryQuery,
    ) -> Result<Vec<EntryDescriptor>, ApiError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(since) = query.since {
            params.push(("since", since.to_string()));
        }
        if let Some(feed_id) = query.feed_id {
            params.push(("feedId", feed_id.to_string()));
        }
        if let Some(offset) = query.offset {
            params.push(("offset", offset.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        let response: EntriesResponse = self.get_json("entries", &params).await?;
        Ok(response.entries)
    }

    pub(crate) async fn push_flags(&self, changes: &FlagChanges) -> Result<(), ApiError> {
        let request = self.request(Method::PUT, "entries/flags")?.json(changes);
        self.send(request).await?;
        Ok(())
    }

    pub(crate) async fn add_feed(&self, url: &str) -> Result<FeedDescriptor, ApiError> {
        let body = serde_json::json!({ "url": url });
        let request = self.request(Method::POST, "feeds")?.json(&body);
        let response = self.send(request).await?;
        decode_json(response).await
    }

    pub(crate) async fn rename_feed(&self, feed_id: i64, title: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "title": title });
        let request = self
            .request(Method::PUT, &format!("feeds/{feed_id}/rename"))?
            .json(&body);
        self.send(request).await?;
        Ok(())
    }

    pub(crate) async fn delete_feed(&self, feed_id: i64) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, &format!("feeds/{feed_id}"))?;
        self.send(request).await?;
        Ok(())
    }

    // ========================================================================
    // Request Plumbing
    // ========================================================================

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ApiError::Parse(format!("invalid endpoint path {path}: {e}")))?;
        let mut builder = self.client.request(method, url);
        if let Some((user, password)) = &self.basic_auth {
            builder = builder.basic_auth(user, Some(password.expose_secret()));
        }
        Ok(builder)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path)?.query(params);
        let response = self.send(request).await?;
        decode_json(response).await
    }

    /// Send with the request timeout and map the status. 401/403 become
    /// `Auth`; any other non-success status becomes `Http`.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(ApiError::Network)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Auth);
        }
        if !status.is_success() {
            return Err(ApiError::Http(status.as_u16()));
        }
        Ok(response)
    }
}

/// Decode a JSON body, classifying decode failures as `Parse` rather than
/// letting them masquerade as network errors.
async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(ApiError::Network)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Parse(e.to_string()))
}

fn ensure_trailing_slash(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}
