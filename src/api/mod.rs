//! Remote News service capability set.
//!
//! Exactly one transport variant is active at a time, selected from config
//! at startup and never swapped mid-sync: app-session cookies
//! ([`SessionApi`]), direct credentials ([`CredentialsApi`]), or standalone
//! offline operation ([`LocalApi`]).

mod credentials;
mod http;
mod local;
mod session;
pub mod types;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::{Config, TransportMode};
use crate::storage::FlagChanges;
use crate::util::validate_url;

pub use credentials::CredentialsApi;
pub use local::LocalApi;
pub use session::SessionApi;
pub use types::{ApiError, EntryDescriptor, EntryQuery, FeedDescriptor};

/// The capability set every transport implements. Errors surface as
/// [`ApiError`] values; implementations never panic across this boundary.
#[async_trait]
pub trait NewsApi: Send + Sync {
    /// Whether this transport reaches a real remote. The engine skips
    /// incremental pulls — and their destructive feed reconcile — for
    /// standalone operation.
    fn is_remote(&self) -> bool {
        true
    }

    /// The complete feed list as the remote currently knows it.
    async fn list_feeds(&self) -> Result<Vec<FeedDescriptor>, ApiError>;

    /// Entries matching the query (watermark pull or offset/limit page).
    async fn list_entries(&self, query: EntryQuery) -> Result<Vec<EntryDescriptor>, ApiError>;

    /// Push flag deltas. The remote applies them as idempotent upserts, so
    /// re-delivery after a lost ack is harmless.
    async fn push_flags(&self, changes: &FlagChanges) -> Result<(), ApiError>;

    /// Subscribe to a feed; returns the remote's descriptor for it.
    async fn add_feed(&self, url: &str) -> Result<FeedDescriptor, ApiError>;

    async fn rename_feed(&self, feed_id: i64, title: &str) -> Result<(), ApiError>;

    async fn delete_feed(&self, feed_id: i64) -> Result<(), ApiError>;
}

/// Select and construct the configured transport. Called once at startup and
/// again only on credential change — never mid-sync.
pub async fn connect(config: &Config) -> anyhow::Result<Arc<dyn NewsApi>> {
    match config.mode {
        TransportMode::Local => Ok(Arc::new(LocalApi::new())),
        TransportMode::Session => {
            let base = validate_url(&config.server_url).context("Invalid server URL")?;
            let password = required_password(config)?;
            let api = SessionApi::connect(base, &config.username, &password)
                .await
                .context("Failed to establish app session")?;
            Ok(Arc::new(api))
        }
        TransportMode::Credentials => {
            let base = validate_url(&config.server_url).context("Invalid server URL")?;
            let password = required_password(config)?;
            let api = CredentialsApi::new(base, config.username.clone(), password)
                .context("Failed to build HTTP client")?;
            Ok(Arc::new(api))
        }
    }
}

fn required_password(config: &Config) -> anyhow::Result<SecretString> {
    config
        .password
        .clone()
        .map(SecretString::from)
        .ok_or_else(|| anyhow::anyhow!("Mode {:?} requires a password in config", config.mode))
}
