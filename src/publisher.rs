use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One feed→account mapping handed to the downstream relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Resolved account name; also the dedup key in the artifact.
    pub name: String,
    pub feed_url: String,
    /// Base URL of the platform instance the relay posts to.
    pub base_url: String,
    pub access_token: String,
    pub interval: Duration,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config artifact error: {0}")]
    Artifact(String),
}

/// Appends feed mappings to the persisted relay configuration. The artifact
/// format and location are owned by the implementation; the contract here is
/// idempotency keyed on the entry name.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ConfigPublisher: Send + Sync {
    /// Append the entry unless one with the same name already exists.
    /// Returns `true` when the entry was actually appended.
    async fn append_entry(&self, entry: FeedEntry) -> Result<bool, PublishError>;
}
