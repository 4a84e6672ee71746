use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Profile data resolved from a monitored web source.
///
/// Produced by a `ProfileResolver` implementation (feed/website scraping lives
/// outside this crate) and treated as opaque by the pipeline: the core never
/// re-derives any of these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    /// Canonical account handle derived from the source metadata.
    pub name: String,
    /// Local path to the composed avatar image, if one was produced.
    pub icon_path: Option<PathBuf>,
    /// Local path to the site's preview image, if one was found.
    pub thumbnail_path: Option<PathBuf>,
    pub title: String,
    pub description: String,
    pub language: String,
    /// Canonical website link shown on the profile.
    pub link: String,
    /// The feed URL the provisioned account will relay.
    pub feed_url: String,
    pub tags: Vec<String>,
    /// How often the downstream relay should poll the feed.
    pub interval: Duration,
}

/// Errors from resolving a URL to profile metadata. All of these are terminal
/// for the originating request and reported back to the requester.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("nothing found at {url}")]
    NotFound { url: String },
    #[error("no feed reference discovered at {url}")]
    NoFeed { url: String },
    #[error("failed to resolve profile metadata: {0}")]
    Other(String),
}

/// Resolves a monitored URL to the profile data for its bot account.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<ProfileInfo, FetchError>;
}
