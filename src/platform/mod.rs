//! Abstract surface of the social platform consumed by the pipeline.
//!
//! The wire client lives outside this crate; the core depends only on the
//! `PlatformClient` trait and the narrow value types below, which carry just
//! the fields the pipeline acts on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::ProfileInfo;

/// Errors surfaced by the platform API, reduced to the classes the pipeline
/// distinguishes. Anything else is an opaque `Api` failure for that item.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform's global account-creation rate limit fired. Transient;
    /// the create worker retries the same item after a fixed cooldown.
    #[error("account creation rate limited")]
    RateLimited,
    /// The generated address hit the instance's e-mail blocklist. One
    /// compensating unblock is attempted before the item is failed.
    #[error("email address blocked: {email}")]
    EmailBlocked { email: String },
    #[error("account data rejected: {0}")]
    Validation(String),
    #[error("platform api error: {0}")]
    Api(String),
}

/// Access token issued when an account is created. The token is usable before
/// moderation confirms the account, but only for credential verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Payload for account creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub locale: String,
}

/// Admin-side view of an account, exposing the moderation state the pipeline
/// branches on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdminAccountView {
    pub id: String,
    pub username: String,
    pub confirmed: bool,
    pub disabled: bool,
    pub profile_url: String,
}

/// Status visibility levels, mirrored when replying to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

/// The message that triggered a registration request, looked up by its
/// correlation id. May be gone by the time the pipeline replies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OriginStatus {
    pub id: String,
    pub account_handle: String,
    pub visibility: Visibility,
}

/// Payload for publishing a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewStatus {
    pub text: String,
    pub visibility: Option<Visibility>,
    pub in_reply_to: Option<String>,
    pub media_ids: Vec<String>,
}

impl NewStatus {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visibility: None,
            in_reply_to: None,
            media_ids: Vec::new(),
        }
    }

    /// A reply to the originating message, mirroring its visibility.
    pub fn reply(origin: &OriginStatus, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visibility: Some(origin.visibility),
            in_reply_to: Some(origin.id.clone()),
            media_ids: Vec::new(),
        }
    }

    pub fn with_media(mut self, media_ids: Vec<String>) -> Self {
        self.media_ids = media_ids;
        self
    }
}

/// Which profile fields a setup pass should (re-)apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupTargets {
    pub avatar: bool,
    pub header: bool,
    pub bio: bool,
    pub tags: bool,
    pub fixed_flags: bool,
}

impl SetupTargets {
    pub fn all() -> Self {
        Self {
            avatar: true,
            header: true,
            bio: true,
            tags: true,
            fixed_flags: true,
        }
    }
}

/// A pinned status on the announcing account, used for the bot directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PinnedStatus {
    pub id: String,
    /// Rendered HTML content as returned by the platform.
    pub content: String,
}

/// Everything the pipeline needs from the platform.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Create a new account. Returns its access token; the account still has
    /// to pass moderation before it becomes usable.
    async fn create_account(&self, account: NewAccount) -> Result<AccessToken, PlatformError>;

    /// Remove an address from the instance e-mail blocklist.
    async fn unblock_email(&self, email: &str) -> Result<(), PlatformError>;

    /// Admin lookup of a local account by username.
    async fn find_admin_account(
        &self,
        username: &str,
    ) -> Result<Option<AdminAccountView>, PlatformError>;

    /// Apply avatar/header/bio/tags/fixed flags from the resolved profile.
    async fn apply_profile_setup(
        &self,
        token: &AccessToken,
        profile: &ProfileInfo,
        targets: SetupTargets,
    ) -> Result<(), PlatformError>;

    /// Follow the bot from the announcing account. Safe to repeat.
    async fn follow(&self, bot_id: &str) -> Result<(), PlatformError>;

    /// Look up the originating message by correlation id. `None` when it has
    /// been deleted in the meantime.
    async fn get_status(&self, status_id: &str) -> Result<Option<OriginStatus>, PlatformError>;

    /// Publish a status, returning its id.
    async fn publish(&self, status: NewStatus) -> Result<String, PlatformError>;

    async fn edit_status(&self, status_id: &str, text: &str) -> Result<(), PlatformError>;

    async fn pin_status(&self, status_id: &str) -> Result<(), PlatformError>;

    /// The first pinned status of the announcing account, if any.
    async fn first_pinned_status(&self) -> Result<Option<PinnedStatus>, PlatformError>;

    /// Upload media, returning its id for attachment to a status.
    async fn upload_media(&self, bytes: Vec<u8>) -> Result<String, PlatformError>;
}
