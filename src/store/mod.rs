//! Durable store for registration requests.
//!
//! Records are immutable values: every pipeline transition builds the next
//! version with one of the `with_*` constructors and persists it before the
//! request is handed to the next stage. Records are never deleted; `finished`
//! is terminal but kept for idempotency and audit.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryRegistrationStore;
pub use sqlite::SqliteRegistrationStore;

/// Identity of one registration request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub url: String,
    pub request_id: String,
}

/// One (url, request id) unit of work through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub url: String,
    /// Correlation id of the originating message.
    pub request_id: String,
    pub resolved_name: Option<String>,
    pub access_token: Option<String>,
    /// Platform account id, known only once moderation confirms the account.
    pub bot_id: Option<String>,
    pub setup_done: bool,
    pub notified: bool,
    pub replied: bool,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pipeline position derived from the persisted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    New,
    AwaitingAccountCreation,
    AwaitingVerification,
    SetupPending,
    AnnouncePending,
    Finished,
}

impl RegistrationRecord {
    pub fn new(url: impl Into<String>, request_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            request_id: request_id.into(),
            resolved_name: None,
            access_token: None,
            bot_id: None,
            setup_done: false,
            notified: false,
            replied: false,
            finished: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            url: self.url.clone(),
            request_id: self.request_id.clone(),
        }
    }

    fn touched(mut self) -> Self {
        self.updated_at = Utc::now();
        self
    }

    pub fn with_resolved_name(mut self, name: impl Into<String>) -> Self {
        self.resolved_name = Some(name.into());
        self.touched()
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self.touched()
    }

    pub fn with_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self.touched()
    }

    pub fn with_setup_done(mut self) -> Self {
        self.setup_done = true;
        self.touched()
    }

    pub fn with_notified(mut self) -> Self {
        self.notified = true;
        self.touched()
    }

    pub fn with_replied(mut self) -> Self {
        self.replied = true;
        self.touched()
    }

    pub fn with_finished(mut self) -> Self {
        self.finished = true;
        self.touched()
    }

    pub fn state(&self) -> RegistrationState {
        if self.finished {
            RegistrationState::Finished
        } else if self.bot_id.is_some() {
            if self.setup_done {
                RegistrationState::AnnouncePending
            } else {
                RegistrationState::SetupPending
            }
        } else if self.access_token.is_some() {
            RegistrationState::AwaitingVerification
        } else if self.resolved_name.is_some() {
            RegistrationState::AwaitingAccountCreation
        } else {
            RegistrationState::New
        }
    }

    /// Structural invariants, checked at the persistence boundary.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.bot_id.is_some() && self.access_token.is_none() {
            return Err(StoreError::Invariant(
                "bot id present without access token".into(),
            ));
        }
        if self.access_token.is_some() && self.resolved_name.is_none() {
            return Err(StoreError::Invariant(
                "access token present without resolved name".into(),
            ));
        }
        Ok(())
    }

    /// Checks that `next` does not rewind any monotonic flag of `self`.
    pub(crate) fn allows_transition_to(&self, next: &Self) -> Result<(), StoreError> {
        let regressed = (self.setup_done && !next.setup_done)
            || (self.notified && !next.notified)
            || (self.replied && !next.replied)
            || (self.finished && !next.finished);
        if regressed {
            return Err(StoreError::Invariant(format!(
                "monotonic flag rewound for {}#{}",
                self.url, self.request_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {url}#{request_id} already exists")]
    Duplicate { url: String, request_id: String },
    #[error("record {url}#{request_id} not found")]
    NotFound { url: String, request_id: String },
    #[error("record invariant violated: {0}")]
    Invariant(String),
    #[error("corrupt record: {reason}")]
    Corrupt { reason: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Keyed CRUD over registration records plus the recovery scan.
///
/// Implementations retry transient lock/contention failures internally;
/// callers only see persistent errors.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn find(
        &self,
        url: &str,
        request_id: &str,
    ) -> Result<Option<RegistrationRecord>, StoreError>;

    async fn insert(&self, record: &RegistrationRecord) -> Result<(), StoreError>;

    /// Persist the next version of a record and return the stored value, so
    /// the caller observes its own write before the next queue hand-off.
    async fn update(&self, record: &RegistrationRecord) -> Result<RegistrationRecord, StoreError>;

    async fn list_unfinished(&self) -> Result<Vec<RegistrationRecord>, StoreError>;
}
