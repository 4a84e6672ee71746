//! The registration pipeline.
//!
//! One durable record per (url, request id) pair is driven through account
//! creation, moderation wait, profile setup and announcement by two work
//! queues, each drained by exactly one consumer task:
//!
//! - CreateQueue — account creation, serialized because the platform enforces
//!   a global creation rate limit;
//! - VerifyQueue — moderation polling; fed by classification, by the create
//!   worker, and by its own re-enqueue when an account is still unconfirmed.
//!
//! Every record mutation is persisted before the request is handed to the
//! next stage, so a restart can rebuild the queues from the store alone.

mod announce;
mod classify;
mod create;
mod post_verify;
mod verify;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::platform::{NewStatus, PlatformClient, PlatformError};
use crate::profile::{ProfileInfo, ProfileResolver};
use crate::publisher::{ConfigPublisher, PublishError};
use crate::store::{RegistrationRecord, RegistrationStore, StoreError};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("work queue closed")]
    QueueClosed,
    #[error("inconsistent pipeline state: {0}")]
    Inconsistent(String),
}

/// Tunables of the pipeline. Loaded from `BotminterConfig` in production,
/// constructed directly in tests.
#[derive(Debug, Clone)]
pub struct RegistererSettings {
    /// Base URL of the platform instance, recorded in published feed entries.
    pub base_url: String,
    /// Local part for generated plus-addressed account mail.
    pub email_local: String,
    pub email_domain: String,
    pub locale: String,
    /// Cooldown before retrying a rate-limited creation call.
    pub create_cooldown: Duration,
    /// Interval between moderation polls for one pending account.
    pub verify_poll_interval: Duration,
    /// Proactive pacing of creation calls, on top of the reactive cooldown.
    pub creates_per_hour: u32,
    pub create_burst: u32,
}

impl Default for RegistererSettings {
    fn default() -> Self {
        Self {
            base_url: "https://social.example".to_string(),
            email_local: "bots".to_string(),
            email_domain: "example.com".to_string(),
            locale: "en".to_string(),
            create_cooldown: Duration::from_secs(30 * 60),
            verify_poll_interval: Duration::from_secs(60),
            creates_per_hour: 12,
            create_burst: 2,
        }
    }
}

/// A queued unit of work: the latest persisted record version plus the
/// resolved profile it was classified with.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub record: RegistrationRecord,
    pub profile: ProfileInfo,
}

pub(crate) struct RegistererContext {
    pub(crate) store: Arc<dyn RegistrationStore>,
    pub(crate) platform: Arc<dyn PlatformClient>,
    pub(crate) resolver: Arc<dyn ProfileResolver>,
    pub(crate) publisher: Arc<dyn ConfigPublisher>,
    pub(crate) settings: RegistererSettings,
    pub(crate) create_limiter: DefaultDirectRateLimiter,
    create_tx: mpsc::UnboundedSender<WorkItem>,
    verify_tx: mpsc::UnboundedSender<WorkItem>,
}

impl RegistererContext {
    pub(crate) fn push_create(&self, item: WorkItem) -> Result<(), RegisterError> {
        self.create_tx.send(item).map_err(|_| RegisterError::QueueClosed)
    }

    pub(crate) fn push_verify(&self, item: WorkItem) -> Result<(), RegisterError> {
        self.verify_tx.send(item).map_err(|_| RegisterError::QueueClosed)
    }

    /// Reply to the originating message. Never fails the pipeline: a deleted
    /// origin or a failed publish degrades to an operator-visible log line.
    pub(crate) async fn notify(&self, record: &RegistrationRecord, text: &str) {
        match self.platform.get_status(&record.request_id).await {
            Ok(Some(origin)) => {
                let body = format!("@{}\n{}", origin.account_handle, text);
                if let Err(err) = self.platform.publish(NewStatus::reply(&origin, body)).await {
                    error!(
                        request_id = %record.request_id,
                        error = %err,
                        "failed to publish notification"
                    );
                }
            }
            Ok(None) => {
                warn!(
                    request_id = %record.request_id,
                    "originating status is gone, skipping notification"
                );
            }
            Err(err) => {
                error!(
                    request_id = %record.request_id,
                    error = %err,
                    "failed to look up originating status"
                );
            }
        }
    }
}

/// Orchestrates bot-account provisioning. The sole inbound operation is
/// [`queue_request`](Self::queue_request); everything else happens on the two
/// worker tasks spawned by [`spawn`](Self::spawn).
pub struct AccountRegisterer {
    context: Arc<RegistererContext>,
    workers: Vec<JoinHandle<()>>,
}

impl AccountRegisterer {
    /// Build the pipeline and spawn its two queue consumers.
    pub fn spawn(
        store: Arc<dyn RegistrationStore>,
        platform: Arc<dyn PlatformClient>,
        resolver: Arc<dyn ProfileResolver>,
        publisher: Arc<dyn ConfigPublisher>,
        settings: RegistererSettings,
    ) -> Self {
        let (create_tx, create_rx) = mpsc::unbounded_channel();
        let (verify_tx, verify_rx) = mpsc::unbounded_channel();
        let quota = Quota::per_hour(nonzero(settings.creates_per_hour))
            .allow_burst(nonzero(settings.create_burst));
        let context = Arc::new(RegistererContext {
            store,
            platform,
            resolver,
            publisher,
            settings,
            create_limiter: RateLimiter::direct(quota),
            create_tx,
            verify_tx,
        });
        let workers = vec![
            tokio::spawn(create::run_create_loop(Arc::clone(&context), create_rx)),
            tokio::spawn(verify::run_verify_loop(Arc::clone(&context), verify_rx)),
        ];
        Self { context, workers }
    }

    /// Register a request. Returns `true` when a new pipeline was started,
    /// `false` when the (url, request id) pair is already tracked.
    ///
    /// Classification runs on the calling path, so a request makes progress
    /// even before the worker loops pick anything up.
    pub async fn queue_request(&self, url: &str, request_id: &str) -> Result<bool, RegisterError> {
        info!(url, request_id, "registration requested");
        if self.context.store.find(url, request_id).await?.is_some() {
            debug!(url, request_id, "request already tracked");
            return Ok(false);
        }
        let record = RegistrationRecord::new(url, request_id);
        match self.context.store.insert(&record).await {
            Ok(()) => {}
            // Lost an insert race with a concurrent request for the same key.
            Err(StoreError::Duplicate { .. }) => {
                debug!(url, request_id, "request already tracked");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        }
        self.context.classify(record).await?;
        Ok(true)
    }

    /// Re-inject every unfinished record into the queue its flags imply.
    /// Called once at startup; safe to repeat because every side effect is
    /// guarded by a persisted flag. Returns the number of records scanned.
    pub async fn recover(&self) -> Result<usize, RegisterError> {
        let pending = self.context.store.list_unfinished().await?;
        let count = pending.len();
        info!(count, "re-injecting unfinished registrations");
        for record in pending {
            let key = record.key();
            if let Err(err) = self.context.classify(record).await {
                error!(
                    url = %key.url,
                    request_id = %key.request_id,
                    error = %err,
                    "failed to re-inject registration"
                );
            }
        }
        Ok(count)
    }

    /// Best-effort shutdown: aborts the queue consumers. Any in-flight item
    /// is replayed from the store on the next start.
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

// The workers hold the context, and with it both senders, so they never see
// their channel close on their own. Abort them when the handle goes away.
impl Drop for AccountRegisterer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn nonzero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value.max(1)).unwrap_or(NonZeroU32::MIN)
}
