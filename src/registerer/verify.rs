//! VerifyQueue consumer: moderation polling.
//!
//! Re-enqueueing a still-unconfirmed item and sleeping the poll interval in
//! the single consumer stands in for a per-item timer: pending accounts are
//! retried forever (moderation time is unbounded) without tying up a task
//! per item.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{RegisterError, RegistererContext, WorkItem};

pub(crate) enum VerifyOutcome {
    Done,
    /// Account still unconfirmed; item was re-enqueued.
    Pending,
    /// Account vanished; item was sent back to the create queue.
    Recreate,
}

pub(crate) async fn run_verify_loop(
    context: Arc<RegistererContext>,
    mut queue: mpsc::UnboundedReceiver<WorkItem>,
) {
    while let Some(item) = queue.recv().await {
        let key = item.record.key();
        match context.process_verify(item).await {
            Ok(VerifyOutcome::Pending) => {
                tokio::time::sleep(context.settings.verify_poll_interval).await;
            }
            Ok(_) => {}
            Err(err) => {
                error!(
                    url = %key.url,
                    request_id = %key.request_id,
                    error = %err,
                    "verification failed"
                );
            }
        }
    }
}

impl RegistererContext {
    async fn process_verify(&self, item: WorkItem) -> Result<VerifyOutcome, RegisterError> {
        let WorkItem { record, profile } = item;
        if record.finished {
            return Ok(VerifyOutcome::Done);
        }
        if record.access_token.is_none() {
            return Err(RegisterError::Inconsistent(format!(
                "{}#{} reached verification without a token",
                record.url, record.request_id
            )));
        }
        // Restart mid-PostVerify: the id is already known.
        if record.bot_id.is_some() {
            self.post_verify(record, &profile).await?;
            return Ok(VerifyOutcome::Done);
        }
        match self.platform.find_admin_account(&profile.name).await? {
            None => {
                // Token persisted but no account behind it (post-restart
                // race). The create worker re-checks before re-creating.
                warn!(name = %profile.name, "account missing during verification, re-queueing creation");
                self.push_create(WorkItem { record, profile })?;
                Ok(VerifyOutcome::Recreate)
            }
            Some(account) if account.disabled => {
                info!(name = %profile.name, "account rejected by moderation");
                self.notify(
                    &record,
                    &format!("The account request for {} was rejected.", record.url),
                )
                .await;
                self.store.update(&record.with_finished()).await?;
                Ok(VerifyOutcome::Done)
            }
            Some(account) if account.confirmed => {
                self.post_verify(record.with_bot_id(account.id), &profile)
                    .await?;
                Ok(VerifyOutcome::Done)
            }
            Some(_) => {
                info!(name = %profile.name, "awaiting moderation");
                self.push_verify(WorkItem { record, profile })?;
                Ok(VerifyOutcome::Pending)
            }
        }
    }
}
