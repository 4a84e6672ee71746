//! CreateQueue consumer: serialized account creation.

use std::sync::Arc;

use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{RegisterError, RegistererContext, WorkItem};
use crate::platform::{NewAccount, PlatformError};
use crate::profile::ProfileInfo;

const PASSWORD_LENGTH: usize = 32;

pub(crate) async fn run_create_loop(
    context: Arc<RegistererContext>,
    mut queue: mpsc::UnboundedReceiver<WorkItem>,
) {
    while let Some(item) = queue.recv().await {
        let key = item.record.key();
        if let Err(err) = context.process_create(item).await {
            // One item's failure never halts the loop.
            error!(
                url = %key.url,
                request_id = %key.request_id,
                error = %err,
                "account creation failed"
            );
        }
    }
}

impl RegistererContext {
    async fn process_create(&self, item: WorkItem) -> Result<(), RegisterError> {
        let WorkItem { mut record, profile } = item;
        if record.finished {
            return Ok(());
        }
        match self.platform.find_admin_account(&profile.name).await? {
            // Already created by this request; go straight to verification.
            Some(_) if record.access_token.is_some() => {}
            // Exists but is not ours: someone else created it since
            // classification. Never adopt it.
            Some(_) => {
                info!(name = %profile.name, "account appeared before creation, finishing as duplicate");
                self.notify(
                    &record,
                    &format!("This site already has an account: @{}.", profile.name),
                )
                .await;
                self.store.update(&record.with_finished()).await?;
                return Ok(());
            }
            None => {
                let token = self.create_account_with_retry(&profile).await?;
                record = self
                    .store
                    .update(&record.with_access_token(token))
                    .await?;
            }
        }
        self.push_verify(WorkItem { record, profile })
    }

    /// Create the account, absorbing the transient error classes: a fixed
    /// cooldown on rate limiting (the item is never dropped or reordered) and
    /// one compensating unblock for a blocked e-mail address.
    async fn create_account_with_retry(
        &self,
        profile: &ProfileInfo,
    ) -> Result<String, RegisterError> {
        let account = NewAccount {
            username: profile.name.clone(),
            email: format!(
                "{}+{}@{}",
                self.settings.email_local, profile.name, self.settings.email_domain
            ),
            password: generate_password(PASSWORD_LENGTH),
            locale: self.settings.locale.clone(),
        };
        let mut unblock_attempted = false;
        loop {
            self.create_limiter.until_ready().await;
            match self.platform.create_account(account.clone()).await {
                Ok(token) => {
                    info!(name = %account.username, email = %account.email, "created account");
                    return Ok(token.into_inner());
                }
                Err(PlatformError::RateLimited) => {
                    info!(
                        name = %account.username,
                        cooldown_secs = self.settings.create_cooldown.as_secs(),
                        "creation rate limited, cooling down"
                    );
                    tokio::time::sleep(self.settings.create_cooldown).await;
                }
                Err(PlatformError::EmailBlocked { email }) if !unblock_attempted => {
                    warn!(%email, "address blocked, attempting unblock");
                    self.platform.unblock_email(&email).await?;
                    unblock_attempted = true;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn generate_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
