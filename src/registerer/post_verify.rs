//! PostVerify: the idempotent setup/announce sequence run once the bot id is
//! known. Each sub-step is guarded by a persisted flag, and every flag is
//! persisted strictly after its side effect succeeds: a crash before the
//! write repeats the (idempotent) effect on resume, a crash after it never
//! does.

use tracing::{info, warn};

use super::{RegisterError, RegistererContext};
use crate::platform::{NewStatus, SetupTargets};
use crate::profile::ProfileInfo;
use crate::publisher::FeedEntry;
use crate::store::RegistrationRecord;

impl RegistererContext {
    pub(crate) async fn post_verify(
        &self,
        record: RegistrationRecord,
        profile: &ProfileInfo,
    ) -> Result<(), RegisterError> {
        // The bot id was just captured; persist it before anything else.
        let mut record = self.store.update(&record).await?;
        if record.finished {
            return Ok(());
        }
        let bot_id = record.bot_id.clone().ok_or_else(|| {
            RegisterError::Inconsistent(format!(
                "{}#{} reached post-verify without a bot id",
                record.url, record.request_id
            ))
        })?;
        let token = record.access_token.clone().ok_or_else(|| {
            RegisterError::Inconsistent(format!(
                "{}#{} reached post-verify without a token",
                record.url, record.request_id
            ))
        })?;
        let token = crate::platform::AccessToken::new(token);

        if !record.setup_done {
            self.platform
                .apply_profile_setup(&token, profile, SetupTargets::all())
                .await?;
            record = self.store.update(&record.with_setup_done()).await?;
            info!(name = %profile.name, "profile setup applied");
        }

        let appended = self
            .publisher
            .append_entry(FeedEntry {
                name: profile.name.clone(),
                feed_url: profile.feed_url.clone(),
                base_url: self.settings.base_url.clone(),
                access_token: token.as_str().to_string(),
                interval: profile.interval,
            })
            .await?;
        if appended {
            info!(name = %profile.name, "feed mapping appended to relay config");
        }

        self.platform.follow(&bot_id).await?;

        if !record.notified {
            self.announce(profile).await?;
            record = self.store.update(&record.with_notified()).await?;
        }

        if !record.replied {
            match self.platform.get_status(&record.request_id).await? {
                Some(origin) => {
                    let body = format!(
                        "@{}\n@{} has been created.",
                        origin.account_handle, profile.name
                    );
                    self.platform.publish(NewStatus::reply(&origin, body)).await?;
                }
                None => {
                    warn!(
                        request_id = %record.request_id,
                        "originating status is gone, skipping reply"
                    );
                }
            }
            record = self.store.update(&record.with_replied()).await?;
        }

        let record = self.store.update(&record.with_finished()).await?;
        info!(name = %profile.name, url = %record.url, "bot account provisioned");
        Ok(())
    }
}
