//! Classification: the first stage of every request, run on the caller's
//! path for new requests and once per unfinished record at startup.

use tracing::{info, warn};

use super::{RegisterError, RegistererContext, WorkItem};
use crate::platform::AdminAccountView;
use crate::store::RegistrationRecord;

impl RegistererContext {
    /// Resolve metadata, look up the resolved name on the platform, and
    /// dispatch the record to the queue implied by what is found.
    pub(crate) async fn classify(&self, record: RegistrationRecord) -> Result<(), RegisterError> {
        let profile = match self.resolver.resolve(&record.url).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(url = %record.url, error = %err, "profile resolution failed");
                self.notify(
                    &record,
                    &format!(
                        "Could not read feed information from {}. Please try a different URL.",
                        record.url
                    ),
                )
                .await;
                self.store.update(&record.with_finished()).await?;
                return Ok(());
            }
        };
        let record = self
            .store
            .update(&record.with_resolved_name(profile.name.clone()))
            .await?;

        let existing = self.platform.find_admin_account(&profile.name).await?;
        match existing {
            // An account under this name that this process did not create is
            // never adopted, whatever its moderation state.
            Some(account) if record.access_token.is_none() => {
                info!(name = %profile.name, url = %record.url, "account already exists, finishing request");
                let text = existing_account_text(&record, &profile.name, &account);
                self.notify(&record, &text).await;
                self.store.update(&record.with_finished()).await?;
                Ok(())
            }
            // Our own creation: the verify consumer captures the bot id or
            // the rejection, or resumes PostVerify when the id is known.
            Some(_) => self.push_verify(WorkItem { record, profile }),
            // Not found. Also taken by resumed requests whose token no longer
            // matches a live account; the create worker re-checks existence
            // before creating anything.
            None => self.push_create(WorkItem { record, profile }),
        }
    }
}

fn existing_account_text(
    record: &RegistrationRecord,
    name: &str,
    account: &AdminAccountView,
) -> String {
    if !account.confirmed {
        format!(
            "The account for this site is awaiting approval. It will appear as {} once approved.",
            account.profile_url
        )
    } else if account.disabled {
        format!("The account request for {} was rejected.", record.url)
    } else {
        format!("This site already has an account: @{}.", name)
    }
}
