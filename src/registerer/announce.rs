//! Announcement of a freshly provisioned bot: a status with the site's
//! thumbnail attached, plus maintenance of the pinned bot directory on the
//! announcing account.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::{RegisterError, RegistererContext};
use crate::platform::NewStatus;
use crate::profile::ProfileInfo;

/// Platform-wide status length limit.
const STATUS_CHAR_LIMIT: usize = 500;

static BR_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static PARAGRAPH_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</p>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

impl RegistererContext {
    pub(crate) async fn announce(&self, profile: &ProfileInfo) -> Result<(), RegisterError> {
        let mut media_ids = Vec::new();
        if let Some(path) = &profile.thumbnail_path {
            match tokio::fs::read(path).await {
                Ok(bytes) => match self.platform.upload_media(bytes).await {
                    Ok(id) => media_ids.push(id),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "thumbnail upload failed")
                    }
                },
                Err(err) => warn!(path = %path.display(), error = %err, "could not read thumbnail"),
            }
        }
        let text = format!(
            "Created a new bot account {} (@{}).",
            profile.title, profile.name
        );
        self.platform
            .publish(NewStatus::plain(text).with_media(media_ids))
            .await?;
        // The directory is decorative; its failure must not fail the item.
        if let Err(err) = self.update_pinned_directory(profile).await {
            warn!(name = %profile.name, error = %err, "pinned directory update failed");
        }
        Ok(())
    }

    /// Append the new bot to the pinned directory status, editing in place
    /// while the result stays under the status length limit, otherwise
    /// starting a fresh pinned status.
    async fn update_pinned_directory(&self, profile: &ProfileInfo) -> Result<(), RegisterError> {
        let line = format!("- {} ( @{} )", profile.title, profile.name);
        if let Some(pinned) = self.platform.first_pinned_status().await? {
            let body = flatten_status_html(&pinned.content);
            let updated = format!("{body}\n{line}");
            if updated.chars().count() < STATUS_CHAR_LIMIT {
                self.platform.edit_status(&pinned.id, &updated).await?;
                return Ok(());
            }
        }
        let id = self
            .platform
            .publish(NewStatus::plain(format!("Bot account directory\n\n{line}")))
            .await?;
        self.platform.pin_status(&id).await?;
        Ok(())
    }
}

/// Reduce rendered status HTML back to the plain text it was published as:
/// `<br>` becomes a newline, paragraph breaks become blank lines, remaining
/// markup is dropped.
fn flatten_status_html(content: &str) -> String {
    let text = BR_TAG.replace_all(content, "\n");
    let text = PARAGRAPH_END.replace_all(&text, "\n\n");
    let text = ANY_TAG.replace_all(&text, "");
    text.trim().to_string()
}
