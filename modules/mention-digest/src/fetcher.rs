use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use mention_digest_common::{ConversationEntry, DigestError, UniqueMention};

use crate::cancel::{guarded, CancelSignal};
use crate::traits::ThreadReplies;

/// Loads the whole thread around a mention.
pub struct ConversationFetcher {
    replies: Arc<dyn ThreadReplies>,
    limit: u32,
    call_timeout: Duration,
}

impl ConversationFetcher {
    pub fn new(replies: Arc<dyn ThreadReplies>, limit: u32, call_timeout: Duration) -> Self {
        Self {
            replies,
            limit,
            call_timeout,
        }
    }

    /// Fetch the thread containing `mention`. The thread root comes from the
    /// permalink's `thread_ts` parameter; a top-level message is its own root.
    pub async fn fetch(
        &self,
        mention: &UniqueMention,
        cancel: &CancelSignal,
    ) -> Result<ConversationEntry, DigestError> {
        let root_ts = thread_root(mention).inspect_err(|e| {
            warn!(permalink = mention.permalink(), stage = "fetch", error = %e, "Unusable permalink");
        })?;

        let messages = guarded(cancel, self.call_timeout, "thread fetch", async {
            self.replies
                .replies(mention.channel_id(), &root_ts, self.limit)
                .await
                .map_err(|e| DigestError::Fetch(e.to_string()))
        })
        .await
        .inspect_err(|e| {
            warn!(
                permalink = mention.permalink(),
                channel = mention.channel_id(),
                root_ts = root_ts.as_str(),
                stage = "fetch",
                error = %e,
                "Thread fetch failed"
            );
        })?;

        debug!(
            permalink = mention.permalink(),
            messages = messages.len(),
            "Thread fetched"
        );

        Ok(ConversationEntry {
            mention_permalink: mention.permalink().to_string(),
            mention_text: mention.text().to_string(),
            mention_channel_id: mention.channel_id().to_string(),
            mention_ts: mention.ts().to_string(),
            messages,
        })
    }
}

/// Resolve the thread root timestamp for a mention.
pub fn thread_root(mention: &UniqueMention) -> Result<String, DigestError> {
    let url = Url::parse(mention.permalink())
        .map_err(|e| DigestError::Malformed(format!("{:?}: {e}", mention.permalink())))?;

    let root = url
        .query_pairs()
        .find(|(key, _)| key == "thread_ts")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());

    Ok(root.unwrap_or_else(|| mention.ts().to_string()))
}
