use std::collections::HashSet;

use tracing::debug;

use mention_digest_common::{
    MessageBlock, RawMention, RichTextElement, SectionElement, ThreadKey, UniqueMention,
};

/// Search result kind for a plain channel message.
const MESSAGE_KIND: &str = "message";

/// Reduces raw search hits to one representative mention per thread.
///
/// A hit survives when it is a plain message in a public channel, was not
/// posted by an excluded integration account, and its rich text names the
/// target user explicitly. Among survivors the first hit per
/// (channel, ts) wins; input order is preserved.
#[derive(Debug, Clone)]
pub struct MentionDeduplicator {
    excluded_usernames: Vec<String>,
}

impl Default for MentionDeduplicator {
    fn default() -> Self {
        Self::new(vec!["devrev".to_string()])
    }
}

impl MentionDeduplicator {
    pub fn new(excluded_usernames: Vec<String>) -> Self {
        Self { excluded_usernames }
    }

    pub fn filter(&self, mentions: &[RawMention], target_user: &str) -> Vec<UniqueMention> {
        let mut seen: HashSet<ThreadKey> = HashSet::new();
        let mut unique = Vec::new();

        for mention in mentions {
            if !self.is_eligible(mention, target_user) {
                continue;
            }
            if !seen.insert(mention.thread_key()) {
                debug!(key = %mention.thread_key(), "Duplicate thread, skipping");
                continue;
            }
            unique.push(UniqueMention::new(mention.clone()));
        }

        debug!(input = mentions.len(), kept = unique.len(), "Mentions deduplicated");
        unique
    }

    fn is_eligible(&self, mention: &RawMention, target_user: &str) -> bool {
        if mention.kind != MESSAGE_KIND || mention.is_private {
            return false;
        }
        if let Some(username) = mention.username.as_deref() {
            if self.excluded_usernames.iter().any(|u| u == username) {
                return false;
            }
        }
        names_user(mention, target_user)
    }
}

/// True when any rich text section of the message carries a user element for
/// `target_user`. A plain-text "@name" does not count.
///
/// Every rich_text block and every section is scanned, not only the first
/// section, so a mention below an intro paragraph or list still qualifies.
fn names_user(mention: &RawMention, target_user: &str) -> bool {
    mention.decoded_blocks().any(|block| match block {
        MessageBlock::RichText { elements } => elements.iter().any(|element| match element {
            RichTextElement::RichTextSection { elements } => elements.iter().any(|e| {
                matches!(e, SectionElement::User { user_id } if user_id == target_user)
            }),
            RichTextElement::Other => false,
        }),
        MessageBlock::Other => false,
    })
}
