// Trait seams for the digest pipeline's external collaborators.
//
// MentionSearch + ThreadReplies wrap the Slack Web API, TextGenerator wraps
// Gemini, DigestSender is whatever receives the finished digest. Tests swap
// in the mocks from `testing.rs`; no network needed.

use anyhow::Result;
use async_trait::async_trait;

use ai_client::{Candidate, Gemini};
use mention_digest_common::{Digest, RawMention, ThreadMessage};
use slack_client::{ReplyMessage, SearchMatch, SlackClient};

// ---------------------------------------------------------------------------
// MentionSearch
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MentionSearch: Send + Sync {
    /// Run a message search. Results come back in the order the platform
    /// ranked them.
    async fn search(
        &self,
        query: &str,
        sort: &str,
        sort_dir: &str,
        max_results: u32,
    ) -> Result<Vec<RawMention>>;
}

#[async_trait]
impl MentionSearch for SlackClient {
    async fn search(
        &self,
        query: &str,
        sort: &str,
        sort_dir: &str,
        max_results: u32,
    ) -> Result<Vec<RawMention>> {
        let found = self
            .search_messages(query, sort, sort_dir, max_results)
            .await?;
        Ok(found.matches.into_iter().map(raw_mention).collect())
    }
}

fn raw_mention(m: SearchMatch) -> RawMention {
    RawMention {
        kind: m.kind,
        channel_id: m.channel.id,
        is_private: m.channel.is_private,
        ts: m.ts,
        permalink: m.permalink,
        author_id: m.user,
        username: m.username,
        text: m.text,
        blocks: m.blocks,
    }
}

// ---------------------------------------------------------------------------
// ThreadReplies
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ThreadReplies: Send + Sync {
    /// Every message of the thread rooted at `root_ts`, root included, in
    /// platform order.
    async fn replies(&self, channel_id: &str, root_ts: &str, limit: u32)
        -> Result<Vec<ThreadMessage>>;
}

#[async_trait]
impl ThreadReplies for SlackClient {
    async fn replies(
        &self,
        channel_id: &str,
        root_ts: &str,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>> {
        let messages = self.conversation_replies(channel_id, root_ts, limit).await?;
        Ok(messages.into_iter().map(thread_message).collect())
    }
}

fn thread_message(m: ReplyMessage) -> ThreadMessage {
    ThreadMessage {
        text: m.text,
        ts: m.ts,
    }
}

// ---------------------------------------------------------------------------
// TextGenerator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send one prompt and return the raw candidate list.
    async fn generate(&self, model: &str, prompt: &str) -> Result<Vec<Candidate>>;
}

#[async_trait]
impl TextGenerator for Gemini {
    async fn generate(&self, model: &str, prompt: &str) -> Result<Vec<Candidate>> {
        let response = Gemini::generate(self, model, prompt).await?;
        Ok(response.candidates)
    }
}

// ---------------------------------------------------------------------------
// DigestSender
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DigestSender: Send + Sync {
    async fn deliver(&self, digest: &Digest) -> Result<()>;
}
