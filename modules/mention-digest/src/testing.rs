// Test mocks for the digest pipeline.
//
// One mock per trait boundary:
// - MockSlack (MentionSearch + ThreadReplies): registered search hits and threads
// - MockGenerator (TextGenerator): prompt-substring → canned model output
// - RecordingSender (DigestSender): keeps every delivered digest
//
// Plus helpers for building mentions, thread messages and model output.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::json;

use ai_client::Candidate;
use mention_digest_common::{ConversationEntry, Digest, RawMention, ThreadMessage};

use crate::traits::{DigestSender, MentionSearch, TextGenerator, ThreadReplies};

// ---------------------------------------------------------------------------
// MockSlack
// ---------------------------------------------------------------------------

/// In-memory Slack. Threads are keyed by (channel, root ts); an unregistered
/// thread is an error, as is search when `failing_search` was called.
pub struct MockSlack {
    hits: Vec<RawMention>,
    search_error: Option<String>,
    threads: HashMap<(String, String), Vec<ThreadMessage>>,
    reply_delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
    reply_calls: Mutex<Vec<(String, String, u32)>>,
}

impl Default for MockSlack {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSlack {
    pub fn new() -> Self {
        Self {
            hits: Vec::new(),
            search_error: None,
            threads: HashMap::new(),
            reply_delay: None,
            queries: Mutex::new(Vec::new()),
            reply_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_search(mut self, hits: Vec<RawMention>) -> Self {
        self.hits = hits;
        self
    }

    pub fn failing_search(mut self, error: &str) -> Self {
        self.search_error = Some(error.to_string());
        self
    }

    pub fn on_replies(mut self, channel_id: &str, root_ts: &str, messages: Vec<ThreadMessage>) -> Self {
        self.threads
            .insert((channel_id.to_string(), root_ts.to_string()), messages);
        self
    }

    /// Every thread read sleeps this long before answering.
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn reply_calls(&self) -> Vec<(String, String, u32)> {
        self.reply_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MentionSearch for MockSlack {
    async fn search(
        &self,
        query: &str,
        _sort: &str,
        _sort_dir: &str,
        max_results: u32,
    ) -> Result<Vec<RawMention>> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(error) = &self.search_error {
            bail!("MockSlack: {error}");
        }
        Ok(self.hits.iter().take(max_results as usize).cloned().collect())
    }
}

#[async_trait]
impl ThreadReplies for MockSlack {
    async fn replies(&self, channel_id: &str, root_ts: &str, limit: u32) -> Result<Vec<ThreadMessage>> {
        self.reply_calls
            .lock()
            .unwrap()
            .push((channel_id.to_string(), root_ts.to_string(), limit));
        if let Some(delay) = self.reply_delay {
            tokio::time::sleep(delay).await;
        }
        self.threads
            .get(&(channel_id.to_string(), root_ts.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("MockSlack: thread_not_found {channel_id}/{root_ts}"))
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

/// Answers with the first registered output whose needle appears in the
/// prompt. No match is an error. A `hang_on` needle never answers.
pub struct MockGenerator {
    outputs: Vec<(String, Vec<Candidate>)>,
    hangs: Vec<String>,
    prompts: Mutex<Vec<String>>,
    models: Mutex<Vec<String>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            hangs: Vec::new(),
            prompts: Mutex::new(Vec::new()),
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn on_prompt_containing(self, needle: &str, text: impl Into<String>) -> Self {
        self.on_prompt_candidates(needle, vec![Candidate::from_text(text)])
    }

    pub fn on_prompt_candidates(mut self, needle: &str, candidates: Vec<Candidate>) -> Self {
        self.outputs.push((needle.to_string(), candidates));
        self
    }

    pub fn hang_on(mut self, needle: &str) -> Self {
        self.hangs.push(needle.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<Vec<Candidate>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.models.lock().unwrap().push(model.to_string());

        if self.hangs.iter().any(|needle| prompt.contains(needle.as_str())) {
            std::future::pending::<()>().await;
        }

        self.outputs
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, candidates)| candidates.clone())
            .ok_or_else(|| anyhow!("MockGenerator: no output registered for prompt"))
    }
}

// ---------------------------------------------------------------------------
// RecordingSender
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSender {
    delivered: Mutex<Vec<Digest>>,
    fail: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<Digest> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DigestSender for RecordingSender {
    async fn deliver(&self, digest: &Digest) -> Result<()> {
        if self.fail {
            bail!("RecordingSender: channel_not_found");
        }
        self.delivered.lock().unwrap().push(digest.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn permalink(channel_id: &str, ts: &str) -> String {
    format!(
        "https://acme.slack.com/archives/{channel_id}/p{}",
        ts.replace('.', "")
    )
}

/// A public channel message whose rich text mentions `mentioned_user`.
pub fn mention(channel_id: &str, ts: &str, mentioned_user: &str) -> RawMention {
    RawMention {
        blocks: vec![json!({
            "type": "rich_text",
            "block_id": "b1",
            "elements": [{
                "type": "rich_text_section",
                "elements": [
                    { "type": "user", "user_id": mentioned_user },
                    { "type": "text", "text": " can you take a look?" }
                ]
            }]
        })],
        text: format!("<@{mentioned_user}> can you take a look?"),
        ..mention_without_rich_text(channel_id, ts)
    }
}

/// A public channel message with no structured content.
pub fn mention_without_rich_text(channel_id: &str, ts: &str) -> RawMention {
    RawMention {
        kind: "message".to_string(),
        channel_id: channel_id.to_string(),
        is_private: false,
        ts: ts.to_string(),
        permalink: permalink(channel_id, ts),
        author_id: Some("U_AUTHOR".to_string()),
        username: Some("alice".to_string()),
        text: String::new(),
        blocks: Vec::new(),
    }
}

/// A reply inside the thread rooted at `root_ts`, mentioning `U1`.
pub fn threaded_mention(channel_id: &str, ts: &str, root_ts: &str) -> RawMention {
    let mut raw = mention(channel_id, ts, "U1");
    raw.permalink = format!(
        "{}?thread_ts={root_ts}&cid={channel_id}",
        permalink(channel_id, ts)
    );
    raw
}

pub fn thread_reply(text: &str, ts: &str) -> ThreadMessage {
    ThreadMessage {
        text: text.to_string(),
        ts: ts.to_string(),
    }
}

pub fn conversation(permalink: &str, text: &str) -> ConversationEntry {
    ConversationEntry {
        mention_permalink: permalink.to_string(),
        mention_text: text.to_string(),
        mention_channel_id: "C1".to_string(),
        mention_ts: "1.0".to_string(),
        messages: vec![thread_reply(text, "1.0")],
    }
}

/// Well-formed model output with the given priority.
pub fn summary_json(priority: &str) -> String {
    json!({
        "summary": [format!("{priority} thread")],
        "actionable": "yes",
        "action_required": ["reply"],
        "priority": priority,
    })
    .to_string()
}
