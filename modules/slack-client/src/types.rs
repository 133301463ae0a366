use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// search.messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchResponse {
    pub messages: SearchMessages,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMessages {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
}

/// One hit from `search.messages`. Blocks are kept as raw JSON; callers decide
/// how strictly to interpret them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMatch {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub channel: SearchChannel,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub blocks: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

// ---------------------------------------------------------------------------
// conversations.replies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepliesResponse {
    #[serde(default)]
    pub messages: Vec<ReplyMessage>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

// ---------------------------------------------------------------------------
// chat.postMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PostMessageRequest<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    pub mrkdwn: bool,
    pub unfurl_links: bool,
    pub unfurl_media: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}
