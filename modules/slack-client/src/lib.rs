pub mod error;
pub mod types;

pub use error::{Result, SlackError};
pub use types::{PostedMessage, ReplyMessage, SearchChannel, SearchMatch, SearchMessages};

use serde::de::DeserializeOwned;
use types::{PostMessageRequest, RepliesResponse, SearchResponse};

const BASE_URL: &str = "https://slack.com/api";

/// Slack Web API client bound to one token.
///
/// Search requires a user token (`search:read`); thread reads need the
/// matching `*:history` scopes.
#[derive(Clone)]
pub struct SlackClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Run a `search.messages` query. Only the first page is fetched; `count`
    /// caps how many matches come back.
    pub async fn search_messages(
        &self,
        query: &str,
        sort: &str,
        sort_dir: &str,
        count: u32,
    ) -> Result<SearchMessages> {
        let url = format!("{}/search.messages", self.base_url);
        let count = count.to_string();
        let request = self.client.get(&url).query(&[
            ("query", query),
            ("sort", sort),
            ("sort_dir", sort_dir),
            ("count", count.as_str()),
        ]);

        let resp: SearchResponse = self.call("search.messages", request).await?;
        tracing::debug!(
            total = resp.messages.total,
            returned = resp.messages.matches.len(),
            "search.messages complete"
        );
        Ok(resp.messages)
    }

    /// Fetch a thread (root + replies) oldest-first, up to `limit` messages.
    pub async fn conversation_replies(
        &self,
        channel: &str,
        ts: &str,
        limit: u32,
    ) -> Result<Vec<ReplyMessage>> {
        let url = format!("{}/conversations.replies", self.base_url);
        let limit = limit.to_string();
        let request = self.client.get(&url).query(&[
            ("channel", channel),
            ("ts", ts),
            ("limit", limit.as_str()),
        ]);

        let resp: RepliesResponse = self.call("conversations.replies", request).await?;
        if resp.has_more {
            tracing::debug!(channel, ts, "Thread truncated at reply limit");
        }
        Ok(resp.messages)
    }

    /// Post a markdown message with link and media previews disabled.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<PostedMessage> {
        let url = format!("{}/chat.postMessage", self.base_url);
        let body = PostMessageRequest {
            channel,
            text,
            mrkdwn: true,
            unfurl_links: false,
            unfurl_media: false,
        };
        let request = self.client.post(&url).json(&body);
        self.call("chat.postMessage", request).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let resp = request.bearer_auth(&self.token).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SlackError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        if body.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            let error = body
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            return Err(SlackError::Api {
                method: method.to_string(),
                error,
            });
        }

        Ok(serde_json::from_value(body)?)
    }
}
