use thiserror::Error;

pub type Result<T> = std::result::Result<T, SlackError>;

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error (status {status}): {message}")]
    Http { status: u16, message: String },

    /// Slack answered `{"ok": false, "error": ...}`.
    #[error("Slack API error in {method}: {error}")]
    Api { method: String, error: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        SlackError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(err: serde_json::Error) -> Self {
        SlackError::Parse(err.to_string())
    }
}
