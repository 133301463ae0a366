use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

/// Application configuration loaded from environment variables.
/// Secrets plus the knobs of the per-user mention pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    // Slack
    pub slack_user_token: String,
    pub slack_delivery_token: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub default_user_id: Option<String>,

    // Gemini
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_api_base_url: Option<String>,

    // Pipeline
    pub prompt_path: PathBuf,
    pub lookback_days: u32,
    pub max_mentions: u32,
    pub thread_limit: u32,
    /// `None` runs one task per mention.
    pub concurrency: Option<usize>,
    pub call_timeout: Duration,
    pub excluded_usernames: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build a config from an arbitrary key lookup. `from_env` is this with
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} environment variable is required"))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let concurrency: usize = parse_or(&lookup, "DIGEST_CONCURRENCY", 0)?;
        let timeout_secs: u64 = parse_or(&lookup, "DIGEST_CALL_TIMEOUT_SECS", 60)?;

        Ok(Self {
            slack_user_token: required("SLACK_USER_TOKEN")?,
            slack_delivery_token: optional("SLACK_DELIVERY_TOKEN"),
            slack_api_base_url: optional("SLACK_API_BASE_URL"),
            default_user_id: optional("SLACK_USER_ID"),
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_model: optional("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_api_base_url: optional("GEMINI_API_BASE_URL"),
            prompt_path: optional("DIGEST_PROMPT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("prompt.txt")),
            lookback_days: parse_or(&lookup, "DIGEST_LOOKBACK_DAYS", 4)?,
            max_mentions: parse_or(&lookup, "DIGEST_MAX_MENTIONS", 40)?,
            thread_limit: parse_or(&lookup, "DIGEST_THREAD_LIMIT", 200)?,
            concurrency: (concurrency > 0).then_some(concurrency),
            call_timeout: Duration::from_secs(timeout_secs),
            excluded_usernames: optional("DIGEST_EXCLUDED_USERNAMES")
                .unwrap_or_else(|| "devrev".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    /// Token used to post the digest. Falls back to the user token.
    pub fn delivery_token(&self) -> &str {
        self.slack_delivery_token
            .as_deref()
            .unwrap_or(&self.slack_user_token)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.chars().take(5).map(char::len_utf8).sum();
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  SLACK_USER_TOKEN: {}", preview(&self.slack_user_token));
        tracing::info!("  SLACK_DELIVERY_TOKEN: {}", preview_opt(&self.slack_delivery_token));
        tracing::info!("  GEMINI_API_KEY: {}", preview(&self.gemini_api_key));
        tracing::info!("  GEMINI_MODEL: {}", self.gemini_model);
        tracing::info!("  DIGEST_PROMPT_PATH: {}", self.prompt_path.display());
        tracing::info!(
            lookback_days = self.lookback_days,
            max_mentions = self.max_mentions,
            thread_limit = self.thread_limit,
            concurrency = ?self.concurrency,
            call_timeout_secs = self.call_timeout.as_secs(),
            "  Pipeline settings"
        );
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}
