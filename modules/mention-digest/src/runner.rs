use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate};
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use mention_digest_common::config::DEFAULT_GEMINI_MODEL;
use mention_digest_common::{Config, Digest, DigestError};

use crate::cancel::{guarded, CancelSignal};
use crate::dedup::MentionDeduplicator;
use crate::fetcher::ConversationFetcher;
use crate::pipeline::PipelineOrchestrator;
use crate::priority::sort_by_priority;
use crate::summarizer::{PromptTemplate, Summarizer};
use crate::traits::{DigestSender, MentionSearch, TextGenerator, ThreadReplies};

const SEARCH_SORT: &str = "timestamp";
const SEARCH_SORT_DIR: &str = "desc";

/// Search query for messages mentioning `user_id` between
/// `today - lookback_days` and `today`.
pub fn mention_query(user_id: &str, today: NaiveDate, lookback_days: u32) -> String {
    let after = today
        .checked_sub_days(Days::new(u64::from(lookback_days)))
        .unwrap_or(NaiveDate::MIN);
    format!(
        "<@{user_id}> after:{} before:{}",
        after.format("%Y-%m-%d"),
        today.format("%Y-%m-%d")
    )
}

/// Everything a run needs. Clients are built once and shared.
#[derive(Clone, TypedBuilder)]
pub struct DigestDeps {
    pub searcher: Arc<dyn MentionSearch>,
    pub replies: Arc<dyn ThreadReplies>,
    pub generator: Arc<dyn TextGenerator>,
    pub template: PromptTemplate,
    #[builder(default = DEFAULT_GEMINI_MODEL.to_string(), setter(into))]
    pub model: String,
    #[builder(default = 4)]
    pub lookback_days: u32,
    #[builder(default = 40)]
    pub max_mentions: u32,
    #[builder(default = 200)]
    pub thread_limit: u32,
    #[builder(default)]
    pub concurrency: Option<usize>,
    #[builder(default = Duration::from_secs(60))]
    pub call_timeout: Duration,
    #[builder(default = vec!["devrev".to_string()])]
    pub excluded_usernames: Vec<String>,
}

impl DigestDeps {
    /// Deps with every tunable taken from `config`.
    pub fn from_config(
        config: &Config,
        searcher: Arc<dyn MentionSearch>,
        replies: Arc<dyn ThreadReplies>,
        generator: Arc<dyn TextGenerator>,
        template: PromptTemplate,
    ) -> Self {
        Self::builder()
            .searcher(searcher)
            .replies(replies)
            .generator(generator)
            .template(template)
            .model(config.gemini_model.clone())
            .lookback_days(config.lookback_days)
            .max_mentions(config.max_mentions)
            .thread_limit(config.thread_limit)
            .concurrency(config.concurrency)
            .call_timeout(config.call_timeout)
            .excluded_usernames(config.excluded_usernames.clone())
            .build()
    }
}

/// One user's digest: search, dedup, fetch + summarize, sort.
pub struct DigestRunner {
    searcher: Arc<dyn MentionSearch>,
    dedup: MentionDeduplicator,
    pipeline: PipelineOrchestrator,
    lookback_days: u32,
    max_mentions: u32,
    call_timeout: Duration,
}

impl DigestRunner {
    pub fn new(deps: DigestDeps) -> Self {
        let fetcher = ConversationFetcher::new(deps.replies, deps.thread_limit, deps.call_timeout);
        let summarizer = Summarizer::new(
            deps.generator,
            deps.model,
            deps.template,
            deps.call_timeout,
        );
        Self {
            searcher: deps.searcher,
            dedup: MentionDeduplicator::new(deps.excluded_usernames),
            pipeline: PipelineOrchestrator::new(fetcher, summarizer, deps.concurrency),
            lookback_days: deps.lookback_days,
            max_mentions: deps.max_mentions,
            call_timeout: deps.call_timeout,
        }
    }

    pub async fn run(&self, user_id: &str, cancel: &CancelSignal) -> Result<Digest, DigestError> {
        self.run_for_date(user_id, Local::now().date_naive(), cancel)
            .await
    }

    /// As [`run`](Self::run), with the search window ending at `today`.
    pub async fn run_for_date(
        &self,
        user_id: &str,
        today: NaiveDate,
        cancel: &CancelSignal,
    ) -> Result<Digest, DigestError> {
        let query = mention_query(user_id, today, self.lookback_days);
        info!(query = query.as_str(), "Searching mentions");

        let hits = guarded(cancel, self.call_timeout, "search", async {
            self.searcher
                .search(&query, SEARCH_SORT, SEARCH_SORT_DIR, self.max_mentions)
                .await
                .map_err(|e| DigestError::Search(e.to_string()))
        })
        .await?;

        let mentions = self.dedup.filter(&hits, user_id);
        info!(hits = hits.len(), unique = mentions.len(), "Mentions found");

        let outcomes = self.pipeline.process(mentions, cancel).await;

        let mut digest = Digest::from_outcomes(user_id, outcomes);
        sort_by_priority(&mut digest.items);
        Ok(digest)
    }

    /// Hand the digest to `sender`. Returns whether anything was sent; a
    /// digest with no items and no failures is skipped.
    pub async fn deliver(
        &self,
        digest: &Digest,
        sender: &dyn DigestSender,
    ) -> Result<bool, DigestError> {
        if digest.is_empty() {
            info!(user_id = digest.user_id.as_str(), "No mentions, nothing to deliver");
            return Ok(false);
        }

        sender.deliver(digest).await.map_err(|e| {
            warn!(user_id = digest.user_id.as_str(), error = %e, "Digest delivery failed");
            DigestError::Delivery(e.to_string())
        })?;
        Ok(true)
    }
}
