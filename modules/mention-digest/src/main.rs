use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ai_client::Gemini;
use mention_digest::publish::{SlackDelivery, StdoutDelivery};
use mention_digest::summarizer::PromptTemplate;
use mention_digest::traits::DigestSender;
use mention_digest::{CancelSignal, DigestDeps, DigestRunner};
use mention_digest_common::Config;
use slack_client::SlackClient;

/// Summarize a user's recent Slack mentions and DM them the digest.
#[derive(Parser, Debug)]
#[command(name = "mention-digest", version)]
struct Args {
    /// Slack user ID to build the digest for. Defaults to SLACK_USER_ID.
    #[arg(long)]
    user: Option<String>,

    /// Print the digest instead of posting it.
    #[arg(long)]
    dry_run: bool,

    /// With --dry-run, print the digest as JSON.
    #[arg(long, requires = "dry_run")]
    json: bool,

    /// Override DIGEST_LOOKBACK_DAYS.
    #[arg(long)]
    lookback_days: Option<u32>,

    /// Override DIGEST_CONCURRENCY. 0 means one task per mention.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Override DIGEST_PROMPT_PATH.
    #[arg(long)]
    prompt: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("mention_digest=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(days) = args.lookback_days {
        config.lookback_days = days;
    }
    if let Some(n) = args.concurrency {
        config.concurrency = (n > 0).then_some(n);
    }
    if let Some(path) = args.prompt {
        config.prompt_path = path;
    }

    let user_id = args
        .user
        .or_else(|| config.default_user_id.clone())
        .context("no user given: pass --user or set SLACK_USER_ID")?;

    let template = PromptTemplate::load(&config.prompt_path)?;

    let mut slack = SlackClient::new(config.slack_user_token.clone());
    let mut gemini = Gemini::new(config.gemini_api_key.clone());
    if let Some(url) = &config.slack_api_base_url {
        slack = slack.with_base_url(url.clone());
    }
    if let Some(url) = &config.gemini_api_base_url {
        gemini = gemini.with_base_url(url.clone());
    }
    let slack = Arc::new(slack);

    let sender: Box<dyn DigestSender> = if args.dry_run {
        Box::new(StdoutDelivery::new(args.json))
    } else {
        let mut delivery = SlackClient::new(config.delivery_token().to_string());
        if let Some(url) = &config.slack_api_base_url {
            delivery = delivery.with_base_url(url.clone());
        }
        Box::new(SlackDelivery::new(delivery))
    };

    let runner = DigestRunner::new(DigestDeps::from_config(
        &config,
        slack.clone(),
        slack,
        Arc::new(gemini),
        template,
    ));

    let (cancel_handle, cancel) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight calls");
            cancel_handle.cancel();
        }
    });

    let run_id = Uuid::new_v4();
    let span = info_span!("digest_run", %run_id, user_id = user_id.as_str());
    async {
        info!("Digest run starting");
        let digest = runner.run(&user_id, &cancel).await?;
        info!(
            items = digest.items.len(),
            failed = digest.failed.len(),
            "Digest ready"
        );
        if runner.deliver(&digest, sender.as_ref()).await? {
            info!("Digest run complete");
        }
        Ok::<_, anyhow::Error>(())
    }
    .instrument(span)
    .await
}
