use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mention_digest_common::{
    ConversationEntry, DigestError, FailedMention, FailureStage, SummaryOutcome, UniqueMention,
};

use crate::cancel::CancelSignal;
use crate::fetcher::ConversationFetcher;
use crate::summarizer::Summarizer;

/// Result of stage A for one mention.
enum Fetched {
    Entry(ConversationEntry),
    Failed(FailedMention),
}

/// Runs fetch and summarize for every unique mention.
///
/// Two fan-out/fan-in stages, each writing into its own completion channel.
/// Every dispatched mention yields exactly one outcome, so N mentions in
/// means N outcomes out. Outcomes arrive in completion order.
pub struct PipelineOrchestrator {
    fetcher: ConversationFetcher,
    summarizer: Summarizer,
    /// `None` runs one task per mention.
    concurrency: Option<usize>,
}

impl PipelineOrchestrator {
    pub fn new(
        fetcher: ConversationFetcher,
        summarizer: Summarizer,
        concurrency: Option<usize>,
    ) -> Self {
        Self {
            fetcher,
            summarizer,
            concurrency: concurrency.filter(|&n| n > 0),
        }
    }

    pub async fn process(
        &self,
        mentions: Vec<UniqueMention>,
        cancel: &CancelSignal,
    ) -> Vec<SummaryOutcome> {
        let total = mentions.len();
        if total == 0 {
            return Vec::new();
        }
        info!(mentions = total, concurrency = ?self.concurrency, "Dispatching mentions");

        // Stage A: fetch every thread.
        let (fetched_tx, fetched_rx) = mpsc::channel::<Fetched>(total);
        stream::iter(mentions)
            .for_each_concurrent(self.concurrency, |mention| {
                let tx = fetched_tx.clone();
                async move {
                    let fetched = match self.fetcher.fetch(&mention, cancel).await {
                        Ok(entry) => Fetched::Entry(entry),
                        Err(e) => Fetched::Failed(failed(
                            mention.permalink(),
                            mention.channel_id(),
                            FailureStage::Fetch,
                            &e,
                        )),
                    };
                    // Capacity is `total`, so this never waits.
                    let _ = tx.send(fetched).await;
                }
            })
            .await;
        drop(fetched_tx);
        debug!("Fetch stage complete");

        // Stage B: drain stage A, summarize every fetched thread.
        let (done_tx, mut done_rx) = mpsc::channel::<SummaryOutcome>(total);
        let fetched = stream::unfold(fetched_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        fetched
            .for_each_concurrent(self.concurrency, |item| {
                let tx = done_tx.clone();
                async move {
                    let outcome = match item {
                        Fetched::Failed(f) => SummaryOutcome::Failed(f),
                        Fetched::Entry(entry) => {
                            match self.summarizer.summarize(&entry, cancel).await {
                                Ok(result) => SummaryOutcome::Summarized(result),
                                Err(e) => SummaryOutcome::Failed(failed(
                                    &entry.mention_permalink,
                                    &entry.mention_channel_id,
                                    FailureStage::Summarize,
                                    &e,
                                )),
                            }
                        }
                    };
                    let _ = tx.send(outcome).await;
                }
            })
            .await;
        drop(done_tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = done_rx.recv().await {
            outcomes.push(outcome);
        }

        let failures = outcomes.iter().filter(|o| o.is_failed()).count();
        if failures > 0 {
            warn!(failed = failures, total, "Some mentions could not be summarized");
        }
        info!(
            summarized = outcomes.len() - failures,
            failed = failures,
            "Pipeline complete"
        );
        outcomes
    }
}

fn failed(
    permalink: &str,
    channel_id: &str,
    stage: FailureStage,
    error: &DigestError,
) -> FailedMention {
    FailedMention {
        permalink: permalink.to_string(),
        channel_id: channel_id.to_string(),
        stage,
        reason: error.to_string(),
    }
}
