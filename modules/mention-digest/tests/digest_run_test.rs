//! End-to-end digest runs against the in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use ai_client::Candidate;
use chrono::NaiveDate;
use serde_json::json;

use mention_digest::publish::format_digest;
use mention_digest::summarizer::PromptTemplate;
use mention_digest::testing::{
    mention, summary_json, thread_reply, threaded_mention, MockGenerator, MockSlack,
    RecordingSender,
};
use mention_digest::{CancelSignal, DigestDeps, DigestRunner};
use mention_digest_common::{FailureStage, RawMention};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
}

fn runner(slack: MockSlack, generator: MockGenerator) -> (Arc<MockSlack>, Arc<MockGenerator>, DigestRunner) {
    let slack = Arc::new(slack);
    let generator = Arc::new(generator);
    let deps = DigestDeps::builder()
        .searcher(slack.clone())
        .replies(slack.clone())
        .generator(generator.clone())
        .template(PromptTemplate::new("Return JSON."))
        .model("gemini-test")
        .call_timeout(Duration::from_millis(500))
        .build();
    (slack, generator, DigestRunner::new(deps))
}

fn with_text(mut raw: RawMention, text: &str) -> RawMention {
    raw.text = text.to_string();
    raw
}

#[tokio::test]
async fn duplicate_and_foreign_mentions_collapse_to_one_item() {
    // Two hits on C1/100 naming the target, one on C2/200 naming someone else.
    let hits = vec![
        with_text(mention("C1", "100", "U1"), "release blocked"),
        with_text(mention("C1", "100", "U1"), "release blocked (edited)"),
        with_text(mention("C2", "200", "U9"), "unrelated"),
    ];
    let slack = MockSlack::new()
        .on_search(hits)
        .on_replies("C1", "100", vec![thread_reply("release blocked", "100")]);
    let generator = MockGenerator::new().on_prompt_containing("release blocked", summary_json("P0"));
    let (slack, generator, runner) = runner(slack, generator);

    let digest = runner.run_for_date("U1", today(), &CancelSignal::never()).await.unwrap();

    assert_eq!(digest.user_id, "U1");
    assert_eq!(digest.items.len(), 1);
    assert!(digest.failed.is_empty());
    assert_eq!(digest.items[0].permalink, mention("C1", "100", "U1").permalink);
    assert_eq!(slack.reply_calls().len(), 1);
    assert_eq!(generator.prompts().len(), 1);
    assert!(generator.prompts()[0].contains("Text: \"release blocked\""));
    assert!(generator.prompts()[0].ends_with("]\nReturn JSON."));
    assert_eq!(generator.models(), vec!["gemini-test"]);
}

#[tokio::test]
async fn digest_is_sorted_by_priority_and_keeps_failures_aside() {
    let hits = vec![
        with_text(mention("C1", "1.0", "U1"), "alpha"),
        with_text(mention("C2", "2.0", "U1"), "bravo"),
        with_text(mention("C3", "3.0", "U1"), "charlie"),
        with_text(mention("C4", "4.0", "U1"), "delta"),
        with_text(mention("C5", "5.0", "U1"), "echo"),
        with_text(mention("C6", "6.0", "U1"), "foxtrot"),
    ];
    let slack = MockSlack::new()
        .on_search(hits)
        .on_replies("C1", "1.0", vec![thread_reply("alpha", "1.0")])
        .on_replies("C2", "2.0", vec![thread_reply("bravo", "2.0")])
        .on_replies("C3", "3.0", vec![thread_reply("charlie", "3.0")])
        .on_replies("C4", "4.0", vec![thread_reply("delta", "4.0")])
        .on_replies("C5", "5.0", vec![thread_reply("echo", "5.0")]);
    // foxtrot has no thread: fetch failure.
    let generator = MockGenerator::new()
        .on_prompt_containing("alpha", summary_json("P2"))
        .on_prompt_containing("bravo", summary_json("P0"))
        .on_prompt_containing("charlie", summary_json("P3"))
        .on_prompt_containing("delta", summary_json("P1"))
        .on_prompt_containing("echo", "I could not decide, sorry.");
    let (_, _, runner) = runner(slack, generator);

    let digest = runner.run_for_date("U1", today(), &CancelSignal::never()).await.unwrap();

    let priorities: Vec<_> = digest.items.iter().map(|r| r.priority.label()).collect();
    assert_eq!(priorities, vec!["P0", "P1", "P2", "P3"]);

    let mut failed: Vec<_> = digest
        .failed
        .iter()
        .map(|f| (f.channel_id.as_str(), f.stage))
        .collect();
    failed.sort_by_key(|(channel, _)| *channel);
    assert_eq!(
        failed,
        vec![("C5", FailureStage::Summarize), ("C6", FailureStage::Fetch)]
    );

    let text = format_digest(&digest);
    assert!(text.contains("2 mentions could not be summarized"));
}

#[tokio::test]
async fn reply_mentions_read_the_whole_thread_from_its_root() {
    let slack = MockSlack::new()
        .on_search(vec![with_text(threaded_mention("C1", "1700000300.000300", "1700000000.000100"), "ping")])
        .on_replies(
            "C1",
            "1700000000.000100",
            vec![
                thread_reply("incident opened", "1700000000.000100"),
                thread_reply("looking", "1700000100.000200"),
                thread_reply("ping", "1700000300.000300"),
            ],
        );
    let generator = MockGenerator::new().on_prompt_containing("incident opened", summary_json("P0"));
    let (slack, generator, runner) = runner(slack, generator);

    let digest = runner.run_for_date("U1", today(), &CancelSignal::never()).await.unwrap();

    assert_eq!(digest.items.len(), 1);
    assert_eq!(
        slack.reply_calls(),
        vec![("C1".to_string(), "1700000000.000100".to_string(), 200)]
    );
    let prompt = &generator.prompts()[0];
    assert!(prompt.starts_with("Mention:\n{\n\tText: \"ping\",\n\tTimestamp: \"1700000300.000300\"\n},"));
    let opened = prompt.find("incident opened").unwrap();
    let looking = prompt.find("looking").unwrap();
    assert!(opened < looking);
}

#[tokio::test]
async fn fenced_multi_part_response_is_understood() {
    let candidate: Candidate = serde_json::from_value(json!({
        "content": { "role": "model", "parts": [
            { "text": "Sure, here you go." },
            { "text": "```json\n{\"summary\":[\"x\"],\"actionable\":\"yes\",\"action_required\":[],\"priority\":\"P1\"}\n```" }
        ]},
        "finishReason": "STOP"
    }))
    .unwrap();
    let slack = MockSlack::new()
        .on_search(vec![with_text(mention("C1", "1.0", "U1"), "fenced")])
        .on_replies("C1", "1.0", vec![thread_reply("fenced", "1.0")]);
    let generator = MockGenerator::new().on_prompt_candidates("fenced", vec![candidate]);
    let (_, _, runner) = runner(slack, generator);

    let digest = runner.run_for_date("U1", today(), &CancelSignal::never()).await.unwrap();

    let item = &digest.items[0];
    assert_eq!(item.summary, vec!["x"]);
    assert_eq!(item.actionable, "yes");
    assert!(item.action_required.is_empty());
    assert_eq!(item.priority.label(), "P1");
}

#[tokio::test]
async fn hung_model_call_times_out_without_stalling_the_run() {
    let slack = MockSlack::new()
        .on_search(vec![
            with_text(mention("C1", "1.0", "U1"), "quick"),
            with_text(mention("C2", "2.0", "U1"), "stuck"),
        ])
        .on_replies("C1", "1.0", vec![thread_reply("quick", "1.0")])
        .on_replies("C2", "2.0", vec![thread_reply("stuck", "2.0")]);
    let generator = MockGenerator::new()
        .on_prompt_containing("quick", summary_json("P1"))
        .hang_on("stuck");
    let (_, _, runner) = runner(slack, generator);

    let digest = runner.run_for_date("U1", today(), &CancelSignal::never()).await.unwrap();

    assert_eq!(digest.items.len(), 1);
    assert_eq!(digest.failed.len(), 1);
    assert_eq!(digest.failed[0].channel_id, "C2");
    assert_eq!(digest.failed[0].stage, FailureStage::Summarize);
}

#[tokio::test]
async fn cancelled_run_still_reports_every_mention() {
    let slack = MockSlack::new()
        .on_search(vec![
            with_text(mention("C1", "1.0", "U1"), "one"),
            with_text(mention("C2", "2.0", "U1"), "two"),
        ])
        .on_replies("C1", "1.0", vec![thread_reply("one", "1.0")])
        .on_replies("C2", "2.0", vec![thread_reply("two", "2.0")])
        .with_reply_delay(Duration::from_millis(300));
    let (_, generator, runner) = runner(slack, MockGenerator::new());

    let (handle, cancel) = CancelSignal::pair();
    let run = runner.run_for_date("U1", today(), &cancel);
    let cancel_soon = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    };
    let (digest, ()) = tokio::join!(run, cancel_soon);
    let digest = digest.unwrap();

    assert!(digest.items.is_empty());
    assert_eq!(digest.failed.len(), 2);
    assert!(digest.failed.iter().all(|f| f.reason == "Run cancelled"));
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn finished_digest_is_delivered_once() {
    let slack = MockSlack::new()
        .on_search(vec![with_text(mention("C1", "1.0", "U1"), "hello")])
        .on_replies("C1", "1.0", vec![thread_reply("hello", "1.0")]);
    let generator = MockGenerator::new().on_prompt_containing("hello", summary_json("P2"));
    let (_, _, runner) = runner(slack, generator);
    let sender = RecordingSender::new();

    let digest = runner.run_for_date("U1", today(), &CancelSignal::never()).await.unwrap();
    assert!(runner.deliver(&digest, &sender).await.unwrap());

    let delivered = sender.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0], digest);
}
