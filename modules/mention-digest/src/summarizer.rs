use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use ai_client::{strip_code_blocks, Candidate};
use mention_digest_common::{ConversationEntry, DigestError, Priority, SummaryResult};

use crate::cancel::{guarded, CancelSignal};
use crate::traits::TextGenerator;

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Instructional text appended after the rendered conversation. Loaded once
/// per process.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    instructions: String,
}

impl PromptTemplate {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, DigestError> {
        let instructions = std::fs::read_to_string(path).map_err(|e| {
            DigestError::Config(format!("cannot read prompt template {}: {e}", path.display()))
        })?;
        Ok(Self::new(instructions))
    }

    /// Render one conversation followed by the instructions. Output depends
    /// only on the entry and the template.
    pub fn render(&self, entry: &ConversationEntry) -> String {
        let mut prompt = format!(
            "Mention:\n{{\n\tText: \"{}\",\n\tTimestamp: \"{}\"\n}},\nThreadMessages: [\n",
            entry.mention_text, entry.mention_ts
        );

        let last = entry.messages.len().saturating_sub(1);
        for (i, message) in entry.messages.iter().enumerate() {
            prompt.push_str(&format!(
                "\t{{\n\t\tText: \"{}\",\n\t\tTimestamp: \"{}\"\n\t}}",
                message.text, message.ts
            ));
            prompt.push_str(if i < last { ",\n" } else { "\n" });
        }

        prompt.push_str("]\n");
        prompt.push_str(&self.instructions);
        prompt
    }
}

// ---------------------------------------------------------------------------
// Response schema
// ---------------------------------------------------------------------------

/// What the model is asked to emit. `actionable` and `priority` are required;
/// a list field that is absent, null or not an array reads as empty.
#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default, deserialize_with = "lenient_list")]
    summary: Option<Vec<String>>,
    actionable: String,
    #[serde(default, deserialize_with = "lenient_list")]
    action_required: Option<Vec<String>>,
    priority: String,
}

/// Any non-array value becomes `None`; non-string elements are skipped.
fn lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

/// Decode one text part into a result stamped with `permalink`. Markdown code
/// fences around the JSON are tolerated.
pub fn parse_summary(raw: &str, permalink: &str) -> Result<SummaryResult, DigestError> {
    let response: SummaryResponse = serde_json::from_str(strip_code_blocks(raw))
        .map_err(|e| DigestError::Parse(e.to_string()))?;

    Ok(SummaryResult {
        permalink: permalink.to_string(),
        summary: response.summary.unwrap_or_default(),
        actionable: response.actionable,
        action_required: response.action_required.unwrap_or_default(),
        priority: Priority::new(response.priority),
    })
}

/// Pick the first candidate with content and return the first of its text
/// parts that parses. If none parse, the last parse error is returned.
pub fn parse_candidates(
    candidates: &[Candidate],
    permalink: &str,
) -> Result<SummaryResult, DigestError> {
    let candidate = candidates
        .iter()
        .find(|c| !c.is_empty())
        .ok_or(DigestError::NoCandidates)?;

    let mut last_err = DigestError::NoCandidates;
    for part in candidate.text_parts() {
        match parse_summary(part, permalink) {
            Ok(result) => return Ok(result),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Turns a conversation into a structured summary with one model call.
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    model: String,
    template: PromptTemplate,
    call_timeout: Duration,
}

impl Summarizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        model: impl Into<String>,
        template: PromptTemplate,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            model: model.into(),
            template,
            call_timeout,
        }
    }

    pub async fn summarize(
        &self,
        entry: &ConversationEntry,
        cancel: &CancelSignal,
    ) -> Result<SummaryResult, DigestError> {
        let prompt = self.template.render(entry);
        let permalink = entry.mention_permalink.as_str();

        let candidates = guarded(cancel, self.call_timeout, "generate", async {
            self.generator
                .generate(&self.model, &prompt)
                .await
                .map_err(|e| DigestError::Generate(e.to_string()))
        })
        .await
        .inspect_err(|e| warn!(permalink, stage = "summarize", error = %e, "Model call failed"))?;

        let result = parse_candidates(&candidates, permalink)
            .inspect_err(|e| warn!(permalink, stage = "summarize", error = %e, "Unusable model response"))?;

        debug!(permalink, priority = %result.priority, "Conversation summarized");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{conversation, summary_json, MockGenerator};
    use mention_digest_common::ThreadMessage;

    fn template() -> PromptTemplate {
        PromptTemplate::new("Summarize.")
    }

    #[test]
    fn render_lists_mention_then_thread() {
        let entry = ConversationEntry {
            mention_text: "hi <@U1>".into(),
            mention_ts: "2.0".into(),
            messages: vec![
                ThreadMessage {
                    text: "root".into(),
                    ts: "1.0".into(),
                },
                ThreadMessage {
                    text: "hi <@U1>".into(),
                    ts: "2.0".into(),
                },
            ],
            ..Default::default()
        };

        let expected = "Mention:\n{\n\tText: \"hi <@U1>\",\n\tTimestamp: \"2.0\"\n},\n\
            ThreadMessages: [\n\
            \t{\n\t\tText: \"root\",\n\t\tTimestamp: \"1.0\"\n\t},\n\
            \t{\n\t\tText: \"hi <@U1>\",\n\t\tTimestamp: \"2.0\"\n\t}\n\
            ]\nSummarize.";
        assert_eq!(template().render(&entry), expected);
    }

    #[test]
    fn render_with_empty_thread() {
        let entry = ConversationEntry {
            mention_text: "t".into(),
            mention_ts: "1.0".into(),
            ..Default::default()
        };
        assert_eq!(
            template().render(&entry),
            "Mention:\n{\n\tText: \"t\",\n\tTimestamp: \"1.0\"\n},\nThreadMessages: [\n]\nSummarize."
        );
    }

    #[test]
    fn render_is_deterministic() {
        let entry = conversation("https://x.slack.com/archives/C1/p1", "text");
        assert_eq!(template().render(&entry), template().render(&entry));
    }

    #[test]
    fn fenced_json_parses() {
        let raw = "```json\n{\"summary\":[\"a\"],\"actionable\":\"yes\",\"action_required\":[],\"priority\":\"P1\"}\n```";
        let result = parse_summary(raw, "link").unwrap();
        assert_eq!(result.permalink, "link");
        assert_eq!(result.summary, vec!["a"]);
        assert_eq!(result.actionable, "yes");
        assert!(result.action_required.is_empty());
        assert_eq!(result.priority.label(), "P1");
    }

    #[test]
    fn missing_priority_is_a_parse_error() {
        let raw = r#"{"summary":["a"],"actionable":"no","action_required":[]}"#;
        let err = parse_summary(raw, "link").unwrap_err();
        assert!(matches!(err, DigestError::Parse(_)));
    }

    #[test]
    fn non_string_actionable_is_a_parse_error() {
        let raw = r#"{"actionable":true,"priority":"P0"}"#;
        assert!(matches!(parse_summary(raw, "link"), Err(DigestError::Parse(_))));
    }

    #[test]
    fn absent_and_null_lists_become_empty() {
        let raw = r#"{"summary":null,"actionable":"no","priority":"P3"}"#;
        let result = parse_summary(raw, "link").unwrap();
        assert!(result.summary.is_empty());
        assert!(result.action_required.is_empty());
    }

    #[test]
    fn non_array_lists_read_as_empty() {
        let raw = r#"{"summary":"one line","actionable":"no","action_required":"none","priority":"P2"}"#;
        let result = parse_summary(raw, "link").unwrap();
        assert!(result.summary.is_empty());
        assert!(result.action_required.is_empty());
        assert_eq!(result.actionable, "no");
        assert_eq!(result.priority.label(), "P2");
    }

    #[test]
    fn non_string_list_elements_are_skipped() {
        let raw = r#"{"summary":["kept", 3, null],"actionable":"yes","action_required":[{"a":1}],"priority":"P0"}"#;
        let result = parse_summary(raw, "link").unwrap();
        assert_eq!(result.summary, vec!["kept"]);
        assert!(result.action_required.is_empty());
    }

    #[test]
    fn empty_candidates_is_no_candidates() {
        let err = parse_candidates(&[], "link").unwrap_err();
        assert!(matches!(err, DigestError::NoCandidates));

        let err = parse_candidates(&[Candidate::from_text("   ")], "link").unwrap_err();
        assert!(matches!(err, DigestError::NoCandidates));
    }

    #[test]
    fn first_parseable_part_wins() {
        let candidate: Candidate = serde_json::from_value(serde_json::json!({
            "content": { "parts": [
                { "text": "Here is the summary:" },
                { "text": summary_json("P0") },
                { "text": summary_json("P2") }
            ]}
        }))
        .unwrap();
        let result = parse_candidates(&[candidate], "link").unwrap();
        assert_eq!(result.priority.label(), "P0");
    }

    #[test]
    fn later_candidate_used_when_first_is_empty() {
        let candidates = vec![Candidate::from_text(""), Candidate::from_text(summary_json("P1"))];
        let result = parse_candidates(&candidates, "link").unwrap();
        assert_eq!(result.priority.label(), "P1");
    }

    #[tokio::test]
    async fn summarize_stamps_permalink_and_uses_model() {
        let generator = Arc::new(MockGenerator::new().on_prompt_containing("deploy", summary_json("P0")));
        let summarizer = Summarizer::new(generator.clone(), "test-model", template(), Duration::from_secs(5));
        let entry = conversation("https://x.slack.com/archives/C1/p1", "deploy is broken");

        let result = summarizer.summarize(&entry, &CancelSignal::never()).await.unwrap();

        assert_eq!(result.permalink, "https://x.slack.com/archives/C1/p1");
        assert_eq!(result.priority.label(), "P0");
        assert_eq!(generator.models(), vec!["test-model".to_string()]);
    }

    #[tokio::test]
    async fn generator_error_is_a_generate_failure() {
        let summarizer = Summarizer::new(
            Arc::new(MockGenerator::new()),
            "m",
            template(),
            Duration::from_secs(5),
        );
        let entry = conversation("link", "anything");
        let err = summarizer.summarize(&entry, &CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, DigestError::Generate(_)));
    }
}
