use serde::{Deserialize, Serialize};

// --- Search Input ---

/// A single matched message from the mention search. Read-only to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMention {
    /// Message kind as reported by the search API ("message" for plain messages).
    pub kind: String,
    pub channel_id: String,
    pub is_private: bool,
    /// Timestamp of the matched message itself.
    pub ts: String,
    pub permalink: String,
    pub author_id: Option<String>,
    pub username: Option<String>,
    pub text: String,
    /// Structured content tree, undecoded. See [`MessageBlock`].
    pub blocks: Vec<serde_json::Value>,
}

impl RawMention {
    pub fn thread_key(&self) -> ThreadKey {
        ThreadKey {
            channel_id: self.channel_id.clone(),
            ts: self.ts.clone(),
        }
    }

    /// Decode the content tree, skipping any block that does not parse.
    pub fn decoded_blocks(&self) -> impl Iterator<Item = MessageBlock> + '_ {
        self.blocks
            .iter()
            .filter_map(|raw| serde_json::from_value(raw.clone()).ok())
    }
}

/// Identifies one discussion thread: (channel, timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadKey {
    pub channel_id: String,
    pub ts: String,
}

impl std::fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.ts)
    }
}

// --- Content Tree ---

/// Top-level block of a message's structured content. Only rich text is
/// modelled; every other block type decodes to `Other`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBlock {
    RichText {
        #[serde(default)]
        elements: Vec<RichTextElement>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichTextElement {
    RichTextSection {
        #[serde(default)]
        elements: Vec<SectionElement>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionElement {
    User { user_id: String },
    #[serde(other)]
    Other,
}

// --- Pipeline Units ---

/// The representative mention chosen for a thread. Built once by the
/// deduplicator and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniqueMention {
    raw: RawMention,
}

impl UniqueMention {
    pub fn new(raw: RawMention) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &RawMention {
        &self.raw
    }

    pub fn channel_id(&self) -> &str {
        &self.raw.channel_id
    }

    pub fn ts(&self) -> &str {
        &self.raw.ts
    }

    pub fn permalink(&self) -> &str {
        &self.raw.permalink
    }

    pub fn text(&self) -> &str {
        &self.raw.text
    }

    pub fn thread_key(&self) -> ThreadKey {
        self.raw.thread_key()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub text: String,
    pub ts: String,
}

/// One mention plus its whole thread, in the order the platform returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub mention_permalink: String,
    pub mention_text: String,
    pub mention_channel_id: String,
    /// The mention's own timestamp, not the resolved thread root.
    pub mention_ts: String,
    pub messages: Vec<ThreadMessage>,
}

// --- Summaries ---

/// Priority label as returned by the model. Only P0-P2 are ranked; every
/// other label (P3, blank, garbage) shares the trailing unranked bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(String);

impl Priority {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn rank(&self) -> Option<u8> {
        match self.0.trim().to_ascii_uppercase().as_str() {
            "P0" => Some(0),
            "P1" => Some(1),
            "P2" => Some(2),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "unranked")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Model output for one conversation. `Default` is the empty result; a failed
/// item is carried as [`SummaryOutcome::Failed`], never as a default value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub permalink: String,
    pub summary: Vec<String>,
    /// Kept as the model's string token ("yes"/"no").
    pub actionable: String,
    pub action_required: Vec<String>,
    pub priority: Priority,
}

impl SummaryResult {
    pub fn is_actionable(&self) -> bool {
        !self.actionable.trim().eq_ignore_ascii_case("no")
            && !self.actionable.trim().eq_ignore_ascii_case("false")
            && !self.actionable.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Summarize,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Fetch => write!(f, "fetch"),
            FailureStage::Summarize => write!(f, "summarize"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedMention {
    pub permalink: String,
    pub channel_id: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Terminal state of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryOutcome {
    Summarized(SummaryResult),
    Failed(FailedMention),
}

impl SummaryOutcome {
    pub fn permalink(&self) -> &str {
        match self {
            SummaryOutcome::Summarized(r) => &r.permalink,
            SummaryOutcome::Failed(f) => &f.permalink,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SummaryOutcome::Failed(_))
    }

    /// The summary, or the zero-value result for a failed item.
    pub fn result_or_default(&self) -> SummaryResult {
        match self {
            SummaryOutcome::Summarized(r) => r.clone(),
            SummaryOutcome::Failed(_) => SummaryResult::default(),
        }
    }
}

// --- Digest ---

/// Priority-ordered summaries for one user, plus the items that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Digest {
    pub user_id: String,
    pub items: Vec<SummaryResult>,
    pub failed: Vec<FailedMention>,
}

impl Digest {
    /// Split pipeline outcomes into summarized items and failures, keeping arrival order.
    pub fn from_outcomes(user_id: impl Into<String>, outcomes: Vec<SummaryOutcome>) -> Self {
        let mut items = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                SummaryOutcome::Summarized(r) => items.push(r),
                SummaryOutcome::Failed(f) => failed.push(f),
            }
        }
        Self {
            user_id: user_id.into(),
            items,
            failed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_rank_is_case_insensitive_and_stops_at_p2() {
        assert_eq!(Priority::new("P0").rank(), Some(0));
        assert_eq!(Priority::new("p1").rank(), Some(1));
        assert_eq!(Priority::new(" P2 ").rank(), Some(2));
        assert_eq!(Priority::new("P3").rank(), None);
        assert_eq!(Priority::new("urgent").rank(), None);
        assert_eq!(Priority::default().rank(), None);
        assert_eq!(Priority::default().to_string(), "unranked");
    }

    #[test]
    fn rich_text_tree_decodes_user_elements() {
        let block: MessageBlock = serde_json::from_value(json!({
            "type": "rich_text",
            "block_id": "abc",
            "elements": [{
                "type": "rich_text_section",
                "elements": [
                    { "type": "text", "text": "hey " },
                    { "type": "user", "user_id": "U1" }
                ]
            }]
        }))
        .unwrap();

        let MessageBlock::RichText { elements } = block else {
            panic!("expected rich text block");
        };
        let RichTextElement::RichTextSection { elements } = &elements[0] else {
            panic!("expected section");
        };
        assert_eq!(elements[0], SectionElement::Other);
        assert_eq!(
            elements[1],
            SectionElement::User {
                user_id: "U1".into()
            }
        );
    }

    #[test]
    fn undecodable_blocks_are_skipped() {
        let mention = RawMention {
            blocks: vec![
                json!("not an object"),
                json!({ "type": "section", "text": {} }),
                json!({ "type": "rich_text", "elements": [] }),
            ],
            ..Default::default()
        };
        let blocks: Vec<_> = mention.decoded_blocks().collect();
        assert_eq!(
            blocks,
            vec![
                MessageBlock::Other,
                MessageBlock::RichText { elements: vec![] }
            ]
        );
    }

    #[test]
    fn failed_outcome_yields_zero_value_result() {
        let failed = SummaryOutcome::Failed(FailedMention {
            permalink: "p".into(),
            channel_id: "C1".into(),
            stage: FailureStage::Fetch,
            reason: "boom".into(),
        });
        assert!(failed.is_failed());
        assert_eq!(failed.permalink(), "p");
        assert_eq!(failed.result_or_default(), SummaryResult::default());
    }

    #[test]
    fn digest_splits_outcomes_in_arrival_order() {
        let ok = |p: &str| {
            SummaryOutcome::Summarized(SummaryResult {
                permalink: p.into(),
                ..Default::default()
            })
        };
        let digest = Digest::from_outcomes(
            "U1",
            vec![
                ok("a"),
                SummaryOutcome::Failed(FailedMention {
                    permalink: "b".into(),
                    channel_id: "C1".into(),
                    stage: FailureStage::Summarize,
                    reason: "parse".into(),
                }),
                ok("c"),
            ],
        );
        let permalinks: Vec<_> = digest.items.iter().map(|r| r.permalink.as_str()).collect();
        assert_eq!(permalinks, vec!["a", "c"]);
        assert_eq!(digest.failed.len(), 1);
        assert!(!digest.is_empty());
    }

    #[test]
    fn actionable_token_interpretation() {
        let with = |a: &str| SummaryResult {
            actionable: a.into(),
            ..Default::default()
        };
        assert!(with("yes").is_actionable());
        assert!(with("Yes").is_actionable());
        assert!(!with("no").is_actionable());
        assert!(!with("NO").is_actionable());
        assert!(!with("").is_actionable());
    }
}
