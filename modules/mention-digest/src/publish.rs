use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use mention_digest_common::{Digest, SummaryResult};
use slack_client::SlackClient;

use crate::traits::DigestSender;

const DIVIDER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Render a digest as Slack mrkdwn, one block per item in digest order.
pub fn format_digest(digest: &Digest) -> String {
    let mut out = String::new();

    for (i, item) in digest.items.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("\n{DIVIDER}\n\n"));
        }
        write_item(&mut out, item);
    }

    let failed = digest.failed.len();
    if failed > 0 {
        if !digest.items.is_empty() {
            out.push_str(&format!("\n{DIVIDER}\n\n"));
        }
        let noun = if failed == 1 { "mention" } else { "mentions" };
        out.push_str(&format!(
            "⚠️ {failed} {noun} could not be summarized. Check the logs for details.\n"
        ));
    }

    out
}

fn write_item(out: &mut String, item: &SummaryResult) {
    out.push_str(&format!("🔗 *Mention Link:* <{}|Click Here> |\n", item.permalink));

    let action_marker = if item.is_actionable() { "✅" } else { "➖" };
    out.push_str(&format!(
        "{action_marker} *Actionable:* {}.     {} *Priority:* `{}`\n",
        item.actionable,
        priority_marker(item.priority.label()),
        item.priority.label()
    ));

    out.push_str("\n📝 *Summary*\n");
    for (n, line) in item.summary.iter().enumerate() {
        out.push_str(&format!("  {}. {line}\n", n + 1));
    }

    if !item.action_required.is_empty() {
        out.push_str("\n🛠️ *Action Required*\n");
        for action in &item.action_required {
            out.push_str(&format!("  • {action}\n"));
        }
    }
}

fn priority_marker(label: &str) -> &'static str {
    match label.trim().to_ascii_uppercase().as_str() {
        "P0" | "P1" => "🚨",
        "P2" => "⚠️",
        "P3" => "🔵",
        _ => "⚪",
    }
}

// ---------------------------------------------------------------------------
// Senders
// ---------------------------------------------------------------------------

/// Posts the digest to the user's DM. Posting to a user ID opens the DM.
pub struct SlackDelivery {
    client: SlackClient,
}

impl SlackDelivery {
    pub fn new(client: SlackClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DigestSender for SlackDelivery {
    async fn deliver(&self, digest: &Digest) -> Result<()> {
        let text = format_digest(digest);
        let posted = self.client.post_message(&digest.user_id, &text).await?;
        info!(
            user_id = digest.user_id.as_str(),
            channel = posted.channel.as_str(),
            ts = posted.ts.as_str(),
            "Digest delivered"
        );
        Ok(())
    }
}

/// Prints the digest instead of posting it. Used by `--dry-run`.
pub struct StdoutDelivery {
    json: bool,
}

impl StdoutDelivery {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

#[async_trait]
impl DigestSender for StdoutDelivery {
    async fn deliver(&self, digest: &Digest) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(digest)?);
        } else {
            println!("{}", format_digest(digest));
        }
        Ok(())
    }
}
