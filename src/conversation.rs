//! `ConversationWindow` — bounds the message array that grows during a
//! tool-use loop.
//!
//! `Message` mirrors the teacher's `api::types::Message` shape (role,
//! opaque content, optional `tool_calls`/`tool_call_id`) so auxiliary
//! identifiers survive trimming by value, as the spec requires.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into(), tool_calls: None, tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into(), tool_calls: None, tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into(), tool_calls: None, tool_call_id: None }
    }

    fn estimated_tokens(&self) -> usize {
        let mut chars = self.content.len();
        if let Some(calls) = &self.tool_calls {
            chars += calls.iter().map(|c| c.name.len() + c.arguments.len()).sum::<usize>();
        }
        chars / 4
    }
}

/// Emitted after a trim, for telemetry/warnings only — not used to decide
/// truncation correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMetrics {
    pub total_messages: usize,
    pub preserved_messages: usize,
    pub evicted_messages: usize,
    pub estimated_tokens: usize,
}

/// A callable that summarizes a batch of evicted messages into one string.
/// Injected so the window itself never depends on a live provider.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, instruction: &str, messages: &[Message]) -> anyhow::Result<String>;
}

const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation history concisely. Focus on: files read/written, decisions made, problems encountered, current state. Be factual and brief.";

pub struct ConversationWindow {
    pub max_messages: usize,
    pub preserve_head: usize,
    pub preserve_tail: usize,
    pub summarize_on_trim: bool,
    pub summarize_every_n: usize,
    evicted_since_last_summary: usize,
}

impl ConversationWindow {
    pub fn new(max_messages: usize, preserve_head: usize, preserve_tail: usize) -> Self {
        Self {
            max_messages,
            preserve_head,
            preserve_tail,
            summarize_on_trim: false,
            summarize_every_n: 10,
            evicted_since_last_summary: 0,
        }
    }

    pub fn with_summarization(mut self, summarize_every_n: usize) -> Self {
        self.summarize_on_trim = true;
        self.summarize_every_n = summarize_every_n;
        self
    }

    /// Trim `messages` in place, optionally injecting a summarizer. Returns
    /// metrics describing the resulting window.
    pub async fn trim(
        &mut self,
        messages: &mut Vec<Message>,
        summarizer: Option<&dyn Summarizer>,
    ) -> ConversationMetrics {
        let total = messages.len();

        if total <= self.max_messages {
            return ConversationMetrics {
                total_messages: total,
                preserved_messages: total,
                evicted_messages: 0,
                estimated_tokens: messages.iter().map(Message::estimated_tokens).sum(),
            };
        }

        let head_end = self.preserve_head.min(total);
        let tail_start = total.saturating_sub(self.preserve_tail).max(head_end);

        let head: Vec<Message> = messages[..head_end].to_vec();
        let middle: Vec<Message> = messages[head_end..tail_start].to_vec();
        let tail: Vec<Message> = messages[tail_start..].to_vec();

        self.evicted_since_last_summary += middle.len();

        let mut new_messages = head;

        if self.summarize_on_trim
            && !middle.is_empty()
            && self.evicted_since_last_summary >= self.summarize_every_n
        {
            if let Some(summarizer) = summarizer {
                match summarizer.summarize(SUMMARY_INSTRUCTION, &middle).await {
                    Ok(summary) if !summary.trim().is_empty() => {
                        new_messages.push(Message::assistant(format!("[Conversation Summary] {}", summary)));
                        self.evicted_since_last_summary = 0;
                    }
                    Ok(_) => {
                        warn!("summarizer returned no meaningful text, falling back to plain eviction");
                    }
                    Err(err) => {
                        warn!(error = %err, "summarizer failed, falling back to plain eviction");
                    }
                }
            }
        }

        new_messages.extend(tail);

        let preserved = new_messages.len();
        let evicted = total - preserved;
        *messages = new_messages;

        ConversationMetrics {
            total_messages: total,
            preserved_messages: preserved,
            evicted_messages: evicted,
            estimated_tokens: messages.iter().map(Message::estimated_tokens).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("message {}", i))).collect()
    }

    #[tokio::test]
    async fn noop_when_under_limit() {
        let mut window = ConversationWindow::new(100, 5, 20);
        let mut msgs = messages(10);
        let metrics = window.trim(&mut msgs, None).await;
        assert_eq!(metrics.evicted_messages, 0);
        assert_eq!(msgs.len(), 10);
    }

    #[tokio::test]
    async fn noop_when_exactly_at_limit() {
        let mut window = ConversationWindow::new(10, 5, 20);
        let mut msgs = messages(10);
        let metrics = window.trim(&mut msgs, None).await;
        assert_eq!(metrics.evicted_messages, 0);
    }

    #[tokio::test]
    async fn preserves_head_and_tail() {
        let mut window = ConversationWindow::new(10, 2, 3);
        let mut msgs = messages(20);
        let metrics = window.trim(&mut msgs, None).await;
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[0].content, "message 0");
        assert_eq!(msgs[1].content, "message 1");
        assert_eq!(msgs[2].content, "message 17");
        assert_eq!(msgs[4].content, "message 19");
        assert_eq!(metrics.evicted_messages, 15);
    }

    struct StubSummarizer;

    #[async_trait::async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, _instruction: &str, _messages: &[Message]) -> anyhow::Result<String> {
            Ok("files read: a.rs; decision: use trait X".to_string())
        }
    }

    #[tokio::test]
    async fn summarizes_evicted_messages_when_enabled() {
        let mut window = ConversationWindow::new(10, 2, 3).with_summarization(1);
        let mut msgs = messages(20);
        let summarizer = StubSummarizer;
        window.trim(&mut msgs, Some(&summarizer)).await;
        assert!(msgs.iter().any(|m| m.content.starts_with("[Conversation Summary]")));
    }

    struct FailingSummarizer;

    #[async_trait::async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _instruction: &str, _messages: &[Message]) -> anyhow::Result<String> {
            anyhow::bail!("timeout")
        }
    }

    #[tokio::test]
    async fn falls_back_silently_on_summarizer_failure() {
        let mut window = ConversationWindow::new(10, 2, 3).with_summarization(1);
        let mut msgs = messages(20);
        let summarizer = FailingSummarizer;
        let metrics = window.trim(&mut msgs, Some(&summarizer)).await;
        assert!(!msgs.iter().any(|m| m.content.starts_with("[Conversation Summary]")));
        assert_eq!(metrics.preserved_messages, 5);
    }
}
