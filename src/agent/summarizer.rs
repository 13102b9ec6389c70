//! Summarizes finished tool results into a follow-up assistant message.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::chat::{ChatState, Message, MessageStatus};
use crate::llm::{ChatMessage, CompletionRequest, CompletionService, ModelSelection, collect_text};
use crate::store::MessageStore;
use crate::tools::ToolCall;

const SUMMARY_SYSTEM_PROMPT: &str = "\
You summarize the results of tool calls for the user. Explain what each tool \
found or did in plain language, point out failures and what they mean, and \
keep it short. Do not invent results that are not shown.";

/// Text of the placeholder written when summarization fails.
pub const SUMMARY_FAILED_TEXT: &str =
    "Sorry, I couldn't summarize the tool results. The raw results are shown above.";

/// Ready when every call finished and at least one carries a result.
pub fn is_ready(message: &Message) -> bool {
    !message.tool_calls.is_empty()
        && message.tool_calls.iter().all(|c| c.status.is_terminal())
        && message.tool_calls.iter().any(ToolCall::has_result)
}

/// Drops a message id from the in-flight set when the summary settles.
struct SummaryGuard<'a> {
    in_flight: &'a Mutex<HashSet<Uuid>>,
    message_id: Uuid,
}

impl<'a> SummaryGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<Uuid>>, message_id: Uuid) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(message_id);
        inserted.then_some(Self {
            in_flight,
            message_id,
        })
    }
}

impl Drop for SummaryGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.message_id);
    }
}

/// Fires at most once per message.
///
/// A message counts as summarized once a reply to it exists in chat state;
/// the in-flight set only covers the window before that reply is inserted.
pub struct ResultSummarizer {
    completion: Arc<dyn CompletionService>,
    chats: Arc<ChatState>,
    store: Arc<dyn MessageStore>,
    max_result_chars: usize,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl ResultSummarizer {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        chats: Arc<ChatState>,
        store: Arc<dyn MessageStore>,
        max_result_chars: usize,
    ) -> Self {
        Self {
            completion,
            chats,
            store,
            max_result_chars,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn has_fired(&self, message_id: Uuid) -> bool {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&message_id);
        in_flight || self.chats.has_reply(message_id).await
    }

    /// Summarize `message_id` if it is ready and has not been summarized.
    ///
    /// Returns the id of the inserted summary (or failure placeholder).
    pub async fn evaluate(&self, message_id: Uuid, model: &ModelSelection) -> Option<Uuid> {
        let message = self.chats.get(message_id).await?;
        if !is_ready(&message) {
            return None;
        }

        // Claimed before the reply check so concurrent evaluations cannot both fire.
        let _guard = SummaryGuard::acquire(&self.in_flight, message_id)?;
        if self.chats.has_reply(message_id).await {
            return None;
        }

        tracing::debug!(
            message_id = %message_id,
            tool_calls = message.tool_calls.len(),
            "Summarizing tool results"
        );

        let request = CompletionRequest::new(
            model,
            vec![
                ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
                ChatMessage::user(self.format_results(&message)),
            ],
        );

        let mut summary = Message::placeholder(message.chat_id.clone(), &message.sender)
            .replying_to(message_id);
        match self.summarize(request).await {
            Ok(text) if !text.trim().is_empty() => {
                summary.text = text;
                summary.status = MessageStatus::Completed;
            }
            Ok(_) => {
                tracing::warn!(message_id = %message_id, "Summary completion returned no text");
                summary.text = SUMMARY_FAILED_TEXT.to_string();
                summary.status = MessageStatus::Failed;
            }
            Err(e) => {
                tracing::warn!(message_id = %message_id, error = %e, "Tool result summarization failed");
                summary.text = SUMMARY_FAILED_TEXT.to_string();
                summary.status = MessageStatus::Failed;
            }
        }

        let summary_id = summary.id;
        if let Err(e) = self.store.append_message(&summary).await {
            tracing::warn!(message_id = %summary_id, error = %e, "Failed to persist summary");
        }
        self.chats.insert_after(message_id, summary).await;
        Some(summary_id)
    }

    async fn summarize(
        &self,
        request: CompletionRequest,
    ) -> Result<String, crate::error::CompletionError> {
        let stream = self.completion.stream(request).await?;
        collect_text(stream).await
    }

    fn format_results(&self, message: &Message) -> String {
        let mut out = String::new();
        if !message.text.trim().is_empty() {
            let _ = writeln!(out, "Assistant said before calling tools:\n{}\n", message.text);
        }
        out.push_str("Tool results:\n");
        for (i, call) in message.tool_calls.iter().enumerate() {
            let _ = writeln!(
                out,
                "\n### {}. {} ({}, {:.2}s)",
                i + 1,
                call.function_name,
                call.status,
                call.duration_secs.unwrap_or_default()
            );
            let rendered = match &call.result {
                None | Some(serde_json::Value::Null) => "(no result)".to_string(),
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => {
                    serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
                }
            };
            let _ = writeln!(out, "{}", truncate_chars(&rendered, self.max_result_chars));
        }
        out
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}... [truncated]", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Identity;
    use crate::store::InMemoryMessageStore;
    use crate::testing::StubCompletion;
    use crate::tools::ToolCallStatus;

    fn finished(id: &str, status: ToolCallStatus, result: serde_json::Value) -> ToolCall {
        let mut call = ToolCall::new(id, "lookup", serde_json::json!({}), "srv");
        call.transition_to(ToolCallStatus::Approved).unwrap();
        call.transition_to(ToolCallStatus::Executing).unwrap();
        match status {
            ToolCallStatus::Executed => call.complete(result, 0.5).unwrap(),
            _ => call.fail(result.as_str().unwrap_or("failed"), 0.5).unwrap(),
        }
        call
    }

    async fn setup(
        completion: Arc<StubCompletion>,
        calls: Vec<ToolCall>,
    ) -> (ResultSummarizer, Arc<ChatState>, Uuid) {
        let chats = Arc::new(ChatState::new());
        let mut message = Message::placeholder("c", &Identity::new("bot", "bot"));
        message.tool_calls = calls;
        let id = message.id;
        chats.push(message).await;
        let summarizer = ResultSummarizer::new(
            completion,
            chats.clone(),
            Arc::new(InMemoryMessageStore::new()),
            2000,
        );
        (summarizer, chats, id)
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé... [truncated]");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }

    #[tokio::test]
    async fn test_fires_once_and_inserts_after_message() {
        let completion = Arc::new(StubCompletion::new("All good."));
        let (summarizer, chats, id) = setup(
            completion.clone(),
            vec![
                finished("a", ToolCallStatus::Executed, serde_json::json!({"n": 1})),
                finished("b", ToolCallStatus::Error, serde_json::json!("timeout")),
            ],
        )
        .await;
        let model = ModelSelection::new("m", "p");

        let summary_id = summarizer.evaluate(id, &model).await.unwrap();
        assert!(summarizer.evaluate(id, &model).await.is_none());
        assert_eq!(completion.calls(), 1);
        assert!(summarizer.has_fired(id).await);
        assert!(summarizer.in_flight.lock().unwrap().is_empty());

        let messages = chats.messages("c").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, summary_id);
        assert_eq!(messages[1].text, "All good.");
        assert_eq!(messages[1].status, MessageStatus::Completed);

        let prompt = &completion.requests()[0].messages[1].content;
        assert!(prompt.contains("lookup (executed, 0.50s)"));
        assert!(prompt.contains("lookup (error, 0.50s)"));
        assert!(prompt.contains("timeout"));
    }

    #[tokio::test]
    async fn test_concurrent_evaluations_fire_once() {
        let completion = Arc::new(StubCompletion::new("Done."));
        let (summarizer, chats, id) = setup(
            completion.clone(),
            vec![finished("a", ToolCallStatus::Executed, serde_json::json!("r"))],
        )
        .await;
        let model = ModelSelection::new("m", "p");

        let (a, b) = tokio::join!(
            summarizer.evaluate(id, &model),
            summarizer.evaluate(id, &model)
        );
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
        assert_eq!(completion.calls(), 1);
        assert_eq!(chats.messages("c").await.len(), 2);
        assert!(summarizer.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_does_not_fire_until_all_terminal() {
        let completion = Arc::new(StubCompletion::new("x"));
        let pending = ToolCall::new("p", "lookup", serde_json::json!({}), "srv");
        let (summarizer, _chats, id) = setup(
            completion.clone(),
            vec![
                finished("a", ToolCallStatus::Executed, serde_json::json!("r")),
                pending,
            ],
        )
        .await;
        assert!(
            summarizer
                .evaluate(id, &ModelSelection::new("m", "p"))
                .await
                .is_none()
        );
        assert!(!summarizer.has_fired(id).await);
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_does_not_fire_without_results() {
        let completion = Arc::new(StubCompletion::new("x"));
        let (summarizer, _chats, id) = setup(
            completion.clone(),
            vec![finished("a", ToolCallStatus::Executed, serde_json::json!([]))],
        )
        .await;
        assert!(
            summarizer
                .evaluate(id, &ModelSelection::new("m", "p"))
                .await
                .is_none()
        );
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_writes_failed_placeholder() {
        let completion = Arc::new(StubCompletion::new("x"));
        completion.set_failing(true);
        let (summarizer, chats, id) = setup(
            completion,
            vec![finished("a", ToolCallStatus::Executed, serde_json::json!("r"))],
        )
        .await;

        let summary_id = summarizer
            .evaluate(id, &ModelSelection::new("m", "p"))
            .await
            .unwrap();
        let summary = chats.get(summary_id).await.unwrap();
        assert_eq!(summary.status, MessageStatus::Failed);
        assert_eq!(summary.text, SUMMARY_FAILED_TEXT);
    }
}
