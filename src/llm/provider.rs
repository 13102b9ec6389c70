//! Completion service trait and request/response types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CompletionError, ConfigError};
use crate::tools::ToolDescriptor;

/// Role of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged entry of a completion transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The model/provider pair a response is generated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub model: String,
    pub provider: String,
    /// Whether the provider understands knowledge-base fields.
    #[serde(default)]
    pub knowledge_bases: bool,
}

impl ModelSelection {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            knowledge_bases: false,
        }
    }

    /// Mark the provider as knowledge-base-aware.
    pub fn with_knowledge_bases(mut self, enabled: bool) -> Self {
        self.knowledge_bases = enabled;
        self
    }

    /// Reject empty model or provider names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::NoModelSelected);
        }
        if self.provider.trim().is_empty() {
            return Err(ConfigError::NoProviderSelected {
                model: self.model.clone(),
            });
        }
        Ok(())
    }
}

/// A streamed completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub provider: String,
    /// Identifier used for out-of-band abort.
    pub stream_id: String,
    /// Tools the model may propose calls for.
    pub tools: Vec<ToolDescriptor>,
    pub kb_ids: Option<Vec<String>>,
    pub workspace_id: Option<String>,
    pub top_k: Option<u32>,
    pub preferred_language: Option<String>,
}

impl CompletionRequest {
    /// Create a request with a fresh stream id.
    pub fn new(selection: &ModelSelection, messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: selection.model.clone(),
            provider: selection.provider.clone(),
            stream_id: Uuid::new_v4().to_string(),
            tools: Vec::new(),
            kb_ids: None,
            workspace_id: None,
            top_k: None,
            preferred_language: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// Attach knowledge-base retrieval parameters.
    pub fn with_knowledge(
        mut self,
        kb_ids: Vec<String>,
        top_k: u32,
        preferred_language: Option<String>,
    ) -> Self {
        self.kb_ids = Some(kb_ids);
        self.top_k = Some(top_k);
        self.preferred_language = preferred_language;
        self
    }

    pub fn with_workspace(mut self, workspace_id: Option<String>) -> Self {
        self.workspace_id = workspace_id;
        self
    }
}

/// A function call proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One item of a completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    ToolCall(ProposedToolCall),
}

pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, CompletionError>> + Send>>;

/// A streaming completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    /// Start a streamed completion.
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, CompletionError>;

    /// Abort an in-flight stream. Unknown ids are ignored.
    async fn abort(&self, stream_id: &str);
}

/// Drain a stream into its concatenated text, ignoring tool-call proposals.
pub async fn collect_text(mut stream: CompletionStream) -> Result<String, CompletionError> {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        if let StreamEvent::Text(chunk) = event? {
            text.push_str(&chunk);
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_selection_validation() {
        assert!(ModelSelection::new("gpt", "openai").validate().is_ok());
        assert!(matches!(
            ModelSelection::new("  ", "openai").validate(),
            Err(ConfigError::NoModelSelected)
        ));
        assert!(matches!(
            ModelSelection::new("gpt", "").validate(),
            Err(ConfigError::NoProviderSelected { .. })
        ));
    }

    #[test]
    fn requests_get_distinct_stream_ids() {
        let selection = ModelSelection::new("m", "p");
        let a = CompletionRequest::new(&selection, vec![]);
        let b = CompletionRequest::new(&selection, vec![]);
        assert_ne!(a.stream_id, b.stream_id);
        assert!(a.kb_ids.is_none());
    }

    #[tokio::test]
    async fn collect_text_concatenates_chunks() {
        let events: Vec<Result<StreamEvent, CompletionError>> = vec![
            Ok(StreamEvent::Text("Hel".into())),
            Ok(StreamEvent::ToolCall(ProposedToolCall {
                id: "c1".into(),
                name: "noop".into(),
                arguments: serde_json::json!({}),
            })),
            Ok(StreamEvent::Text("lo".into())),
        ];
        let stream: CompletionStream = Box::pin(futures::stream::iter(events));
        assert_eq!(collect_text(stream).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn collect_text_propagates_errors() {
        let events: Vec<Result<StreamEvent, CompletionError>> = vec![
            Ok(StreamEvent::Text("partial".into())),
            Err(CompletionError::RequestFailed {
                provider: "stub".into(),
                reason: "reset".into(),
            }),
        ];
        let stream: CompletionStream = Box::pin(futures::stream::iter(events));
        assert!(collect_text(stream).await.is_err());
    }
}
