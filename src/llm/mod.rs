//! Completion service integration.
//!
//! The orchestrator only depends on [`CompletionService`]; the
//! OpenAI-compatible client is the one concrete backend shipped here.

mod openai_compatible_chat;
mod provider;

pub use openai_compatible_chat::OpenAiCompatibleCompletion;
pub use provider::{
    ChatMessage, CompletionRequest, CompletionService, CompletionStream, ModelSelection,
    ProposedToolCall, Role, StreamEvent, collect_text,
};
