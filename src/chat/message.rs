//! Chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::ToolCall;

/// Delivery/generation status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Placeholder, still being generated.
    Pending,
    /// Sent by a user.
    Sent,
    /// Assistant response finished.
    Completed,
    /// Assistant response failed.
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A participant: a user or an assistant agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id: id.into(),
            display_name: username.clone(),
            username,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: String,
    pub emoji: String,
}

/// One chat message. Assistant messages own their tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: String,
    pub sender_id: String,
    pub sender: Identity,
    pub text: String,
    pub status: MessageStatus,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_status(
        chat_id: impl Into<String>,
        sender: &Identity,
        text: String,
        status: MessageStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id: chat_id.into(),
            sender_id: sender.id.clone(),
            sender: sender.clone(),
            text,
            status,
            tool_calls: Vec::new(),
            reactions: Vec::new(),
            reply_to: None,
            created_at: Utc::now(),
        }
    }

    /// A message sent by a user.
    pub fn user(chat_id: impl Into<String>, sender: &Identity, text: impl Into<String>) -> Self {
        Self::with_status(chat_id, sender, text.into(), MessageStatus::Sent)
    }

    /// An empty, pending assistant placeholder.
    pub fn placeholder(chat_id: impl Into<String>, assistant: &Identity) -> Self {
        Self::with_status(chat_id, assistant, String::new(), MessageStatus::Pending)
    }

    pub fn replying_to(mut self, message_id: Uuid) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|c| c.id == id)
    }

    pub fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCall> {
        self.tool_calls.iter_mut().find(|c| c.id == id)
    }

    /// Whether this message can appear in a conversation transcript.
    pub fn is_transcript_eligible(&self) -> bool {
        !self.text.trim().is_empty()
            && matches!(self.status, MessageStatus::Sent | MessageStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_pending_and_empty() {
        let bot = Identity::new("bot", "helper");
        let msg = Message::placeholder("chat", &bot);
        assert_eq!(msg.status, MessageStatus::Pending);
        assert!(msg.text.is_empty());
        assert_eq!(msg.sender_id, "bot");
        assert!(!msg.is_transcript_eligible());
    }

    #[test]
    fn test_transcript_eligibility() {
        let user = Identity::new("u", "alice");
        let mut msg = Message::user("chat", &user, "hi");
        assert!(msg.is_transcript_eligible());
        msg.status = MessageStatus::Failed;
        assert!(!msg.is_transcript_eligible());
        msg.status = MessageStatus::Completed;
        msg.text = "   ".into();
        assert!(!msg.is_transcript_eligible());
    }
}
