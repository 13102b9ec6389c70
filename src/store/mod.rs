//! Message and tool-call persistence collaborator.
//!
//! Persistence is external; the orchestrator reports every write here and
//! logs (but otherwise ignores) failures so a flaky store never fails a
//! response.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::chat::{Message, MessageStatus};
use crate::error::StoreError;
use crate::tools::{ToolCall, ToolCallStatus};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// A new message was created.
    async fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    /// An existing message changed (text, status, tool calls).
    async fn update_message(&self, message: &Message) -> Result<(), StoreError>;

    /// One tool call changed.
    async fn update_tool_call(&self, message_id: Uuid, call: &ToolCall) -> Result<(), StoreError>;
}

/// One recorded store write.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Append {
        message_id: Uuid,
        status: MessageStatus,
    },
    UpdateMessage {
        message_id: Uuid,
        status: MessageStatus,
        text: String,
    },
    UpdateToolCall {
        message_id: Uuid,
        tool_call_id: String,
        status: ToolCallStatus,
    },
}

/// Records every write in order.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    ops: Mutex<Vec<StoreOp>>,
    failing: AtomicBool,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (after recording it).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, message_id: Uuid, op: StoreOp) -> Result<(), StoreError> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).push(op);
        if self.failing.load(Ordering::Relaxed) {
            return Err(StoreError::WriteFailed {
                message_id,
                reason: "store unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        self.record(
            message.id,
            StoreOp::Append {
                message_id: message.id,
                status: message.status,
            },
        )
    }

    async fn update_message(&self, message: &Message) -> Result<(), StoreError> {
        self.record(
            message.id,
            StoreOp::UpdateMessage {
                message_id: message.id,
                status: message.status,
                text: message.text.clone(),
            },
        )
    }

    async fn update_tool_call(&self, message_id: Uuid, call: &ToolCall) -> Result<(), StoreError> {
        self.record(
            message_id,
            StoreOp::UpdateToolCall {
                message_id,
                tool_call_id: call.id.clone(),
                status: call.status,
            },
        )
    }
}
