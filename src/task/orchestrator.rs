//! Task orchestrator collaborator used by Agent mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chat::SwarmLimits;
use crate::error::TaskError;
use crate::tools::ToolDescriptor;

/// Options for one delegated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    pub model: String,
    pub provider: String,
    pub tools: Vec<ToolDescriptor>,
    pub system_prompt: String,
    /// Correlates approvals and cleanup for this task.
    pub thread_id: String,
    pub limits: SwarmLimits,
    pub knowledge_bases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_description: String,
    pub options: TaskOptions,
}

/// What a delegated task produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    #[serde(default)]
    pub result: Option<String>,
    /// The task is paused waiting for a human decision.
    #[serde(default)]
    pub requires_human_interaction: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn completed(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            ..Default::default()
        }
    }

    pub fn awaiting_human() -> Self {
        Self {
            success: true,
            requires_human_interaction: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Runs multi-agent tasks out of process.
#[async_trait]
pub trait TaskOrchestrator: Send + Sync {
    async fn run_task(&self, request: TaskRequest) -> Result<TaskOutcome, TaskError>;

    /// Route a human approval decision back to the paused task.
    async fn respond_to_approval(&self, approval_id: &str, approved: bool)
    -> Result<(), TaskError>;

    async fn abort_task(&self, task_id: &str) -> Result<(), TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let done = TaskOutcome::completed("ok");
        assert!(done.success && !done.requires_human_interaction);
        assert!(TaskOutcome::awaiting_human().requires_human_interaction);
        let failed = TaskOutcome::failed("nope");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("nope"));
    }

    #[test]
    fn test_outcome_deserializes_sparse_payload() {
        let outcome: TaskOutcome =
            serde_json::from_value(serde_json::json!({"success": true, "result": "r"})).unwrap();
        assert_eq!(outcome, TaskOutcome::completed("r"));
    }
}
