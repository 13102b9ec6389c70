//! Tool-call state machine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ToolCallError;

/// Status of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Proposed, waiting for a decision.
    Pending,
    /// Approved, not yet started.
    Approved,
    /// Rejected by the user.
    Denied,
    /// Running on its tool server.
    Executing,
    /// Finished successfully.
    Executed,
    /// Finished with a failure.
    Error,
}

impl ToolCallStatus {
    /// All statuses, for exhaustive checks.
    pub const ALL: [ToolCallStatus; 6] = [
        Self::Pending,
        Self::Approved,
        Self::Denied,
        Self::Executing,
        Self::Executed,
        Self::Error,
    ];

    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: ToolCallStatus) -> bool {
        use ToolCallStatus::*;

        matches!(
            (self, target),
            // From Pending
            (Pending, Approved) | (Pending, Denied) |
            // From Approved
            (Approved, Executing) |
            // From Executing
            (Executing, Executed) | (Executing, Error) |
            // Explicit reset
            (Approved, Pending) | (Denied, Pending) |
            (Executed, Pending) | (Error, Pending)
        )
    }

    /// Finished executing, one way or the other. `Denied` is not terminal:
    /// a denied call never ran and can still be reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Error)
    }
}

impl std::fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Where a tool call came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCallOrigin {
    /// Proposed by a completion stream and executed in-process.
    Direct,
    /// Raised by the task orchestrator; decisions are routed back by approval id.
    Delegated { approval_id: String },
}

impl ToolCallOrigin {
    pub fn is_delegated(&self) -> bool {
        matches!(self, Self::Delegated { .. })
    }
}

/// One tool invocation owned by a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function_name: String,
    /// Structured arguments, or a JSON string the executor parses.
    pub arguments: serde_json::Value,
    pub server_id: String,
    pub status: ToolCallStatus,
    /// Present only once executed or errored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub description: String,
    pub origin: ToolCallOrigin,
}

impl ToolCall {
    /// A new pending, direct call.
    pub fn new(
        id: impl Into<String>,
        function_name: impl Into<String>,
        arguments: serde_json::Value,
        server_id: impl Into<String>,
    ) -> Self {
        let function_name = function_name.into();
        Self {
            id: id.into(),
            description: format!("Call {}", function_name),
            function_name,
            arguments,
            server_id: server_id.into(),
            status: ToolCallStatus::Pending,
            result: None,
            duration_secs: None,
            origin: ToolCallOrigin::Direct,
        }
    }

    /// Mark the call as raised by the task orchestrator.
    pub fn delegated(mut self, approval_id: impl Into<String>) -> Self {
        self.origin = ToolCallOrigin::Delegated {
            approval_id: approval_id.into(),
        };
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Move to a new status, rejecting edges outside the transition graph.
    ///
    /// A rejected transition leaves the call untouched. Moving back to
    /// `Pending` clears any recorded result.
    pub fn transition_to(&mut self, target: ToolCallStatus) -> Result<(), ToolCallError> {
        if !self.status.can_transition_to(target) {
            return Err(ToolCallError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        if target == ToolCallStatus::Pending {
            self.result = None;
            self.duration_secs = None;
        }
        Ok(())
    }

    /// `Executing -> Executed` with the payload and elapsed time.
    pub fn complete(
        &mut self,
        result: serde_json::Value,
        duration_secs: f64,
    ) -> Result<(), ToolCallError> {
        self.transition_to(ToolCallStatus::Executed)?;
        self.result = Some(result);
        self.duration_secs = Some(duration_secs);
        Ok(())
    }

    /// `Executing -> Error` with a diagnostic and elapsed time.
    pub fn fail(
        &mut self,
        diagnostic: impl Into<String>,
        duration_secs: f64,
    ) -> Result<(), ToolCallError> {
        self.transition_to(ToolCallStatus::Error)?;
        self.result = Some(serde_json::Value::String(diagnostic.into()));
        self.duration_secs = Some(duration_secs);
        Ok(())
    }

    /// Whether the call carries a non-empty result.
    pub fn has_result(&self) -> bool {
        match &self.result {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(serde_json::Value::Array(a)) => !a.is_empty(),
            Some(serde_json::Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }
}

/// Per-server auto-approve settings, passed in with every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    auto_approve: HashMap<String, bool>,
}

impl ApprovalPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_approve(mut self, server_id: impl Into<String>, enabled: bool) -> Self {
        self.auto_approve.insert(server_id.into(), enabled);
        self
    }

    /// Unknown servers are never auto-approved.
    pub fn is_auto_approved(&self, server_id: &str) -> bool {
        self.auto_approve.get(server_id).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ToolCallStatus::*;

    #[test]
    fn test_transition_graph_is_closed() {
        let allowed = [
            (Pending, Approved),
            (Pending, Denied),
            (Approved, Executing),
            (Executing, Executed),
            (Executing, Error),
            (Approved, Pending),
            (Denied, Pending),
            (Executed, Pending),
            (Error, Pending),
        ];

        for from in ToolCallStatus::ALL {
            for to in ToolCallStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_rejected_transition_leaves_state_untouched() {
        let mut call = ToolCall::new("c1", "search", serde_json::json!({}), "srv");
        let err = call.transition_to(Executing).unwrap_err();
        assert!(matches!(
            err,
            ToolCallError::InvalidTransition {
                from: Pending,
                to: Executing,
                ..
            }
        ));
        assert_eq!(call.status, Pending);
    }

    #[test]
    fn test_terminal_states() {
        assert!(Executed.is_terminal());
        assert!(Error.is_terminal());
        assert!(!Denied.is_terminal());
        assert!(!Executing.is_terminal());
    }

    #[test]
    fn test_complete_records_result_and_reset_clears_it() {
        let mut call = ToolCall::new("c1", "search", serde_json::json!({}), "srv");
        call.transition_to(Approved).unwrap();
        call.transition_to(Executing).unwrap();
        call.complete(serde_json::json!({"hits": 3}), 0.25).unwrap();
        assert_eq!(call.status, Executed);
        assert!(call.has_result());
        assert_eq!(call.duration_secs, Some(0.25));

        call.transition_to(Pending).unwrap();
        assert!(call.result.is_none());
        assert!(call.duration_secs.is_none());
    }

    #[test]
    fn test_has_result_ignores_empty_payloads() {
        let mut call = ToolCall::new("c1", "t", serde_json::json!({}), "srv");
        for empty in [
            serde_json::Value::Null,
            serde_json::json!(""),
            serde_json::json!([]),
            serde_json::json!({}),
        ] {
            call.result = Some(empty);
            assert!(!call.has_result());
        }
        call.result = Some(serde_json::json!(false));
        assert!(call.has_result());
    }

    #[test]
    fn test_origin_serializes_with_tag() {
        let call = ToolCall::new("c1", "t", serde_json::json!({}), "srv").delegated("ap-1");
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["origin"]["kind"], "delegated");
        assert_eq!(json["origin"]["approval_id"], "ap-1");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_approval_policy_defaults_to_manual() {
        let policy = ApprovalPolicy::new().with_auto_approve("fs", true);
        assert!(policy.is_auto_approved("fs"));
        assert!(!policy.is_auto_approved("web"));
    }
}
