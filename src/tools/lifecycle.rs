//! Tool-call lifecycle: approval, auto-approval, execution and remote updates.
//!
//! Direct calls (proposed by a completion stream) live in chat state only.
//! Delegated calls (raised by the task orchestrator) also forward decisions
//! back to the orchestrator and persist every change through the message
//! store; their execution happens remotely and arrives as push updates.
//!
//! Two in-flight markers are consulted before any state change: "deciding"
//! (one approve, deny or auto-approval per call at a time, so a delegated
//! decision reaches the task orchestrator only once) and "executing" (one
//! execution per call). Markers are dropped as soon as the action settles;
//! the call's status carries the outcome from then on, so a call is
//! auto-approved at most once until it is reset to `pending`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::ChatState;
use crate::error::{ConfigError, Error, ToolCallError};
use crate::store::MessageStore;
use crate::task::TaskOrchestrator;
use crate::tools::executor::execute_tool_call;
use crate::tools::log::ToolLogSink;
use crate::tools::registry::ToolServerPool;
use crate::tools::state::{ApprovalPolicy, ToolCall, ToolCallOrigin, ToolCallStatus};

type CallKey = (Uuid, String);

/// A status change pushed by the task orchestrator for a delegated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolCallUpdate {
    pub status: ToolCallStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// Holds a key in an in-flight set and removes it when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<CallKey>>,
    key: CallKey,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<CallKey>>, key: CallKey) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone());
        inserted.then_some(Self { set, key })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

pub struct ToolCallLifecycle {
    chats: Arc<ChatState>,
    store: Arc<dyn MessageStore>,
    tasks: Option<Arc<dyn TaskOrchestrator>>,
    pool: Arc<ToolServerPool>,
    log: Arc<dyn ToolLogSink>,
    deciding: Mutex<HashSet<CallKey>>,
    executing: Mutex<HashSet<CallKey>>,
}

impl ToolCallLifecycle {
    pub fn new(
        chats: Arc<ChatState>,
        store: Arc<dyn MessageStore>,
        tasks: Option<Arc<dyn TaskOrchestrator>>,
        pool: Arc<ToolServerPool>,
        log: Arc<dyn ToolLogSink>,
    ) -> Self {
        Self {
            chats,
            store,
            tasks,
            pool,
            log,
            deciding: Mutex::new(HashSet::new()),
            executing: Mutex::new(HashSet::new()),
        }
    }

    /// Attach a new call to a message. Ids must be unique within the message.
    pub async fn attach(&self, message_id: Uuid, call: ToolCall) -> Result<(), Error> {
        let snapshot = call.clone();
        self.chats
            .update(message_id, move |m| {
                if m.tool_call(&call.id).is_some() {
                    return Err(ToolCallError::IdCollision {
                        message_id,
                        id: call.id.clone(),
                    });
                }
                m.tool_calls.push(call);
                Ok(())
            })
            .await
            .ok_or(ToolCallError::MessageNotFound { message_id })??;

        tracing::debug!(
            message_id = %message_id,
            tool_call_id = %snapshot.id,
            tool = %snapshot.function_name,
            delegated = snapshot.origin.is_delegated(),
            "Tool call attached"
        );
        self.persist(message_id, &snapshot).await;
        Ok(())
    }

    /// Attach a call raised by the task orchestrator.
    pub async fn attach_delegated(&self, message_id: Uuid, call: ToolCall) -> Result<(), Error> {
        if !call.origin.is_delegated() {
            return Err(ToolCallError::NotDelegated { id: call.id }.into());
        }
        self.attach(message_id, call).await
    }

    pub async fn approve(&self, message_id: Uuid, id: &str) -> Result<ToolCall, Error> {
        self.decide(message_id, id, true).await
    }

    pub async fn deny(&self, message_id: Uuid, id: &str) -> Result<ToolCall, Error> {
        self.decide(message_id, id, false).await
    }

    /// Move a decided or finished call back to `pending`, where the
    /// approval policy applies again.
    pub async fn reset(&self, message_id: Uuid, id: &str) -> Result<ToolCall, Error> {
        let call = self
            .with_call(message_id, id, |call| {
                call.transition_to(ToolCallStatus::Pending)?;
                Ok(call.clone())
            })
            .await?;

        tracing::info!(message_id = %message_id, tool_call_id = %id, "Tool call reset");
        self.persist(message_id, &call).await;
        Ok(call)
    }

    /// Approve a pending call if its server is auto-approved and no other
    /// decision on it is in flight. Returns whether it approved.
    pub async fn maybe_auto_approve(
        &self,
        message_id: Uuid,
        id: &str,
        policy: &ApprovalPolicy,
    ) -> Result<bool, Error> {
        let call = self.snapshot(message_id, id).await?;
        if call.status != ToolCallStatus::Pending || !policy.is_auto_approved(&call.server_id) {
            return Ok(false);
        }

        match self.decide(message_id, id, true).await {
            Ok(_) => {
                tracing::debug!(
                    message_id = %message_id,
                    tool_call_id = %id,
                    server_id = %call.server_id,
                    "Tool call auto-approved"
                );
                Ok(true)
            }
            // Someone else is deciding, or already decided; theirs stands.
            Err(Error::ToolCall(
                ToolCallError::DecisionInFlight { .. } | ToolCallError::InvalidTransition { .. },
            )) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Execute an approved direct call.
    ///
    /// Fails with `AlreadyExecuting` if another execution of the same call
    /// is in flight. Tool failures are recorded on the call, not returned.
    pub async fn execute(&self, message_id: Uuid, id: &str) -> Result<ToolCall, Error> {
        let _guard = InFlightGuard::acquire(&self.executing, (message_id, id.to_string()))
            .ok_or_else(|| ToolCallError::AlreadyExecuting { id: id.to_string() })?;

        let call = self
            .with_call(message_id, id, |call| {
                if call.origin.is_delegated() {
                    return Err(ToolCallError::ExecutesRemotely {
                        id: call.id.clone(),
                    });
                }
                call.transition_to(ToolCallStatus::Executing)?;
                Ok(call.clone())
            })
            .await?;

        let report = execute_tool_call(&self.pool, self.log.as_ref(), &call).await;

        let call = self
            .with_call(message_id, id, |call| {
                report.apply_to(call)?;
                Ok(call.clone())
            })
            .await?;

        tracing::info!(
            message_id = %message_id,
            tool_call_id = %id,
            tool = %call.function_name,
            status = %call.status,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Tool call finished"
        );
        Ok(call)
    }

    /// Auto-approve what the policy allows, then execute every approved
    /// direct call. Returns the message's calls afterwards.
    pub async fn process(
        &self,
        message_id: Uuid,
        policy: &ApprovalPolicy,
    ) -> Result<Vec<ToolCall>, Error> {
        let pending: Vec<String> = self
            .calls(message_id)
            .await?
            .into_iter()
            .filter(|c| c.status == ToolCallStatus::Pending)
            .map(|c| c.id)
            .collect();

        for id in &pending {
            if let Err(e) = self.maybe_auto_approve(message_id, id, policy).await {
                tracing::warn!(message_id = %message_id, tool_call_id = %id, error = %e, "Auto-approval failed");
            }
        }

        let runnable: Vec<String> = self
            .calls(message_id)
            .await?
            .into_iter()
            .filter(|c| c.status == ToolCallStatus::Approved && !c.origin.is_delegated())
            .map(|c| c.id)
            .collect();

        let results = join_all(runnable.iter().map(|id| self.execute(message_id, id))).await;
        for (id, result) in runnable.iter().zip(results) {
            match result {
                Ok(_) => {}
                Err(Error::ToolCall(ToolCallError::AlreadyExecuting { .. })) => {
                    tracing::debug!(tool_call_id = %id, "Tool call already executing, skipped");
                }
                Err(e) => {
                    tracing::warn!(message_id = %message_id, tool_call_id = %id, error = %e, "Tool call execution failed");
                }
            }
        }

        self.calls(message_id).await
    }

    /// Apply a status change pushed by the task orchestrator.
    pub async fn apply_remote_update(
        &self,
        message_id: Uuid,
        id: &str,
        update: RemoteToolCallUpdate,
    ) -> Result<ToolCall, Error> {
        let call = self
            .with_call(message_id, id, |call| {
                if !call.origin.is_delegated() {
                    return Err(ToolCallError::NotDelegated {
                        id: call.id.clone(),
                    });
                }
                call.transition_to(update.status)?;
                if update.status.is_terminal() {
                    call.result = update.result;
                    call.duration_secs = update.duration_secs;
                }
                Ok(call.clone())
            })
            .await?;

        tracing::debug!(
            message_id = %message_id,
            tool_call_id = %id,
            status = %call.status,
            "Applied remote tool call update"
        );
        self.persist(message_id, &call).await;
        Ok(call)
    }

    /// Current calls of a message.
    pub async fn calls(&self, message_id: Uuid) -> Result<Vec<ToolCall>, Error> {
        Ok(self
            .chats
            .get(message_id)
            .await
            .ok_or(ToolCallError::MessageNotFound { message_id })?
            .tool_calls)
    }

    /// Approve or deny a pending call. Delegated decisions are forwarded to
    /// the task orchestrator first; the local state only moves once it
    /// accepted. A second decision on the same call fails while one is in
    /// flight.
    async fn decide(&self, message_id: Uuid, id: &str, approved: bool) -> Result<ToolCall, Error> {
        let target = if approved {
            ToolCallStatus::Approved
        } else {
            ToolCallStatus::Denied
        };

        let _guard = InFlightGuard::acquire(&self.deciding, (message_id, id.to_string()))
            .ok_or_else(|| ToolCallError::DecisionInFlight { id: id.to_string() })?;

        let current = self.snapshot(message_id, id).await?;
        if !current.status.can_transition_to(target) {
            return Err(ToolCallError::InvalidTransition {
                id: id.to_string(),
                from: current.status,
                to: target,
            }
            .into());
        }

        if let ToolCallOrigin::Delegated { approval_id } = &current.origin {
            let tasks = self.tasks.as_ref().ok_or(ConfigError::NoTaskOrchestrator)?;
            tasks.respond_to_approval(approval_id, approved).await?;
        }

        let call = self
            .with_call(message_id, id, |call| {
                call.transition_to(target)?;
                Ok(call.clone())
            })
            .await?;

        tracing::info!(
            message_id = %message_id,
            tool_call_id = %id,
            status = %call.status,
            "Tool call decided"
        );
        self.persist(message_id, &call).await;
        Ok(call)
    }

    async fn snapshot(&self, message_id: Uuid, id: &str) -> Result<ToolCall, ToolCallError> {
        let message = self
            .chats
            .get(message_id)
            .await
            .ok_or(ToolCallError::MessageNotFound { message_id })?;
        message
            .tool_call(id)
            .cloned()
            .ok_or_else(|| ToolCallError::NotFound {
                message_id,
                id: id.to_string(),
            })
    }

    async fn with_call<R>(
        &self,
        message_id: Uuid,
        id: &str,
        f: impl FnOnce(&mut ToolCall) -> Result<R, ToolCallError>,
    ) -> Result<R, ToolCallError> {
        self.chats
            .update(message_id, |m| match m.tool_call_mut(id) {
                Some(call) => f(call),
                None => Err(ToolCallError::NotFound {
                    message_id,
                    id: id.to_string(),
                }),
            })
            .await
            .ok_or(ToolCallError::MessageNotFound { message_id })?
    }

    /// Delegated calls are persisted; direct calls stay local.
    async fn persist(&self, message_id: Uuid, call: &ToolCall) {
        if !call.origin.is_delegated() {
            return;
        }
        if let Err(e) = self.store.update_tool_call(message_id, call).await {
            tracing::warn!(
                message_id = %message_id,
                tool_call_id = %call.id,
                error = %e,
                "Failed to persist tool call"
            );
        }
    }
}
