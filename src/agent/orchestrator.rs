//! Response-mode orchestrator.
//!
//! Turns one user message into an assistant response: picks the mode from
//! the section, validates the model selection, runs the Ask/Query or Agent
//! strategy, then hands proposed tool calls to the lifecycle and the result
//! summarizer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::mode::Mode;
use crate::agent::summarizer::ResultSummarizer;
use crate::chat::{ChatState, Identity, Message, ModeContext};
use crate::config::OrchestratorConfig;
use crate::error::{ConfigError, Error, ToolCallError};
use crate::llm::{CompletionService, ModelSelection};
use crate::prompt::{PromptTemplates, RulesProvider, SystemPromptAssembler};
use crate::store::MessageStore;
use crate::task::{HumanLoopRegistry, InteractionTracker, TaskOrchestrator};
use crate::tools::{
    ApprovalPolicy, RemoteToolCallUpdate, ToolCall, ToolCallLifecycle, ToolCallOrigin, ToolCatalog,
    ToolLogSink, ToolRegistryResolver, ToolServerPool,
};

/// Collaborators the orchestrator is built from.
pub struct OrchestratorDeps {
    pub completion: Arc<dyn CompletionService>,
    pub tool_servers: Arc<ToolServerPool>,
    pub catalog: Arc<dyn ToolCatalog>,
    /// Required for Agent mode only.
    pub tasks: Option<Arc<dyn TaskOrchestrator>>,
    pub human_loop: Arc<dyn HumanLoopRegistry>,
    pub store: Arc<dyn MessageStore>,
    pub tool_log: Arc<dyn ToolLogSink>,
    pub rules: Arc<dyn RulesProvider>,
    pub templates: PromptTemplates,
    pub config: OrchestratorConfig,
}

/// One user message to respond to.
#[derive(Debug, Clone)]
pub struct RespondRequest {
    pub chat_id: String,
    pub user: Identity,
    pub assistant: Identity,
    pub text: String,
    pub context: ModeContext,
    /// Falls back to the orchestrator's default model.
    pub model: Option<ModelSelection>,
    pub approval_policy: ApprovalPolicy,
    /// Known up front so the caller can abort the stream.
    pub stream_id: String,
}

impl RespondRequest {
    pub fn new(
        chat_id: impl Into<String>,
        user: Identity,
        assistant: Identity,
        text: impl Into<String>,
        context: ModeContext,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            user,
            assistant,
            text: text.into(),
            context,
            model: None,
            approval_policy: ApprovalPolicy::default(),
            stream_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_model(mut self, model: ModelSelection) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval_policy = policy;
        self
    }
}

/// How a response ended. Every variant names the assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Completed { message_id: Uuid },
    /// The stream was aborted; the message is completed with a stop marker.
    Stopped { message_id: Uuid },
    Failed { message_id: Uuid, reason: String },
    /// The delegated task is waiting for a human decision.
    AwaitingHuman { message_id: Uuid, thread_id: String },
}

impl ResponseOutcome {
    pub fn message_id(&self) -> Uuid {
        match self {
            Self::Completed { message_id }
            | Self::Stopped { message_id }
            | Self::Failed { message_id, .. }
            | Self::AwaitingHuman { message_id, .. } => *message_id,
        }
    }
}

pub struct ResponseOrchestrator {
    pub(super) completion: Arc<dyn CompletionService>,
    pub(super) tasks: Option<Arc<dyn TaskOrchestrator>>,
    pub(super) store: Arc<dyn MessageStore>,
    pub(super) config: OrchestratorConfig,
    pub(super) chats: Arc<ChatState>,
    pub(super) prompts: SystemPromptAssembler,
    pub(super) resolver: ToolRegistryResolver,
    pub(super) lifecycle: Arc<ToolCallLifecycle>,
    pub(super) summarizer: Arc<ResultSummarizer>,
    pub(super) interactions: InteractionTracker,
    pub(super) streams: Mutex<HashMap<String, CancellationToken>>,
    default_model: Option<ModelSelection>,
}

impl ResponseOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self::with_chat_state(deps, Arc::new(ChatState::new()))
    }

    /// Build on top of existing chat state.
    pub fn with_chat_state(deps: OrchestratorDeps, chats: Arc<ChatState>) -> Self {
        let lifecycle = Arc::new(ToolCallLifecycle::new(
            Arc::clone(&chats),
            Arc::clone(&deps.store),
            deps.tasks.clone(),
            Arc::clone(&deps.tool_servers),
            Arc::clone(&deps.tool_log),
        ));
        let summarizer = Arc::new(ResultSummarizer::new(
            Arc::clone(&deps.completion),
            Arc::clone(&chats),
            Arc::clone(&deps.store),
            deps.config.summary_max_result_chars,
        ));
        let interactions = InteractionTracker::new(deps.human_loop, Arc::clone(&chats));

        Self {
            completion: deps.completion,
            tasks: deps.tasks,
            store: deps.store,
            config: deps.config,
            prompts: SystemPromptAssembler::new(deps.templates, deps.rules),
            resolver: ToolRegistryResolver::new(deps.catalog),
            lifecycle,
            summarizer,
            interactions,
            chats,
            streams: Mutex::new(HashMap::new()),
            default_model: None,
        }
    }

    /// Model used when a request does not name one.
    pub fn with_default_model(mut self, model: ModelSelection) -> Self {
        self.default_model = Some(model);
        self
    }

    pub fn chats(&self) -> &Arc<ChatState> {
        &self.chats
    }

    pub fn lifecycle(&self) -> &Arc<ToolCallLifecycle> {
        &self.lifecycle
    }

    pub fn interactions(&self) -> &InteractionTracker {
        &self.interactions
    }

    /// Respond to one user message.
    ///
    /// Configuration problems fail before any message is written. Remote
    /// failures become a failed assistant message, never an `Err`. Proposed
    /// tool calls are only auto-approved and run when the response completed.
    pub async fn respond(&self, request: RespondRequest) -> Result<ResponseOutcome, Error> {
        let model = self.resolve_model(request.model.as_ref())?;
        let mode = Mode::for_section(request.context.section);
        if mode == Mode::Agent && self.tasks.is_none() {
            return Err(ConfigError::NoTaskOrchestrator.into());
        }

        tracing::info!(
            chat_id = %request.chat_id,
            mode = %mode,
            model = %model.model,
            provider = %model.provider,
            "Responding to message"
        );

        match mode {
            Mode::Ask | Mode::Query => {
                let outcome = self.run_completion(&request, mode, &model).await;
                let ResponseOutcome::Completed { message_id } = outcome else {
                    // Calls proposed before a stop or failure wait for a manual decision.
                    return Ok(outcome);
                };
                let has_calls = self
                    .chats
                    .get(message_id)
                    .await
                    .is_some_and(|m| !m.tool_calls.is_empty());
                if has_calls {
                    if let Err(e) = self
                        .lifecycle
                        .process(message_id, &request.approval_policy)
                        .await
                    {
                        tracing::warn!(message_id = %message_id, error = %e, "Tool call processing failed");
                    }
                    self.summarizer.evaluate(message_id, &model).await;
                }
                Ok(outcome)
            }
            Mode::Agent => self.run_delegated(&request, &model).await,
        }
    }

    /// Abort an in-flight completion stream. Returns false for unknown ids.
    pub async fn abort(&self, stream_id: &str) -> bool {
        let token = self
            .streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(stream_id)
            .cloned();
        let Some(token) = token else {
            return false;
        };
        tracing::info!(stream_id = %stream_id, "Aborting response stream");
        token.cancel();
        self.completion.abort(stream_id).await;
        true
    }

    /// Approve a call and, if it is direct, execute it.
    pub async fn approve_tool_call(
        &self,
        message_id: Uuid,
        id: &str,
        model: &ModelSelection,
    ) -> Result<ToolCall, Error> {
        let mut call = self.lifecycle.approve(message_id, id).await?;
        if !call.origin.is_delegated() {
            call = self.lifecycle.execute(message_id, id).await?;
        }
        self.summarizer.evaluate(message_id, model).await;
        Ok(call)
    }

    pub async fn deny_tool_call(&self, message_id: Uuid, id: &str) -> Result<ToolCall, Error> {
        self.lifecycle.deny(message_id, id).await
    }

    pub async fn reset_tool_call(&self, message_id: Uuid, id: &str) -> Result<ToolCall, Error> {
        self.lifecycle.reset(message_id, id).await
    }

    /// Auto-approve, execute approved calls, then consider summarizing.
    pub async fn process_tool_calls(
        &self,
        message_id: Uuid,
        policy: &ApprovalPolicy,
        model: &ModelSelection,
    ) -> Result<Vec<ToolCall>, Error> {
        let calls = self.lifecycle.process(message_id, policy).await?;
        self.summarizer.evaluate(message_id, model).await;
        Ok(calls)
    }

    /// Attach an approval request raised by a delegated task.
    pub async fn attach_delegated_tool_call(
        &self,
        message_id: Uuid,
        thread_id: &str,
        call: ToolCall,
    ) -> Result<(), Error> {
        let approval_id = match &call.origin {
            ToolCallOrigin::Delegated { approval_id } => approval_id.clone(),
            ToolCallOrigin::Direct => {
                return Err(ToolCallError::NotDelegated { id: call.id }.into());
            }
        };
        self.lifecycle.attach_delegated(message_id, call).await?;
        self.interactions
            .registry()
            .register(thread_id, &approval_id)
            .await;
        Ok(())
    }

    /// Apply a push update for a delegated call, then consider summarizing.
    pub async fn apply_remote_tool_update(
        &self,
        message_id: Uuid,
        id: &str,
        update: RemoteToolCallUpdate,
        model: &ModelSelection,
    ) -> Result<ToolCall, Error> {
        let call = self
            .lifecycle
            .apply_remote_update(message_id, id, update)
            .await?;
        self.summarizer.evaluate(message_id, model).await;
        Ok(call)
    }

    /// The human answered; clean up the thread's interaction state now.
    pub fn resolve_interaction(&self, thread_id: &str) -> bool {
        self.interactions.resolve(thread_id)
    }

    /// Cancel a delegated task through the task orchestrator.
    pub async fn abort_agent_task(&self, thread_id: &str) -> Result<(), Error> {
        let tasks = self.tasks.as_ref().ok_or(ConfigError::NoTaskOrchestrator)?;
        tasks.abort_task(thread_id).await?;
        self.interactions.resolve(thread_id);
        tracing::info!(thread_id = %thread_id, "Agent task aborted");
        Ok(())
    }

    fn resolve_model(&self, requested: Option<&ModelSelection>) -> Result<ModelSelection, Error> {
        let model = requested
            .or(self.default_model.as_ref())
            .cloned()
            .ok_or(ConfigError::NoModelSelected)?;
        model.validate()?;
        Ok(model)
    }

    pub(super) async fn persist_new(&self, message: &Message) {
        if let Err(e) = self.store.append_message(message).await {
            tracing::warn!(message_id = %message.id, error = %e, "Failed to persist message");
        }
    }

    pub(super) async fn persist_update(&self, message_id: Uuid) {
        let Some(message) = self.chats.get(message_id).await else {
            return;
        };
        if let Err(e) = self.store.update_message(&message).await {
            tracing::warn!(message_id = %message_id, error = %e, "Failed to persist message update");
        }
    }
}
