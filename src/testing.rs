//! Test harness for constructing a [`ResponseOrchestrator`] with sensible defaults.
//!
//! Provides:
//! - [`StubCompletion`]: A scripted streaming completion service
//! - [`StubToolServer`]: A tool server with canned responses
//! - [`StubTaskOrchestrator`]: A task orchestrator with a fixed outcome
//! - [`TestHarnessBuilder`]: Builder for wiring an orchestrator with defaults
//! - [`TestHarness`]: The assembled components ready for use in tests
//!
//! # Usage
//!
//! ```rust,no_run
//! use chorus::testing::TestHarnessBuilder;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = TestHarnessBuilder::new().build();
//!     // use harness.orchestrator, harness.store, etc.
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::{OrchestratorDeps, RespondRequest, ResponseOrchestrator};
use crate::chat::{Identity, ModeContext, Section};
use crate::config::OrchestratorConfig;
use crate::error::{CompletionError, TaskError, ToolError};
use crate::llm::{
    CompletionRequest, CompletionService, CompletionStream, ModelSelection, ProposedToolCall,
    StreamEvent,
};
use crate::prompt::{NoRules, PromptTemplates, RulesProvider};
use crate::store::InMemoryMessageStore;
use crate::task::{
    InMemoryHumanLoopRegistry, TaskOrchestrator, TaskOutcome, TaskRequest,
};
use crate::tools::{InMemoryToolLog, ToolServer, ToolServerPool};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct Script {
    events: Vec<Result<StreamEvent, CompletionError>>,
    /// Keep the stream open after the events, until aborted.
    hang: bool,
}

/// A scripted streaming completion service for tests.
///
/// Each `stream` call consumes the next queued script; once the queue is
/// empty every call streams the default response text.
///
/// Supports:
/// - Call counting via [`calls()`](Self::calls)
/// - Captured requests via [`requests()`](Self::requests)
/// - Runtime failure toggling via [`set_failing()`](Self::set_failing)
pub struct StubCompletion {
    response: String,
    scripts: Mutex<VecDeque<Script>>,
    call_count: AtomicU32,
    should_fail: AtomicBool,
    requests: Mutex<Vec<CompletionRequest>>,
    aborted: Mutex<Vec<String>>,
}

impl StubCompletion {
    /// Create a new stub that streams the given response.
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            scripts: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            aborted: Mutex::new(Vec::new()),
        }
    }

    /// Queue a script for the next unscripted call.
    pub fn with_script(self, events: Vec<Result<StreamEvent, CompletionError>>) -> Self {
        lock(&self.scripts).push_back(Script {
            events,
            hang: false,
        });
        self
    }

    /// Queue a script whose stream stays open after its events.
    pub fn with_hanging_script(self, events: Vec<StreamEvent>) -> Self {
        lock(&self.scripts).push_back(Script {
            events: events.into_iter().map(Ok).collect(),
            hang: true,
        });
        self
    }

    /// Queue a script that streams `text` and proposes `calls`.
    pub fn with_tool_calls(self, text: &str, calls: Vec<ProposedToolCall>) -> Self {
        let mut events = vec![Ok(StreamEvent::Text(text.to_string()))];
        events.extend(calls.into_iter().map(|c| Ok(StreamEvent::ToolCall(c))));
        self.with_script(events)
    }

    /// Get the number of times `stream` was called.
    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Toggle whether calls should fail at runtime.
    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        lock(&self.aborted).clone()
    }
}

impl Default for StubCompletion {
    fn default() -> Self {
        Self::new("OK")
    }
}

#[async_trait]
impl CompletionService for StubCompletion {
    fn name(&self) -> &str {
        "stub"
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, CompletionError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.requests).push(request);
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(CompletionError::RequestFailed {
                provider: "stub".to_string(),
                reason: "server error".to_string(),
            });
        }

        let script = lock(&self.scripts).pop_front().unwrap_or_else(|| Script {
            events: vec![Ok(StreamEvent::Text(self.response.clone()))],
            hang: false,
        });
        let events = futures::stream::iter(script.events);
        if script.hang {
            Ok(Box::pin(futures::StreamExt::chain(
                events,
                futures::stream::pending(),
            )))
        } else {
            Ok(Box::pin(events))
        }
    }

    async fn abort(&self, stream_id: &str) {
        lock(&self.aborted).push(stream_id.to_string());
    }
}

/// A tool server with canned declarations and responses.
///
/// Unknown tools succeed with an envelope echoing their arguments.
pub struct StubToolServer {
    id: String,
    declarations: Vec<serde_json::Value>,
    failing_listing: bool,
    listing_delay: Option<Duration>,
    responses: HashMap<String, Result<serde_json::Value, String>>,
    delay: Option<Duration>,
    call_count: AtomicU32,
    invocations: Mutex<Vec<(String, serde_json::Value)>>,
}

impl StubToolServer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            declarations: Vec::new(),
            failing_listing: false,
            listing_delay: None,
            responses: HashMap::new(),
            delay: None,
            call_count: AtomicU32::new(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Add a raw declaration (may be malformed on purpose).
    pub fn with_declaration(mut self, declaration: serde_json::Value) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Declare a well-formed tool with an empty object schema.
    pub fn with_tool(self, name: &str, description: &str) -> Self {
        self.with_declaration(serde_json::json!({
            "name": name,
            "description": description,
            "parameters": {"type": "object", "properties": {}}
        }))
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    pub fn with_response(mut self, tool: &str, raw: serde_json::Value) -> Self {
        self.responses.insert(tool.to_string(), Ok(raw));
        self
    }

    pub fn with_failure(mut self, tool: &str, reason: &str) -> Self {
        self.responses
            .insert(tool.to_string(), Err(reason.to_string()));
        self
    }

    /// Sleep this long before answering a tool listing.
    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = Some(delay);
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn invocations(&self) -> Vec<(String, serde_json::Value)> {
        lock(&self.invocations).clone()
    }
}

#[async_trait]
impl ToolServer for StubToolServer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<serde_json::Value>, ToolError> {
        if let Some(delay) = self.listing_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_listing {
            return Err(ToolError::ListingFailed {
                server_id: self.id.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.declarations.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.invocations).push((name.to_string(), arguments.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.responses.get(name) {
            Some(Ok(raw)) => Ok(raw.clone()),
            Some(Err(reason)) => Err(ToolError::ExecutionFailed {
                name: name.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(serde_json::json!({
                "success": true,
                "data": {"tool": name, "arguments": arguments}
            })),
        }
    }
}

/// A task orchestrator that returns a fixed outcome and records calls.
pub struct StubTaskOrchestrator {
    outcome: Mutex<TaskOutcome>,
    should_fail: AtomicBool,
    requests: Mutex<Vec<TaskRequest>>,
    approvals: Mutex<Vec<(String, bool)>>,
    aborted: Mutex<Vec<String>>,
    approval_delay: Option<Duration>,
}

impl StubTaskOrchestrator {
    pub fn new(outcome: TaskOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            should_fail: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            approvals: Mutex::new(Vec::new()),
            aborted: Mutex::new(Vec::new()),
            approval_delay: None,
        }
    }

    /// Sleep before accepting each forwarded approval decision.
    pub fn with_approval_delay(mut self, delay: Duration) -> Self {
        self.approval_delay = Some(delay);
        self
    }

    pub fn set_outcome(&self, outcome: TaskOutcome) {
        *lock(&self.outcome) = outcome;
    }

    /// Toggle whether every call should fail at runtime.
    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    pub fn requests(&self) -> Vec<TaskRequest> {
        lock(&self.requests).clone()
    }

    pub fn approvals(&self) -> Vec<(String, bool)> {
        lock(&self.approvals).clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        lock(&self.aborted).clone()
    }

    fn failing(&self) -> bool {
        self.should_fail.load(Ordering::Relaxed)
    }
}

impl Default for StubTaskOrchestrator {
    fn default() -> Self {
        Self::new(TaskOutcome::completed("Task complete"))
    }
}

#[async_trait]
impl TaskOrchestrator for StubTaskOrchestrator {
    async fn run_task(&self, request: TaskRequest) -> Result<TaskOutcome, TaskError> {
        lock(&self.requests).push(request);
        if self.failing() {
            return Err(TaskError::DelegationFailed {
                reason: "orchestrator unavailable".to_string(),
            });
        }
        Ok(lock(&self.outcome).clone())
    }

    async fn respond_to_approval(
        &self,
        approval_id: &str,
        approved: bool,
    ) -> Result<(), TaskError> {
        if let Some(delay) = self.approval_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing() {
            return Err(TaskError::ApprovalForwardFailed {
                approval_id: approval_id.to_string(),
                reason: "orchestrator unavailable".to_string(),
            });
        }
        lock(&self.approvals).push((approval_id.to_string(), approved));
        Ok(())
    }

    async fn abort_task(&self, task_id: &str) -> Result<(), TaskError> {
        if self.failing() {
            return Err(TaskError::AbortFailed {
                task_id: task_id.to_string(),
                reason: "orchestrator unavailable".to_string(),
            });
        }
        lock(&self.aborted).push(task_id.to_string());
        Ok(())
    }
}

/// Assembled test components.
pub struct TestHarness {
    pub orchestrator: Arc<ResponseOrchestrator>,
    pub completion: Arc<StubCompletion>,
    /// `None` when built with [`TestHarnessBuilder::without_tasks`].
    pub tasks: Option<Arc<StubTaskOrchestrator>>,
    pub store: Arc<InMemoryMessageStore>,
    pub tool_log: Arc<InMemoryToolLog>,
    pub human_loop: Arc<InMemoryHumanLoopRegistry>,
    pub user: Identity,
    pub assistant: Identity,
    pub model: ModelSelection,
}

impl TestHarness {
    /// A request in `section` with the harness identities and model.
    pub fn request(&self, chat_id: &str, section: Section, text: &str) -> RespondRequest {
        self.request_with(chat_id, ModeContext::new(section), text)
    }

    pub fn request_with(&self, chat_id: &str, context: ModeContext, text: &str) -> RespondRequest {
        RespondRequest::new(
            chat_id,
            self.user.clone(),
            self.assistant.clone(),
            text,
            context,
        )
        .with_model(self.model.clone())
    }
}

/// Builder for constructing a [`TestHarness`] with sensible defaults.
///
/// All defaults work without any external services:
/// - Completion: `StubCompletion` streaming "OK"
/// - Tools: no servers
/// - Tasks: `StubTaskOrchestrator` completing with "Task complete"
/// - Store, tool log and human-loop registry: in memory
/// - Rules: none
pub struct TestHarnessBuilder {
    completion: Option<Arc<StubCompletion>>,
    servers: Vec<(Arc<StubToolServer>, bool)>,
    tasks: Option<Arc<StubTaskOrchestrator>>,
    without_tasks: bool,
    rules: Option<Arc<dyn RulesProvider>>,
    templates: PromptTemplates,
    config: OrchestratorConfig,
    model: ModelSelection,
}

impl TestHarnessBuilder {
    /// Create a new builder with all defaults.
    pub fn new() -> Self {
        Self {
            completion: None,
            servers: Vec::new(),
            tasks: None,
            without_tasks: false,
            rules: None,
            templates: PromptTemplates::new(),
            config: OrchestratorConfig::default(),
            model: ModelSelection::new("stub-model", "stub"),
        }
    }

    /// Override the completion service.
    pub fn with_completion(mut self, completion: Arc<StubCompletion>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Add an enabled tool server.
    pub fn with_tool_server(mut self, server: Arc<StubToolServer>) -> Self {
        self.servers.push((server, true));
        self
    }

    pub fn with_disabled_tool_server(mut self, server: Arc<StubToolServer>) -> Self {
        self.servers.push((server, false));
        self
    }

    /// Override the task orchestrator.
    pub fn with_tasks(mut self, tasks: Arc<StubTaskOrchestrator>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Build without a task orchestrator (Agent mode is unavailable).
    pub fn without_tasks(mut self) -> Self {
        self.without_tasks = true;
        self
    }

    pub fn with_rules(mut self, rules: Arc<dyn RulesProvider>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_model(mut self, model: ModelSelection) -> Self {
        self.model = model;
        self
    }

    /// Build the harness with defaults applied.
    pub fn build(self) -> TestHarness {
        let completion = self
            .completion
            .unwrap_or_else(|| Arc::new(StubCompletion::default()));
        let tasks = if self.without_tasks {
            None
        } else {
            Some(
                self.tasks
                    .unwrap_or_else(|| Arc::new(StubTaskOrchestrator::default())),
            )
        };
        let store = Arc::new(InMemoryMessageStore::new());
        let tool_log = Arc::new(InMemoryToolLog::new());
        let human_loop = Arc::new(InMemoryHumanLoopRegistry::new());

        let pool = self
            .servers
            .into_iter()
            .fold(ToolServerPool::new(), |pool, (server, enabled)| {
                pool.with_server_enabled(server, enabled)
            });
        let pool = Arc::new(pool);

        let deps = OrchestratorDeps {
            completion: completion.clone(),
            tool_servers: Arc::clone(&pool),
            catalog: pool,
            tasks: tasks
                .clone()
                .map(|t| t as Arc<dyn TaskOrchestrator>),
            human_loop: human_loop.clone(),
            store: store.clone(),
            tool_log: tool_log.clone(),
            rules: self.rules.unwrap_or_else(|| Arc::new(NoRules)),
            templates: self.templates,
            config: self.config,
        };

        TestHarness {
            orchestrator: Arc::new(ResponseOrchestrator::new(deps)),
            completion,
            tasks,
            store,
            tool_log,
            human_loop,
            user: Identity::new("user-1", "alice").with_display_name("Alice"),
            assistant: Identity::new("assistant-1", "helper").with_display_name("Helper"),
            model: self.model,
        }
    }
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::collect_text;

    #[tokio::test]
    async fn test_harness_builds_with_defaults() {
        let harness = TestHarnessBuilder::new().build();
        assert!(harness.tasks.is_some());
        assert_eq!(harness.model.model, "stub-model");
    }

    #[tokio::test]
    async fn test_stub_completion_scripts_then_default() {
        let model = ModelSelection::new("m", "p");
        let stub = StubCompletion::new("default")
            .with_script(vec![Ok(StreamEvent::Text("scripted".into()))]);

        let first = stub
            .stream(CompletionRequest::new(&model, vec![]))
            .await
            .unwrap();
        assert_eq!(collect_text(first).await.unwrap(), "scripted");
        let second = stub
            .stream(CompletionRequest::new(&model, vec![]))
            .await
            .unwrap();
        assert_eq!(collect_text(second).await.unwrap(), "default");
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_stub_tool_server_defaults_to_echo_envelope() {
        let server = StubToolServer::new("s");
        let raw = server
            .call_tool("anything", serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(
            server.interpret_result(raw).unwrap(),
            serde_json::json!({"tool": "anything", "arguments": {"a": 1}})
        );
        assert_eq!(server.invocations().len(), 1);
    }
}
