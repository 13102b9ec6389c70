//! Agent strategy: delegate the request to the task orchestrator.

use uuid::Uuid;

use crate::agent::mode::Mode;
use crate::agent::orchestrator::{RespondRequest, ResponseOrchestrator, ResponseOutcome};
use crate::agent::transcript::{render_history, window_history};
use crate::chat::{Message, MessageStatus};
use crate::error::{ConfigError, Error};
use crate::llm::ModelSelection;
use crate::prompt::PromptInput;
use crate::task::{TaskOptions, TaskOutcome, TaskRequest};

/// Used when a failed task gives no error text.
pub const TASK_FAILED_TEXT: &str = "The agent task failed without an error message.";

impl ResponseOrchestrator {
    pub(super) async fn run_delegated(
        &self,
        request: &RespondRequest,
        model: &ModelSelection,
    ) -> Result<ResponseOutcome, Error> {
        let tasks = self.tasks.as_ref().ok_or(ConfigError::NoTaskOrchestrator)?;
        let ctx = &request.context;

        let placeholder = Message::placeholder(request.chat_id.clone(), &request.assistant);
        let message_id = placeholder.id;
        self.persist_new(&placeholder).await;
        self.chats.push(placeholder).await;

        let thread_id = Uuid::new_v4().to_string();
        let history = self
            .chats
            .recent(&request.chat_id, self.config.history_window + 1)
            .await;
        let history = window_history(
            history,
            self.config.history_window,
            &request.user.id,
            &request.text,
        );
        let task_description = compose_task_description(
            &render_history(&history),
            &request.user.display_name,
            &request.text,
            &ctx.knowledge.kb_ids,
        );
        let system_prompt = self.prompts.assemble(PromptInput {
            user: &request.user,
            assistant: &request.assistant,
            mode: Mode::Agent,
            context: ctx,
        });
        let tools = self.resolver.resolve(&ctx.tool_server_ids).await;

        tracing::info!(
            message_id = %message_id,
            thread_id = %thread_id,
            tools = tools.len(),
            "Delegating to task orchestrator"
        );

        let task = TaskRequest {
            task_description,
            options: TaskOptions {
                model: model.model.clone(),
                provider: model.provider.clone(),
                tools,
                system_prompt,
                thread_id: thread_id.clone(),
                limits: ctx.limits,
                knowledge_bases: ctx.knowledge.kb_ids.clone(),
            },
        };

        let outcome = match tasks.run_task(task).await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::failed(e.to_string()),
        };

        let response = if outcome.requires_human_interaction {
            self.chats
                .set_pending_interaction(&request.chat_id, &thread_id)
                .await;
            tracing::info!(message_id = %message_id, thread_id = %thread_id, "Agent task awaiting human interaction");
            ResponseOutcome::AwaitingHuman {
                message_id,
                thread_id: thread_id.clone(),
            }
        } else if outcome.success {
            let text = outcome.result.unwrap_or_default();
            self.chats
                .update(message_id, |m| {
                    m.text = text;
                    m.status = MessageStatus::Completed;
                })
                .await;
            ResponseOutcome::Completed { message_id }
        } else {
            let reason = outcome
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| TASK_FAILED_TEXT.to_string());
            tracing::warn!(message_id = %message_id, thread_id = %thread_id, error = %reason, "Agent task failed");
            let text = reason.clone();
            self.chats
                .update(message_id, |m| {
                    m.text = text;
                    m.status = MessageStatus::Failed;
                })
                .await;
            ResponseOutcome::Failed { message_id, reason }
        };

        self.persist_update(message_id).await;
        self.interactions.schedule_cleanup(
            &request.chat_id,
            &thread_id,
            self.config.interaction_cleanup_delay,
        );
        Ok(response)
    }
}

fn compose_task_description(
    history: &str,
    requester: &str,
    request_text: &str,
    kb_ids: &[String],
) -> String {
    let mut description = String::new();
    if !history.is_empty() {
        description.push_str("Recent conversation:\n");
        description.push_str(history);
        description.push_str("\n\n");
    }
    description.push_str(&format!("Current request from {requester}:\n{request_text}\n\n"));
    if kb_ids.is_empty() {
        description.push_str("No knowledge bases are selected.");
    } else {
        description.push_str(&format!(
            "Knowledge bases available for retrieval: {}.",
            kb_ids.join(", ")
        ));
    }
    description
}
