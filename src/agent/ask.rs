//! Ask and Query strategies: stream one completion into an assistant message.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::mode::Mode;
use crate::agent::orchestrator::{RespondRequest, ResponseOrchestrator, ResponseOutcome};
use crate::agent::transcript::{build_transcript, window_history};
use crate::chat::{Message, MessageStatus};
use crate::llm::{CompletionRequest, ModelSelection, ProposedToolCall, StreamEvent};
use crate::prompt::PromptInput;
use crate::tools::{ToolCall, ToolDescriptor};

/// Shown when a completion stream fails.
pub const ASK_FAILURE_TEXT: &str =
    "Sorry, something went wrong while generating a response. Please try again.";

/// Shown when a knowledge-base query produced no text.
pub const EMPTY_QUERY_TEXT: &str = "No response received from knowledge base.";

/// Appended when the user stops a response.
pub const STOPPED_MARKER: &str = "[Response stopped by user]";

enum StreamEnd {
    Finished,
    Stopped,
    Failed(String),
}

/// Keeps a stream's stop token registered until dropped.
struct StreamRegistration<'a> {
    streams: &'a Mutex<HashMap<String, CancellationToken>>,
    stream_id: &'a str,
    token: CancellationToken,
}

impl<'a> StreamRegistration<'a> {
    fn register(
        streams: &'a Mutex<HashMap<String, CancellationToken>>,
        stream_id: &'a str,
    ) -> Self {
        let token = CancellationToken::new();
        streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stream_id.to_string(), token.clone());
        Self {
            streams,
            stream_id,
            token,
        }
    }
}

impl Drop for StreamRegistration<'_> {
    fn drop(&mut self) {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.stream_id);
    }
}

impl ResponseOrchestrator {
    /// Run Ask or Query mode. Never fails: remote errors end in a failed message.
    ///
    /// The stream id is abortable from the first moment, so a stop during
    /// history, tool or prompt setup still ends the response as stopped.
    pub(super) async fn run_completion(
        &self,
        request: &RespondRequest,
        mode: Mode,
        model: &ModelSelection,
    ) -> ResponseOutcome {
        let registration = StreamRegistration::register(&self.streams, &request.stream_id);
        let ctx = &request.context;
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
        let system_prompt = self.prompts.assemble(PromptInput {
            user: &request.user,
            assistant: &request.assistant,
            mode,
            context: ctx,
        });
        let tools = self.resolver.resolve(&ctx.tool_server_ids).await;
        let tool_index: HashMap<String, ToolDescriptor> =
            tools.iter().map(|t| (t.name.clone(), t.clone())).collect();

        let mut completion = CompletionRequest::new(
            model,
            build_transcript(
                system_prompt,
                &history,
                &request.assistant.id,
                &request.text,
            ),
        )
        .with_tools(tools)
        .with_workspace(ctx.workspace_id.clone());
        completion.stream_id = request.stream_id.clone();
        if mode == Mode::Query && model.knowledge_bases && !ctx.knowledge.is_empty() {
            completion = completion.with_knowledge(
                ctx.knowledge.kb_ids.clone(),
                self.config.top_k,
                self.config.preferred_language.clone(),
            );
        }

        let placeholder = Message::placeholder(request.chat_id.clone(), &request.assistant);
        let message_id = placeholder.id;
        self.persist_new(&placeholder).await;
        self.chats.push(placeholder).await;

        let end = self
            .drive_stream(completion, message_id, &tool_index, &registration.token)
            .await;
        drop(registration);

        let outcome = match end {
            StreamEnd::Finished => {
                self.chats
                    .update(message_id, |m| {
                        if mode == Mode::Query && m.text.trim().is_empty() {
                            m.text = EMPTY_QUERY_TEXT.to_string();
                        }
                        m.status = MessageStatus::Completed;
                    })
                    .await;
                ResponseOutcome::Completed { message_id }
            }
            StreamEnd::Stopped => {
                self.chats
                    .update(message_id, |m| {
                        if m.text.trim().is_empty() {
                            m.text = STOPPED_MARKER.to_string();
                        } else {
                            m.text = format!("{}\n\n{}", m.text.trim_end(), STOPPED_MARKER);
                        }
                        m.status = MessageStatus::Completed;
                    })
                    .await;
                tracing::info!(message_id = %message_id, "Response stopped by user");
                ResponseOutcome::Stopped { message_id }
            }
            StreamEnd::Failed(reason) => {
                tracing::error!(message_id = %message_id, error = %reason, "Completion stream failed");
                self.chats
                    .update(message_id, |m| {
                        m.text = ASK_FAILURE_TEXT.to_string();
                        m.status = MessageStatus::Failed;
                    })
                    .await;
                ResponseOutcome::Failed { message_id, reason }
            }
        };

        self.persist_update(message_id).await;
        outcome
    }

    async fn drive_stream(
        &self,
        request: CompletionRequest,
        message_id: Uuid,
        tool_index: &HashMap<String, ToolDescriptor>,
        token: &CancellationToken,
    ) -> StreamEnd {
        let mut stream = tokio::select! {
            biased;
            _ = token.cancelled() => return StreamEnd::Stopped,
            result = self.completion.stream(request) => match result {
                Ok(stream) => stream,
                Err(e) => return StreamEnd::Failed(e.to_string()),
            },
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => return StreamEnd::Stopped,
                event = stream.next() => event,
            };

            match event {
                None => return StreamEnd::Finished,
                Some(Err(e)) => return StreamEnd::Failed(e.to_string()),
                Some(Ok(StreamEvent::Text(chunk))) => {
                    self.chats
                        .update(message_id, |m| m.text.push_str(&chunk))
                        .await;
                }
                Some(Ok(StreamEvent::ToolCall(proposed))) => {
                    let call = proposed_to_call(proposed, tool_index);
                    if let Err(e) = self.lifecycle.attach(message_id, call).await {
                        tracing::warn!(message_id = %message_id, error = %e, "Dropping proposed tool call");
                    }
                }
            }
        }
    }
}

fn proposed_to_call(
    proposed: ProposedToolCall,
    tool_index: &HashMap<String, ToolDescriptor>,
) -> ToolCall {
    let id = if proposed.id.trim().is_empty() {
        Uuid::new_v4().to_string()
    } else {
        proposed.id
    };
    match tool_index.get(&proposed.name) {
        Some(descriptor) => {
            let call = ToolCall::new(id, proposed.name, proposed.arguments, &descriptor.server_id);
            if descriptor.description.is_empty() {
                call
            } else {
                call.with_description(descriptor.description.clone())
            }
        }
        None => {
            tracing::warn!(tool = %proposed.name, "Model proposed a tool that no selected server offers");
            ToolCall::new(id, proposed.name, proposed.arguments, "")
        }
    }
}
