//! OpenAI-compatible streaming Chat Completions client.
//!
//! Talks to any `/v1/chat/completions` endpoint that supports `stream: true`
//! (vLLM, LiteLLM, Ollama, local proxies). Knowledge-base fields are sent as
//! extra top-level body fields and ignored by providers that do not know them.
//!
//! Each stream is read by a spawned task that decodes SSE events and
//! forwards them over an mpsc channel; `abort` cancels that task through its
//! token, which ends the stream.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::config::CompletionConfig;
use crate::error::CompletionError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionService, CompletionStream, ProposedToolCall, Role,
    StreamEvent,
};

const PROVIDER: &str = "openai_compatible_chat";

type EventSender = mpsc::Sender<Result<StreamEvent, CompletionError>>;

/// Streaming provider over `/v1/chat/completions`.
pub struct OpenAiCompatibleCompletion {
    client: Client,
    config: CompletionConfig,
    in_flight: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl OpenAiCompatibleCompletion {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CompletionError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn api_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');

        if base.ends_with("/v1") {
            format!("{}/{}", base, path)
        } else {
            format!("{}/v1/{}", base, path)
        }
    }

    fn api_key(&self) -> String {
        self.config
            .api_key()
            .map(str::to_string)
            .unwrap_or_else(|| "no-key".to_string())
    }

    fn build_body(request: CompletionRequest) -> ChatCompletionRequest {
        let tools: Vec<ChatCompletionTool> = request
            .tools
            .into_iter()
            .map(|t| ChatCompletionTool {
                tool_type: "function".to_string(),
                function: ChatCompletionFunction {
                    name: t.name,
                    description: Some(t.description),
                    parameters: Some(t.parameters),
                },
            })
            .collect();

        ChatCompletionRequest {
            model: request.model,
            messages: request
                .messages
                .into_iter()
                .map(ChatCompletionMessage::from)
                .collect(),
            stream: true,
            tools: if tools.is_empty() { None } else { Some(tools) },
            kb_ids: request.kb_ids,
            workspace_id: request.workspace_id,
            top_k: request.top_k,
            preferred_language: request.preferred_language,
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatibleCompletion {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, CompletionError> {
        let url = self.api_url("chat/completions");
        let stream_id = request.stream_id.clone();
        let body = Self::build_body(request);

        tracing::debug!(url = %url, stream_id = %stream_id, model = %body.model, "Opening completion stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(match status_code {
                401 => CompletionError::AuthFailed {
                    provider: PROVIDER.to_string(),
                },
                429 => CompletionError::RateLimited {
                    provider: PROVIDER.to_string(),
                },
                _ => CompletionError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: format!("HTTP {}: {}", status, text),
                },
            });
        }

        let (tx, rx) = mpsc::channel(64);
        let token = CancellationToken::new();
        // Registered before the reader starts so its own removal always wins.
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stream_id.clone(), token.clone());

        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            pump_events(response.bytes_stream(), tx, token).await;
            in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&stream_id);
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn abort(&self, stream_id: &str) {
        let token = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(stream_id);
        if let Some(token) = token {
            tracing::debug!(stream_id = %stream_id, "Aborting completion stream");
            token.cancel();
        }
    }
}

/// Decode an SSE byte stream and forward the resulting events until
/// `[DONE]`, the end of the body, a dropped receiver, or cancellation.
async fn pump_events<S, B, E>(bytes: S, tx: EventSender, token: CancellationToken)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let events = bytes.eventsource();
    tokio::pin!(events);
    let mut decoder = ChunkDecoder::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = events.next() => next,
        };
        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(CompletionError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        reason: e.to_string(),
                    }))
                    .await;
                break;
            }
            None => break,
        };

        let item = decoder.decode(&event.data);
        let done = matches!(item, SseItem::Done);
        for out in decoder.events_for(item) {
            if forward(&tx, &token, out).await.is_err() {
                return;
            }
        }
        if done {
            return;
        }
    }

    for call in decoder.tool_calls.drain() {
        if forward(&tx, &token, Ok(StreamEvent::ToolCall(call)))
            .await
            .is_err()
        {
            return;
        }
    }
}

async fn forward(
    tx: &EventSender,
    token: &CancellationToken,
    event: Result<StreamEvent, CompletionError>,
) -> Result<(), ()> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(()),
        sent = tx.send(event) => sent.map_err(|_| ()),
    }
}

/// A decoded SSE `data:` payload.
#[derive(Debug)]
enum SseItem {
    Chunk(ChatCompletionChunk),
    Malformed(String),
    Skip,
    Done,
}

/// Chunk decoding plus tool-call delta accumulation for one stream.
#[derive(Default)]
struct ChunkDecoder {
    tool_calls: ToolCallAccumulator,
}

impl ChunkDecoder {
    fn decode(&self, data: &str) -> SseItem {
        let data = data.trim();
        if data.is_empty() {
            return SseItem::Skip;
        }
        if data == "[DONE]" {
            return SseItem::Done;
        }
        match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => SseItem::Chunk(chunk),
            Err(e) => SseItem::Malformed(format!("{e}: {data}")),
        }
    }

    /// Turn one decoded item into stream events.
    fn events_for(&mut self, item: SseItem) -> Vec<Result<StreamEvent, CompletionError>> {
        match item {
            SseItem::Skip => Vec::new(),
            SseItem::Done => self
                .tool_calls
                .drain()
                .into_iter()
                .map(|c| Ok(StreamEvent::ToolCall(c)))
                .collect(),
            SseItem::Malformed(reason) => vec![Err(CompletionError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason,
            })],
            SseItem::Chunk(chunk) => {
                let mut events = Vec::new();
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content
                        && !content.is_empty()
                    {
                        events.push(Ok(StreamEvent::Text(content)));
                    }
                    for delta in choice.delta.tool_calls.unwrap_or_default() {
                        self.tool_calls.apply(delta);
                    }
                    if choice.finish_reason.is_some() {
                        events.extend(
                            self.tool_calls
                                .drain()
                                .into_iter()
                                .map(|c| Ok(StreamEvent::ToolCall(c))),
                        );
                    }
                }
                events
            }
        }
    }
}

/// Collects streamed tool-call fragments keyed by their index.
#[derive(Default)]
struct ToolCallAccumulator {
    partial: BTreeMap<u32, PartialToolCall>,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: ChunkToolCall) {
        let entry = self.partial.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn drain(&mut self) -> Vec<ProposedToolCall> {
        std::mem::take(&mut self.partial)
            .into_values()
            .filter(|p| !p.name.is_empty())
            .map(|p| {
                let arguments = if p.arguments.trim().is_empty() {
                    serde_json::Value::Object(Default::default())
                } else {
                    // Unparseable arguments stay a string; the executor re-parses them.
                    serde_json::from_str(&p.arguments)
                        .unwrap_or(serde_json::Value::String(p.arguments))
                };
                ProposedToolCall {
                    id: p.id,
                    name: p.name,
                    arguments,
                }
            })
            .collect()
    }
}

// OpenAI-compatible Chat Completions API types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatCompletionTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kb_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workspace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preferred_language: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: &'static str,
    content: String,
}

impl From<ChatMessage> for ChatCompletionMessage {
    fn from(msg: ChatMessage) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: msg.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatCompletionFunction,
}

#[derive(Debug, Serialize)]
struct ChatCompletionFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
