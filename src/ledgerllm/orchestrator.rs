//! The multi-turn tool-calling orchestrator.
//!
//! Given a principal and a chat request, the orchestrator assembles the transcript
//! (banking system prompt first, persisted history next, the new user message last),
//! compiles the tool descriptor list from the principal's permitted tools, and drives a
//! bounded loop against the provider adapter: call the model with tools, authorize and
//! execute the calls it returns, feed the results back, repeat until the model answers
//! in natural language or the iteration bound is hit, then run one final tool-free turn.
//!
//! Loop states: `ASSEMBLE → CALL → {APPEND → CALL | FINAL} → DONE`.  Tool executions
//! within a turn run concurrently; their results are appended in the order the model
//! produced the calls.
//!
//! Tool failures never abort the request — they are attached to the call record and fed
//! back to the model.  Provider auth / rate-limit / model-not-found errors abort and
//! surface through the HTTP error mapping.
//!
//! Raw `tool`-role records never reach memory: the store receives the assistant answer
//! plus one synthesized `"[tool_result] <name>: <json>"` assistant record per executed
//! call, so threads replay cleanly across providers.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;

use crate::ledgerllm::auth::Principal;
use crate::ledgerllm::error::GatewayError;
use crate::ledgerllm::memory::{MemoryStore, StoredMessage};
use crate::ledgerllm::provider::{
    ChatParams, Message, ProviderAdapter, Role, ToolDefinition, ToolSchema,
};
use crate::ledgerllm::registry::{ActiveModel, ModelRegistry};
use crate::ledgerllm::tools::{descriptor_for, ExecutedToolCall, ToolDispatch, ToolError};

/// The retrieval-context tool is whitelisted for every caller, bypassing ABAC.
pub const RAG_TOOL: &str = "get_rag_context";

/// Character granularity for synthesized streaming frames.
const STREAM_SLICE_CHARS: usize = 50;

/// One role-tagged message in a request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

/// Body of a chat request.
///
/// Exactly one of `messages` or `prompt` must be present; `validate` enforces that plus
/// the numeric ranges.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<IncomingMessage>>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub use_rag: bool,
    #[serde(default)]
    pub use_functions: bool,
    #[serde(default)]
    pub functions: Option<Vec<ToolDefinition>>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    /// Enforce the request constraints.
    pub fn validate(&self) -> Result<(), GatewayError> {
        match (&self.messages, &self.prompt) {
            (None, None) => {
                return Err(GatewayError::InvalidInput(
                    "either 'messages' or 'prompt' must be provided".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(GatewayError::InvalidInput(
                    "provide either 'messages' or 'prompt', not both".to_string(),
                ))
            }
            _ => {}
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(GatewayError::InvalidInput(
                    "temperature must be within [0, 2]".to_string(),
                ));
            }
        }
        if let Some(m) = self.max_tokens {
            if !(1..=4096).contains(&m) {
                return Err(GatewayError::InvalidInput(
                    "max_tokens must be within [1, 4096]".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The new messages this request contributes to the transcript.
    fn incoming(&self) -> Vec<Message> {
        if let Some(prompt) = &self.prompt {
            return vec![Message::user(prompt)];
        }
        self.messages
            .iter()
            .flatten()
            .map(|m| match m.role.as_str() {
                "system" => Message::system(&m.content),
                "assistant" => Message::assistant(&m.content),
                _ => Message::user(&m.content),
            })
            .collect()
    }
}

/// Final result of an orchestrated chat.
#[derive(Debug)]
pub struct ChatOutcome {
    pub answer: String,
    pub executed_calls: Vec<ExecutedToolCall>,
}

/// One frame of a streaming response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Content { content: String },
    FunctionCalls { function_calls: Vec<ExecutedToolCall> },
    Done,
    Error { error: String },
}

/// Encode a frame in the `data: <json>\n\n` wire framing.
pub fn encode_frame(frame: &StreamFrame) -> String {
    let json = serde_json::to_string(frame)
        .unwrap_or_else(|_| r#"{"type":"error","error":"encoding failure"}"#.to_string());
    format!("data: {}\n\n", json)
}

/// Boxed frame stream returned by [`Orchestrator::chat_stream`].
pub type FrameStream = Pin<Box<dyn futures_util::Stream<Item = StreamFrame> + Send>>;

/// Drop tool-role messages a provider cannot accept.
///
/// Schema A keeps a `tool` message only when the immediately preceding assistant turn
/// declared a matching call id; schema B keeps tool messages only behind an assistant
/// turn that made tool calls; schema C drops them entirely (the adapter inlines results
/// as text).
pub fn sanitize_transcript(messages: &[Message], schema: ToolSchema) -> Vec<Message> {
    let mut sanitized = Vec::with_capacity(messages.len());
    let mut prev_assistant_ids: Vec<String> = Vec::new();

    for msg in messages {
        match &msg.role {
            Role::Assistant => {
                prev_assistant_ids = msg.tool_calls.iter().map(|tc| tc.id.clone()).collect();
                sanitized.push(msg.clone());
            }
            Role::Tool { call_id } => match schema {
                ToolSchema::OpenAi => {
                    if prev_assistant_ids.iter().any(|id| id == call_id) {
                        sanitized.push(msg.clone());
                    }
                }
                ToolSchema::Anthropic => {
                    if !prev_assistant_ids.is_empty() {
                        sanitized.push(msg.clone());
                    }
                }
                ToolSchema::Text => {}
            },
            _ => sanitized.push(msg.clone()),
        }
    }
    sanitized
}

/// Extend a transcript with one tool round, in the provider's schema.
fn append_tool_round(
    transcript: &mut Vec<Message>,
    schema: ToolSchema,
    assistant_content: &str,
    round: &[ExecutedToolCall],
) {
    match schema {
        ToolSchema::OpenAi | ToolSchema::Anthropic => {
            let calls = round
                .iter()
                .map(|c| crate::ledgerllm::provider::ToolCall {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                })
                .collect();
            transcript.push(Message::assistant_with_calls(assistant_content, calls));
            for call in round {
                let body = json!({"result": call.result, "error": call.error});
                transcript.push(Message::tool(call.id.clone(), body.to_string()));
            }
        }
        ToolSchema::Text => {
            let mut blob = serde_json::Map::new();
            for call in round {
                blob.insert(
                    call.name.clone(),
                    json!({"result": call.result, "error": call.error}),
                );
            }
            transcript.push(Message::assistant(format!(
                "Tool results: {}",
                Value::Object(blob)
            )));
        }
    }
}

/// Drives the tool loop and conversation memory for every request.
pub struct Orchestrator {
    memory: Arc<dyn MemoryStore>,
    tools: Arc<dyn ToolDispatch>,
    registry: Arc<ModelRegistry>,
    system_prompt: String,
    max_tool_iterations: usize,
    native_streaming: bool,
}

impl Orchestrator {
    pub fn new(
        memory: Arc<dyn MemoryStore>,
        tools: Arc<dyn ToolDispatch>,
        registry: Arc<ModelRegistry>,
        system_prompt: String,
        max_tool_iterations: usize,
        native_streaming: bool,
    ) -> Orchestrator {
        Orchestrator {
            memory,
            tools,
            registry,
            system_prompt,
            max_tool_iterations,
            native_streaming,
        }
    }

    /// Run one orchestrated chat to completion.
    pub async fn chat(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        active: &ActiveModel,
        principal: Option<&Principal>,
        request: &ChatRequest,
        request_id: &str,
    ) -> Result<ChatOutcome, GatewayError> {
        request.validate()?;
        let capabilities = adapter.capabilities();
        let incoming = request.incoming();

        // Transcript assembly: banking prompt first; system messages in history or the
        // request body are dropped in its favour.
        let mut transcript = vec![Message::system(&self.system_prompt)];
        if let Some(session_id) = &request.session_id {
            for stored in self.memory.load(session_id).await? {
                if stored.role == "system" {
                    continue;
                }
                if let Some(msg) = stored_to_message(&stored) {
                    transcript.push(msg);
                }
            }
        }
        transcript.extend(incoming.iter().filter(|m| m.role != Role::System).cloned());

        // Persist the new user message before any vendor call.
        if let Some(session_id) = &request.session_id {
            if let Some(last) = incoming.last() {
                self.memory
                    .append(
                        session_id,
                        principal.map(|p| p.user_id.as_str()).unwrap_or("anonymous"),
                        &[message_to_stored(last)],
                    )
                    .await?;
            }
        }

        let tools = self.assemble_tools(principal, request, capabilities.supports_tool_calls);
        let params = self.assemble_params(active, request, &capabilities);

        let mut executed: Vec<ExecutedToolCall> = Vec::new();
        if !tools.is_empty() {
            let tool_params = ChatParams {
                tool_call_turn: true,
                ..params.clone()
            };
            for iteration in 0..self.max_tool_iterations {
                let sanitized = sanitize_transcript(&transcript, capabilities.tool_schema);
                let (content, calls) = adapter
                    .chat_with_tools(&sanitized, &tools, &tool_params)
                    .await?;
                if calls.is_empty() {
                    break;
                }
                log::info!(
                    "{}: turn {} returned {} tool call(s)",
                    request_id,
                    iteration + 1,
                    calls.len()
                );

                let round = self
                    .run_tool_round(&calls, principal, &incoming)
                    .await;
                executed.extend(round.iter().cloned());
                append_tool_round(
                    &mut transcript,
                    capabilities.tool_schema,
                    &content,
                    &round,
                );
            }
        }

        // Final tool-free turn for the natural-language answer.
        let sanitized = sanitize_transcript(&transcript, capabilities.tool_schema);
        let answer = adapter.chat(&sanitized, &params).await?;

        self.persist_outcome(request, principal, &answer, &executed)
            .await?;

        Ok(ChatOutcome {
            answer,
            executed_calls: executed,
        })
    }

    /// Run one orchestrated chat as a frame stream.
    ///
    /// Native streaming covers the plain-chat path; requests that involve tools fall
    /// back to a buffered run whose answer is sliced into fixed-size frames, mirroring
    /// the non-streaming loop (including memory writes).
    pub async fn chat_stream(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        active: &ActiveModel,
        principal: Option<&Principal>,
        request: &ChatRequest,
        request_id: &str,
    ) -> Result<FrameStream, GatewayError> {
        request.validate()?;
        let capabilities = adapter.capabilities();
        let wants_tools = request.use_functions || request.use_rag;

        if self.native_streaming && capabilities.supports_streaming && !wants_tools {
            let params = self.assemble_params(active, request, &capabilities);
            let mut transcript = vec![Message::system(&self.system_prompt)];
            transcript.extend(
                request
                    .incoming()
                    .into_iter()
                    .filter(|m| m.role != Role::System),
            );
            let chunks = adapter.chat_stream(&transcript, &params).await?;
            return Ok(native_frames(chunks));
        }

        let outcome = self
            .chat(adapter, active, principal, request, request_id)
            .await?;
        let mut frames: Vec<StreamFrame> = Vec::new();
        let chars: Vec<char> = outcome.answer.chars().collect();
        for piece in chars.chunks(STREAM_SLICE_CHARS) {
            frames.push(StreamFrame::Content {
                content: piece.iter().collect(),
            });
        }
        if !outcome.executed_calls.is_empty() {
            frames.push(StreamFrame::FunctionCalls {
                function_calls: outcome.executed_calls,
            });
        }
        frames.push(StreamFrame::Done);
        Ok(Box::pin(futures_util::stream::iter(frames)))
    }

    /// Compile the tool descriptor list for this request.
    fn assemble_tools(
        &self,
        principal: Option<&Principal>,
        request: &ChatRequest,
        supports_tool_calls: bool,
    ) -> Vec<ToolDefinition> {
        if !supports_tool_calls || !(request.use_functions || request.use_rag) {
            return Vec::new();
        }

        let mut tools: Vec<ToolDefinition> = Vec::new();
        if request.use_functions {
            match &request.functions {
                Some(explicit) if !explicit.is_empty() => tools = explicit.clone(),
                _ => {
                    if let Some(principal) = principal {
                        tools = principal
                            .permitted_tools
                            .iter()
                            .filter_map(|name| descriptor_for(name))
                            .collect();
                    }
                }
            }
        }
        if request.use_rag && !tools.iter().any(|t| t.name == RAG_TOOL) {
            if let Some(rag) = descriptor_for(RAG_TOOL) {
                tools.push(rag);
            }
        }
        tools
    }

    /// Request params with registry defaults and capability-based drops applied.
    fn assemble_params(
        &self,
        active: &ActiveModel,
        request: &ChatRequest,
        capabilities: &crate::ledgerllm::provider::Capabilities,
    ) -> ChatParams {
        let defaults = self
            .registry
            .default_params(&active.provider, &active.friendly);
        ChatParams {
            temperature: request.temperature,
            max_tokens: request.max_tokens.or(defaults.max_tokens),
            reasoning_effort: if capabilities.supports_reasoning {
                request.reasoning_effort.clone()
            } else {
                None
            },
            tool_call_turn: false,
        }
    }

    /// Authorize and execute one turn's calls concurrently, preserving model order.
    async fn run_tool_round(
        &self,
        calls: &[crate::ledgerllm::provider::ToolCall],
        principal: Option<&Principal>,
        incoming: &[Message],
    ) -> Vec<ExecutedToolCall> {
        let last_user = incoming
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_ref().to_owned());

        let futures = calls.iter().map(|call| {
            let last_user = last_user.clone();
            async move {
                let permitted = call.name == RAG_TOOL
                    || principal.map(|p| p.may_call(&call.name)).unwrap_or(false);
                if !permitted {
                    log::warn!(
                        "tool call blocked: {} (user {})",
                        call.name,
                        principal.map(|p| p.user_id.as_str()).unwrap_or("anonymous")
                    );
                    return (call, Err(ToolError::Denied));
                }

                // The retrieval tool defaults its query to the latest user message.
                let mut args = call.arguments.clone();
                if call.name == RAG_TOOL {
                    let missing = args
                        .get("query")
                        .and_then(|q| q.as_str())
                        .map(|q| q.trim().is_empty())
                        .unwrap_or(true);
                    if missing {
                        if let (Some(obj), Some(query)) = (args.as_object_mut(), &last_user) {
                            obj.insert("query".to_string(), json!(query));
                        }
                    }
                }

                (call, self.tools.execute(&call.name, &args, principal).await)
            }
        });

        futures_util::future::join_all(futures)
            .await
            .into_iter()
            .map(|(call, result)| match result {
                Ok(value) => ExecutedToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: Some(value),
                    error: None,
                    denied: false,
                },
                Err(err) => ExecutedToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: None,
                    error: Some(err.to_string()),
                    denied: matches!(err, ToolError::Denied),
                },
            })
            .collect()
    }

    /// Persist the answer plus synthesized per-call summaries.
    async fn persist_outcome(
        &self,
        request: &ChatRequest,
        principal: Option<&Principal>,
        answer: &str,
        executed: &[ExecutedToolCall],
    ) -> Result<(), GatewayError> {
        let Some(session_id) = &request.session_id else {
            return Ok(());
        };
        let mut records = vec![StoredMessage::new("assistant", answer)];
        for call in executed.iter().filter(|c| !c.denied) {
            let summary = call
                .result
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string());
            records.push(StoredMessage::new(
                "assistant",
                format!("[tool_result] {}: {}", call.name, summary),
            ));
        }
        self.memory
            .append(
                session_id,
                principal.map(|p| p.user_id.as_str()).unwrap_or("anonymous"),
                &records,
            )
            .await?;
        Ok(())
    }
}

fn stored_to_message(stored: &StoredMessage) -> Option<Message> {
    match stored.role.as_str() {
        "system" => Some(Message::system(&stored.content)),
        "assistant" => Some(Message::assistant(&stored.content)),
        "user" => Some(Message::user(&stored.content)),
        // Tool-role records should never be persisted; treat any stray ones as orphans
        // so sanitization removes them.
        "tool" => Some(Message::tool("", &stored.content)),
        _ => None,
    }
}

fn message_to_stored(message: &Message) -> StoredMessage {
    let role = match &message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool { .. } => "tool",
    };
    StoredMessage::new(role, message.content.as_ref())
}

/// Wrap a native chunk stream in the frame protocol: content frames, then `done`; a
/// mid-stream failure emits a terminal `error` frame instead.
fn native_frames(chunks: crate::ledgerllm::provider::MessageChunkStream) -> FrameStream {
    enum State {
        Streaming(crate::ledgerllm::provider::MessageChunkStream),
        Done,
    }

    let frames = futures_util::stream::unfold(State::Streaming(chunks), |state| async move {
        match state {
            State::Streaming(mut chunks) => loop {
                match chunks.next().await {
                    Some(Ok(chunk)) => {
                        if chunk.content.is_empty() {
                            continue;
                        }
                        return Some((
                            StreamFrame::Content {
                                content: chunk.content,
                            },
                            State::Streaming(chunks),
                        ));
                    }
                    Some(Err(err)) => {
                        return Some((
                            StreamFrame::Error {
                                error: err.to_string(),
                            },
                            State::Done,
                        ));
                    }
                    None => return Some((StreamFrame::Done, State::Done)),
                }
            },
            State::Done => None,
        }
    });
    Box::pin(frames)
}
