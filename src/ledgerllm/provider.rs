//! Shared primitives for provider-agnostic LLM adapters.
//!
//! The gateway interacts with every vendor through the [`ProviderAdapter`] trait and the
//! lightweight data types defined in this module.  The trait abstracts over concrete vendor
//! implementations while the supporting structs describe chat messages, tool calls, streaming
//! chunks, and per-model capabilities.
//!
//! Each adapter owns four translations: message rendering to the vendor wire format, tool
//! descriptor rendering, parameter filtering for its model family, and error classification
//! into the uniform [`ProviderError`] taxonomy.  The orchestrator never sees vendor JSON;
//! it speaks [`Message`]/[`ToolCall`] and branches on [`Capabilities`].

use async_trait::async_trait;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// A single tool call returned by the LLM in a native function-calling response.
///
/// Providers assign an opaque [`id`](ToolCall::id) to each call so that the tool result can
/// be correlated back in a follow-up `Role::Tool` message.  Vendors that do not supply call
/// identifiers (e.g. Gemini) get a generated one at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned call ID, e.g. `"call_abc123"`.
    pub id: String,
    /// Tool name matching one of the [`ToolDefinition`]s sent in the request.
    pub name: String,
    /// Parsed JSON arguments supplied by the LLM for this call.
    ///
    /// Vendors frequently return arguments as a JSON-encoded string; adapters parse it and
    /// fall back to an empty object when the string is malformed, so this value is always an
    /// object and tool execution never fails on argument decoding.
    pub arguments: serde_json::Value,
}

/// Provider-agnostic tool descriptor passed to the LLM along with a chat request.
///
/// This is the internal wire format between the orchestrator and the adapters: a name, a
/// human-readable description, and a JSON-Schema object with `properties` and `required`.
/// Each adapter maps it to the vendor shape (function declarations, named input schemas, or
/// flat tool records).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name as it will appear in the vendor `tools` array.
    pub name: String,
    /// Human-readable description surfaced to the LLM to aid tool selection.
    pub description: String,
    /// JSON Schema object describing the accepted parameters.
    pub parameters: serde_json::Value,
}

/// Represents the possible roles for a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    /// A system authored message that primes or constrains assistant behaviour.
    System,
    /// A user authored message.
    User,
    /// An assistant authored message (model responses, possibly carrying tool calls).
    Assistant,
    /// A tool-result message correlating with a prior assistant [`ToolCall`].
    Tool {
        /// The originating call id this result answers.
        call_id: String,
    },
}

/// Represents a generic message exchanged with an LLM.
///
/// The `tool_calls` field is populated on assistant messages when the provider returns
/// native function-calling results, and when the orchestrator replays an assistant tool
/// turn back into the transcript.  It is empty for all other message kinds.
#[derive(Debug, Clone)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The message body.  Stored as `Arc<str>` so that transcripts can be cheaply cloned
    /// between the orchestrator, the adapters, and the memory store.
    pub content: Arc<str>,
    /// Native tool calls requested by the assistant.
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    /// Build a system message.
    pub fn system(content: impl AsRef<str>) -> Self {
        Message {
            role: Role::System,
            content: Arc::from(content.as_ref()),
            tool_calls: vec![],
        }
    }

    /// Build a user message.
    pub fn user(content: impl AsRef<str>) -> Self {
        Message {
            role: Role::User,
            content: Arc::from(content.as_ref()),
            tool_calls: vec![],
        }
    }

    /// Build an assistant message without tool calls.
    pub fn assistant(content: impl AsRef<str>) -> Self {
        Message {
            role: Role::Assistant,
            content: Arc::from(content.as_ref()),
            tool_calls: vec![],
        }
    }

    /// Build an assistant message that carries the given tool calls.
    pub fn assistant_with_calls(content: impl AsRef<str>, tool_calls: Vec<ToolCall>) -> Self {
        Message {
            role: Role::Assistant,
            content: Arc::from(content.as_ref()),
            tool_calls,
        }
    }

    /// Build a tool-result message answering `call_id`.
    pub fn tool(call_id: impl Into<String>, content: impl AsRef<str>) -> Self {
        Message {
            role: Role::Tool {
                call_id: call_id.into(),
            },
            content: Arc::from(content.as_ref()),
            tool_calls: vec![],
        }
    }
}

/// Wire convention a vendor uses to express tool calls and their results in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSchema {
    /// Assistant message carries `tool_calls[]`; each result is a separate `role="tool"`
    /// message bearing the originating call id.
    OpenAi,
    /// Assistant message contains mixed content blocks including `tool_use`; results are a
    /// user-role message carrying `tool_result` blocks referencing the use id.
    Anthropic,
    /// No structured tool schema; results are inlined into textual history.
    Text,
}

/// Per provider/model capability flags.
///
/// Exactly one `Capabilities` record exists per `(provider, model)`; both the registry and
/// the adapters derive it from the same provider+family rule table in
/// [`Capabilities::for_model`].
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub supports_streaming: bool,
    pub supports_tool_calls: bool,
    pub supports_system_messages: bool,
    pub supports_reasoning: bool,
    pub tool_schema: ToolSchema,
    pub max_context_length: usize,
}

impl Capabilities {
    /// Capability rule table keyed by provider and model family.
    ///
    /// `reasoning` marks models listed under the registry's reasoning category; for vendors
    /// without a reasoning tier the flag is ignored.
    pub fn for_model(provider: &str, api_name: &str, reasoning: bool) -> Capabilities {
        match provider {
            "openai" => Capabilities {
                supports_streaming: true,
                supports_tool_calls: true,
                supports_system_messages: true,
                supports_reasoning: reasoning || is_openai_reasoning_model(api_name),
                tool_schema: ToolSchema::OpenAi,
                max_context_length: 128_000,
            },
            "anthropic" => Capabilities {
                supports_streaming: true,
                supports_tool_calls: true,
                supports_system_messages: true,
                supports_reasoning: false,
                tool_schema: ToolSchema::Anthropic,
                max_context_length: 200_000,
            },
            "google" => Capabilities {
                supports_streaming: true,
                supports_tool_calls: true,
                supports_system_messages: true,
                supports_reasoning: false,
                tool_schema: ToolSchema::OpenAi,
                max_context_length: 1_048_576,
            },
            "cohere" => {
                let light = api_name.starts_with("command-light");
                Capabilities {
                    supports_streaming: true,
                    supports_tool_calls: !light,
                    supports_system_messages: true,
                    supports_reasoning: false,
                    tool_schema: ToolSchema::OpenAi,
                    max_context_length: if light { 4_096 } else { 128_000 },
                }
            }
            "mistral" => Capabilities {
                supports_streaming: true,
                supports_tool_calls: true,
                supports_system_messages: true,
                supports_reasoning: reasoning,
                tool_schema: ToolSchema::OpenAi,
                max_context_length: 128_000,
            },
            "fireworks" => Capabilities {
                supports_streaming: true,
                supports_tool_calls: true,
                supports_system_messages: true,
                supports_reasoning: reasoning || api_name.contains("deepseek-r1"),
                tool_schema: ToolSchema::OpenAi,
                max_context_length: 32_768,
            },
            _ => Capabilities {
                supports_streaming: false,
                supports_tool_calls: false,
                supports_system_messages: true,
                supports_reasoning: false,
                tool_schema: ToolSchema::Text,
                max_context_length: 4_096,
            },
        }
    }
}

/// OpenAI reasoning-tier detection by model-name prefix (o1/o3/o4 series).
pub fn is_openai_reasoning_model(api_name: &str) -> bool {
    api_name.starts_with("o1") || api_name.starts_with("o3") || api_name.starts_with("o4")
}

/// Request parameters carried through the orchestrator into an adapter call.
///
/// Adapters consume only what their model family accepts: reasoning-class models reject
/// `temperature` and may rename the token limit; non-reasoning models drop
/// `reasoning_effort`; some vendors clamp temperature on tool-calling turns.
#[derive(Debug, Clone, Default)]
pub struct ChatParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub reasoning_effort: Option<String>,
    /// Set by the orchestrator on turns where tools are offered, so adapters can apply
    /// their determinism guidance (e.g. Mistral and Fireworks clamp temperature to 0.1).
    pub tool_call_turn: bool,
}

/// Response content as vendors actually ship it: either a bare string or a list of blocks.
///
/// The total [`as_text`](ResponseContent::as_text) projection concatenates text blocks in
/// order and maps structurally-present-but-empty content to the empty string, never a
/// sentinel.
#[derive(Debug, Clone)]
pub enum ResponseContent {
    Text(String),
    Blocks(Vec<serde_json::Value>),
}

impl ResponseContent {
    /// Interpret a raw JSON `content` field.
    pub fn from_value(value: &serde_json::Value) -> ResponseContent {
        match value {
            serde_json::Value::String(s) => ResponseContent::Text(s.clone()),
            serde_json::Value::Array(blocks) => ResponseContent::Blocks(blocks.clone()),
            _ => ResponseContent::Text(String::new()),
        }
    }

    /// Project the content to plain text.
    pub fn as_text(&self) -> String {
        match self {
            ResponseContent::Text(s) => s.clone(),
            ResponseContent::Blocks(blocks) => {
                let mut out = String::new();
                for block in blocks {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        out.push_str(text);
                    }
                }
                out
            }
        }
    }
}

/// Represents a chunk of content in a streaming response.
#[derive(Clone, Debug)]
pub struct MessageChunk {
    /// The incremental content delta in this chunk.
    pub content: String,
    /// Optional finish reason mirroring the provider specific completion status (e.g. `"stop"`).
    pub finish_reason: Option<String>,
}

/// Type alias for a stream of message chunks compatible with `Send` executors.
pub type MessageChunkStream =
    Pin<Box<dyn Stream<Item = Result<MessageChunk, ProviderError>> + Send>>;

/// Uniform error taxonomy across all vendor adapters.
///
/// The orchestrator and the HTTP surface branch on the variant, never on vendor-specific
/// payloads: `Auth` surfaces as 401, `RateLimit` as 429, `ModelNotFound` as 404,
/// `Connection` as 502 (retried once inside the adapter at most), everything else as 500.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("[{provider}] authentication failed: {message}")]
    Auth { provider: String, message: String },
    #[error("[{provider}] rate limit exceeded: {message}")]
    RateLimit { provider: String, message: String },
    #[error("[{provider}/{model}] model not found: {message}")]
    ModelNotFound {
        provider: String,
        model: String,
        message: String,
    },
    #[error("[{provider}] connection failed: {message}")]
    Connection { provider: String, message: String },
    #[error("[{provider}/{model}] API error: {message}")]
    Api {
        provider: String,
        model: String,
        message: String,
    },
}

impl ProviderError {
    /// Provider that produced the error.
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Auth { provider, .. }
            | ProviderError::RateLimit { provider, .. }
            | ProviderError::ModelNotFound { provider, .. }
            | ProviderError::Connection { provider, .. }
            | ProviderError::Api { provider, .. } => provider,
        }
    }
}

/// Result of probing a provider with a one-token request.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub provider: String,
    pub model: String,
}

/// Trait-driven abstraction over a concrete LLM vendor.
///
/// A [`ProviderAdapter`] translates gateway requests into the vendor wire format and returns
/// vendor responses in a uniform shape.  The abstraction deliberately excludes conversation
/// bookkeeping; for that see [`crate::ledgerllm::orchestrator::Orchestrator`].
///
/// All implementations **must** be thread-safe (`Send + Sync`) and stateless apart from the
/// shared pooled HTTP client, so a single adapter instance can be cached per
/// `(provider, model)` and shared between concurrent requests.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Send a full request/response chat completion without tools.
    ///
    /// The `messages` slice must include any system priming the caller wishes to send; the
    /// adapter folds or lifts system content according to its vendor's conventions.
    async fn chat(
        &self,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<String, ProviderError>;

    /// Send a chat completion with native tool definitions attached.
    ///
    /// On success the returned tuple carries the assistant text (possibly empty) and the
    /// tool calls the model selected, in the order the model produced them.
    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &ChatParams,
    ) -> Result<(String, Vec<ToolCall>), ProviderError>;

    /// Request a streaming response from the provider.
    ///
    /// Adapters for vendors without native streaming synthesize chunks by slicing a
    /// completed response at a fixed character granularity; callers cannot distinguish the
    /// two beyond latency.
    async fn chat_stream(
        &self,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<MessageChunkStream, ProviderError>;

    /// Return the capability record for this adapter's model.
    fn capabilities(&self) -> Capabilities;

    /// Vendor identifier, e.g. `"openai"`.
    fn provider_name(&self) -> &str;

    /// Model identifier injected into each request, e.g. `"gpt-4o-mini"`.
    fn model_name(&self) -> &str;

    /// Probe the provider with a tiny request and report latency plus a response sample.
    async fn test_connection(&self) -> ConnectionTest {
        let params = ChatParams {
            max_tokens: Some(5),
            ..ChatParams::default()
        };
        let start = Instant::now();
        match self.chat(&[Message::user("Hello")], &params).await {
            Ok(text) => {
                let sample = if text.chars().count() > 50 {
                    format!("{}...", text.chars().take(50).collect::<String>())
                } else {
                    text
                };
                ConnectionTest {
                    success: true,
                    response_time_ms: start.elapsed().as_millis(),
                    sample: Some(sample),
                    error: None,
                    provider: self.provider_name().to_string(),
                    model: self.model_name().to_string(),
                }
            }
            Err(err) => ConnectionTest {
                success: false,
                response_time_ms: start.elapsed().as_millis(),
                sample: None,
                error: Some(err.to_string()),
                provider: self.provider_name().to_string(),
                model: self.model_name().to_string(),
            },
        }
    }
}
