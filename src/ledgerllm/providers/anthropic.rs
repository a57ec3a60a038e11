//! Anthropic Messages API adapter.
//!
//! Claude speaks schema B: assistant turns carry mixed content blocks (`text` plus
//! `tool_use`), and tool results travel back as user-role messages holding `tool_result`
//! blocks that reference the originating use id.  The adapter renders the gateway's
//! internal transcript into that shape, lifting a leading system message into the
//! payload-level `system` field.
//!
//! The Messages API requires `max_tokens` on every request; the adapter fills in 1024
//! when the caller leaves it unset.  Streaming is synthesized from a completed response.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ledgerllm::provider::{
    Capabilities, ChatParams, Message, MessageChunkStream, ProviderAdapter, ProviderError,
    ResponseContent, Role, ToolCall, ToolDefinition,
};
use crate::ledgerllm::providers::common::{
    post_json, shared_http_client, simulate_stream, STREAM_CHUNK_CHARS,
};

const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Adapter for Anthropic's Messages API.
pub struct AnthropicAdapter {
    api_key: String,
    model: String,
    base_url: String,
    api_version: String,
    http: reqwest::Client,
}

impl AnthropicAdapter {
    /// Construct an adapter using the default Anthropic base URL.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, "https://api.anthropic.com")
    }

    /// Construct an adapter pointing at a custom Messages-compatible base URL.
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        AnthropicAdapter {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: "2023-06-01".to_string(),
            http: shared_http_client().clone(),
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", self.api_version.clone()),
            ("Content-Type", "application/json".to_string()),
        ]
    }

    /// Render the internal transcript into a Messages API payload.
    ///
    /// System content moves to the payload `system` field.  Assistant turns with tool
    /// calls become `text` + `tool_use` block lists; `Role::Tool` messages become
    /// user-role `tool_result` blocks referencing the use id.
    pub fn build_payload(&self, messages: &[Message], params: &ChatParams) -> Value {
        let mut system_content: Option<String> = None;
        let mut wire: Vec<Value> = Vec::new();

        for msg in messages {
            match &msg.role {
                Role::System => {
                    system_content = Some(msg.content.as_ref().to_owned());
                }
                Role::Assistant if !msg.tool_calls.is_empty() => {
                    let mut blocks: Vec<Value> = Vec::new();
                    if !msg.content.trim().is_empty() {
                        blocks.push(json!({"type": "text", "text": msg.content.as_ref()}));
                    }
                    for tc in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": tc.arguments
                        }));
                    }
                    wire.push(json!({"role": "assistant", "content": blocks}));
                }
                Role::Tool { call_id } => {
                    wire.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": call_id,
                            "content": msg.content.as_ref()
                        }]
                    }));
                }
                Role::User => {
                    wire.push(json!({"role": "user", "content": msg.content.as_ref()}));
                }
                Role::Assistant => {
                    wire.push(json!({"role": "assistant", "content": msg.content.as_ref()}));
                }
            }
        }

        let mut payload = json!({
            "model": self.model,
            "messages": wire,
            "max_tokens": params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
        });
        if let Some(system) = system_content {
            payload["system"] = json!(system);
        }
        if let Some(temperature) = params.temperature {
            payload["temperature"] = json!(temperature);
        }
        payload
    }

    /// Pull assistant text and tool calls out of a Messages API response.
    pub fn parse_response(data: &Value) -> (String, Vec<ToolCall>) {
        let content = data
            .get("content")
            .map(|c| ResponseContent::from_value(c).as_text())
            .unwrap_or_default();

        let tool_calls = data
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
                    .filter_map(|b| {
                        Some(ToolCall {
                            id: b.get("id")?.as_str()?.to_string(),
                            name: b.get("name")?.as_str()?.to_string(),
                            arguments: b
                                .get("input")
                                .cloned()
                                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        (content, tool_calls)
    }

    async fn send(&self, payload: &Value) -> Result<Value, ProviderError> {
        post_json(
            &self.http,
            "anthropic",
            &self.model,
            &format!("{}/v1/messages", self.base_url),
            &self.headers(),
            payload,
        )
        .await
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn chat(
        &self,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<String, ProviderError> {
        let payload = self.build_payload(messages, params);
        let data = self.send(&payload).await?;
        Ok(Self::parse_response(&data).0)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &ChatParams,
    ) -> Result<(String, Vec<ToolCall>), ProviderError> {
        let mut payload = self.build_payload(messages, params);
        let wire_tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters
                })
            })
            .collect();
        payload["tools"] = json!(wire_tools);

        let data = self.send(&payload).await?;
        Ok(Self::parse_response(&data))
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<MessageChunkStream, ProviderError> {
        let full = self.chat(messages, params).await?;
        Ok(simulate_stream(&full, STREAM_CHUNK_CHARS))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::for_model("anthropic", &self.model, false)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
