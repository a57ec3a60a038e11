//! Cohere v2 Chat adapter.
//!
//! Cohere's v2 surface is close enough to the Chat Completions shape that the schema A
//! wire helpers apply directly; the differences are the `/chat` path, the extra sampling
//! knobs, and the `message.content` block list in responses.  `command-light` models
//! drop tool support and shrink to a 4k context, which the capability table reflects.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ledgerllm::provider::{
    Capabilities, ChatParams, Message, MessageChunkStream, ProviderAdapter, ProviderError,
    ResponseContent, ToolCall, ToolDefinition,
};
use crate::ledgerllm::providers::common::{
    openai_wire_messages, openai_wire_tools, parse_tool_arguments, post_json,
    shared_http_client, simulate_stream, STREAM_CHUNK_CHARS,
};

/// Adapter for Cohere's v2 `/chat` endpoint.
pub struct CohereAdapter {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl CohereAdapter {
    /// Construct an adapter using the default Cohere v2 base URL.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, "https://api.cohere.com/v2")
    }

    /// Construct an adapter pointing at a custom base URL.
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        CohereAdapter {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: shared_http_client().clone(),
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", format!("Bearer {}", self.api_key)),
            ("Content-Type", "application/json".to_string()),
        ]
    }

    fn apply_params(body: &mut Value, params: &ChatParams) {
        if let Some(temperature) = params.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
    }

    /// Pull assistant text and tool calls out of a v2 chat response.
    ///
    /// `message.content` is a block list (`{"type":"text","text":...}`);
    /// `message.tool_calls` follows the Chat Completions function shape.
    pub fn parse_response(data: &Value) -> (String, Vec<ToolCall>) {
        let message = data.get("message");

        let content = message
            .and_then(|m| m.get("content"))
            .map(|c| ResponseContent::from_value(c).as_text())
            .unwrap_or_default();

        let tool_calls = message
            .and_then(|m| m.get("tool_calls"))
            .and_then(|tc| tc.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|tc| {
                        let func = tc.get("function")?;
                        Some(ToolCall {
                            id: tc
                                .get("id")
                                .and_then(|i| i.as_str())
                                .map(|s| s.to_string())
                                .unwrap_or_else(|| {
                                    format!("call_{}", uuid::Uuid::new_v4().simple())
                                }),
                            name: func.get("name")?.as_str()?.to_string(),
                            arguments: parse_tool_arguments(func.get("arguments")),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        (content, tool_calls)
    }

    async fn send(&self, body: &Value) -> Result<Value, ProviderError> {
        post_json(
            &self.http,
            "cohere",
            &self.model,
            &format!("{}/chat", self.base_url),
            &self.headers(),
            body,
        )
        .await
    }
}

#[async_trait]
impl ProviderAdapter for CohereAdapter {
    async fn chat(
        &self,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<String, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "messages": openai_wire_messages(messages),
            "stream": false
        });
        Self::apply_params(&mut body, params);
        let data = self.send(&body).await?;
        Ok(Self::parse_response(&data).0)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &ChatParams,
    ) -> Result<(String, Vec<ToolCall>), ProviderError> {
        let mut body = json!({
            "model": self.model,
            "messages": openai_wire_messages(messages),
            "tools": openai_wire_tools(tools),
            "stream": false,
            "tool_choice": "auto"
        });
        Self::apply_params(&mut body, params);
        let data = self.send(&body).await?;
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
        Capabilities::for_model("cohere", &self.model, false)
    }

    fn provider_name(&self) -> &str {
        "cohere"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
