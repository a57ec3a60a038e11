//! Fireworks AI adapter.
//!
//! Fireworks serves open-weight models behind a Chat Completions compatible surface with
//! `accounts/fireworks/models/...` identifiers.  Like Mistral, its function-calling
//! guidance asks for near-zero temperature, so tool-calling turns clamp to 0.1.  The
//! deepseek-r1 family is the reasoning tier and accepts `reasoning_effort`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ledgerllm::provider::{
    Capabilities, ChatParams, Message, MessageChunkStream, ProviderAdapter, ProviderError,
    ToolCall, ToolDefinition,
};
use crate::ledgerllm::providers::common::{
    openai_wire_messages, openai_wire_tools, parse_openai_message, post_json,
    shared_http_client, simulate_stream, STREAM_CHUNK_CHARS,
};

/// Adapter for the Fireworks AI inference API.
pub struct FireworksAdapter {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl FireworksAdapter {
    /// Construct an adapter using the default Fireworks base URL.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, "https://api.fireworks.ai/inference/v1")
    }

    /// Construct an adapter pointing at a custom base URL.
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        FireworksAdapter {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: shared_http_client().clone(),
        }
    }

    fn is_reasoning(&self) -> bool {
        self.model.contains("deepseek-r1")
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", format!("Bearer {}", self.api_key)),
            ("Content-Type", "application/json".to_string()),
        ]
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Apply Fireworks parameter rules: tool turns clamp temperature, reasoning models
    /// forward `reasoning_effort`.
    pub fn apply_params(&self, body: &mut Value, params: &ChatParams) {
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = params.temperature {
            let effective = if params.tool_call_turn && temperature > 0.1 {
                0.1
            } else {
                temperature
            };
            body["temperature"] = json!(effective);
        }
        if let Some(effort) = &params.reasoning_effort {
            if self.is_reasoning() {
                body["reasoning_effort"] = json!(effort);
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for FireworksAdapter {
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
        self.apply_params(&mut body, params);

        let parsed = post_json(
            &self.http,
            "fireworks",
            &self.model,
            &self.chat_url(),
            &self.headers(),
            &body,
        )
        .await?;
        Ok(parse_openai_message(&parsed).0)
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
            "stream": false
        });
        self.apply_params(&mut body, params);

        let parsed = post_json(
            &self.http,
            "fireworks",
            &self.model,
            &self.chat_url(),
            &self.headers(),
            &body,
        )
        .await?;
        Ok(parse_openai_message(&parsed))
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
        Capabilities::for_model("fireworks", &self.model, self.is_reasoning())
    }

    fn provider_name(&self) -> &str {
        "fireworks"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
