//! OpenAI Chat Completions adapter.
//!
//! Speaks the stock Chat Completions wire format (schema A tool calling) and applies the
//! parameter rules of the o-series reasoning tier: reasoning models reject `temperature`,
//! take their token limit as `max_completion_tokens`, and accept a `reasoning_effort`
//! knob that every other family drops.
//!
//! Streaming is native: the adapter consumes the SSE `data:` frames of
//! `stream: true` responses and yields content deltas as they arrive.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ledgerllm::provider::{
    is_openai_reasoning_model, Capabilities, ChatParams, Message, MessageChunkStream,
    ProviderAdapter, ProviderError, ToolCall, ToolDefinition,
};
use crate::ledgerllm::providers::common::{
    classify_error, connection_error, openai_wire_messages, openai_wire_tools,
    parse_openai_message, post_json, shared_http_client, sse_content_stream, VENDOR_TIMEOUT,
};

/// Adapter for OpenAI's Chat Completions API.
pub struct OpenAiAdapter {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiAdapter {
    /// Construct an adapter using the default OpenAI base URL.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, "https://api.openai.com/v1")
    }

    /// Construct an adapter pointing at an OpenAI-compatible base URL.
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        OpenAiAdapter {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: shared_http_client().clone(),
        }
    }

    fn is_reasoning(&self) -> bool {
        is_openai_reasoning_model(&self.model)
    }

    /// Apply the o-series parameter rules to an outgoing request body.
    pub fn apply_params(&self, body: &mut Value, params: &ChatParams) {
        if let Some(max_tokens) = params.max_tokens {
            let key = if self.is_reasoning() {
                "max_completion_tokens"
            } else {
                "max_tokens"
            };
            body[key] = json!(max_tokens);
        }
        if let Some(temperature) = params.temperature {
            if !self.is_reasoning() {
                body["temperature"] = json!(temperature);
            }
        }
        if let Some(effort) = &params.reasoning_effort {
            if self.is_reasoning() {
                body["reasoning_effort"] = json!(effort);
            }
        }
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
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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
            "openai",
            &self.model,
            &self.chat_url(),
            &self.headers(),
            &body,
        )
        .await?;
        let (content, _) = parse_openai_message(&parsed);
        Ok(content)
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
            "openai",
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
        let mut body = json!({
            "model": self.model,
            "messages": openai_wire_messages(messages),
            "stream": true
        });
        self.apply_params(&mut body, params);

        let mut request = self
            .http
            .post(self.chat_url())
            .timeout(VENDOR_TIMEOUT)
            .json(&body);
        for (name, value) in self.headers() {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| connection_error("openai", &e))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error("openai", &self.model, status, &text));
        }
        Ok(sse_content_stream(response, "openai".to_string()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::for_model("openai", &self.model, self.is_reasoning())
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
