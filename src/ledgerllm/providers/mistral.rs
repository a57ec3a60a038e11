//! Mistral adapter.
//!
//! Mistral's API is Chat Completions compatible, so the schema A helpers do the heavy
//! lifting.  The family-specific rule lives in parameter filtering: on tool-calling turns
//! the temperature is clamped to at most 0.1, per Mistral's determinism guidance for
//! function calling.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ledgerllm::provider::{
    Capabilities, ChatParams, Message, MessageChunkStream, ProviderAdapter, ProviderError,
    ToolCall, ToolDefinition,
};
use crate::ledgerllm::providers::common::{
    classify_error, connection_error, openai_wire_messages, openai_wire_tools,
    parse_openai_message, post_json, shared_http_client, sse_content_stream, VENDOR_TIMEOUT,
};

/// Adapter for Mistral's Chat Completions compatible API.
pub struct MistralAdapter {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl MistralAdapter {
    /// Construct an adapter using the default Mistral base URL.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, "https://api.mistral.ai/v1")
    }

    /// Construct an adapter pointing at a custom base URL.
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        MistralAdapter {
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

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Apply Mistral's parameter rules, clamping temperature on tool-calling turns.
    pub fn apply_params(body: &mut Value, params: &ChatParams) {
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = params.temperature {
            let effective = if params.tool_call_turn {
                temperature.min(0.1)
            } else {
                temperature
            };
            body["temperature"] = json!(effective);
        }
    }
}

#[async_trait]
impl ProviderAdapter for MistralAdapter {
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

        let parsed = post_json(
            &self.http,
            "mistral",
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
            "tool_choice": "auto",
            "stream": false
        });
        Self::apply_params(&mut body, params);

        let parsed = post_json(
            &self.http,
            "mistral",
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
        Self::apply_params(&mut body, params);

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
            .map_err(|e| connection_error("mistral", &e))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error("mistral", &self.model, status, &text));
        }
        Ok(sse_content_stream(response, "mistral".to_string()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::for_model("mistral", &self.model, false)
    }

    fn provider_name(&self) -> &str {
        "mistral"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
