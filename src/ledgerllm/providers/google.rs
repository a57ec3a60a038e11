//! Google Gemini (Generative Language) adapter.
//!
//! Gemini takes `contents` made of role-tagged `parts`, with the assistant role spelled
//! `model` and system text carried in a payload-level `systemInstruction`.  Tool
//! descriptors become `functionDeclarations`; the model answers with `functionCall` parts
//! that carry no call ids, so the adapter mints one per call for transcript correlation.
//!
//! Gemini has no native `role="tool"` turn in this surface; sanitized tool results are
//! rendered as plain user parts so multi-turn tool loops still read coherently.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ledgerllm::provider::{
    Capabilities, ChatParams, Message, MessageChunkStream, ProviderAdapter, ProviderError, Role,
    ToolCall, ToolDefinition,
};
use crate::ledgerllm::providers::common::{
    post_json, shared_http_client, simulate_stream, STREAM_CHUNK_CHARS,
};

/// Adapter for Google's Generative Language `generateContent` endpoint.
pub struct GoogleAdapter {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl GoogleAdapter {
    /// Construct an adapter using the default Generative Language base URL.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, "https://generativelanguage.googleapis.com")
    }

    /// Construct an adapter pointing at a custom base URL.
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        GoogleAdapter {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: shared_http_client().clone(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Render the internal transcript into a `generateContent` payload.
    pub fn build_payload(messages: &[Message], params: &ChatParams) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        let mut system_instruction: Option<String> = None;

        for msg in messages {
            match &msg.role {
                Role::System => {
                    system_instruction = Some(msg.content.as_ref().to_owned());
                }
                Role::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": msg.content.as_ref()}]
                    }));
                }
                Role::Assistant => {
                    contents.push(json!({
                        "role": "model",
                        "parts": [{"text": msg.content.as_ref()}]
                    }));
                }
                Role::Tool { call_id } => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": format!(
                            "Tool result ({}): {}", call_id, msg.content.as_ref()
                        )}]
                    }));
                }
            }
        }

        let mut payload = json!({"contents": contents});
        if let Some(system) = system_instruction {
            payload["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = params.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = params.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            payload["generationConfig"] = Value::Object(generation_config);
        }
        payload
    }

    /// Pull concatenated text and function calls out of a `generateContent` response.
    pub fn parse_response(data: &Value) -> (String, Vec<ToolCall>) {
        let parts = data
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let mut text = String::new();
        let mut calls = Vec::new();
        for part in &parts {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                text.push_str(t);
            }
            if let Some(fc) = part.get("functionCall") {
                if let Some(name) = fc.get("name").and_then(|n| n.as_str()) {
                    calls.push(ToolCall {
                        // Gemini does not return call ids.
                        id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                        name: name.to_string(),
                        arguments: fc
                            .get("args")
                            .cloned()
                            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
                    });
                }
            }
        }
        (text, calls)
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    async fn chat(
        &self,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<String, ProviderError> {
        let payload = Self::build_payload(messages, params);
        let data = post_json(
            &self.http,
            "google",
            &self.model,
            &self.url(),
            &[("Content-Type", "application/json".to_string())],
            &payload,
        )
        .await?;
        Ok(Self::parse_response(&data).0)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &ChatParams,
    ) -> Result<(String, Vec<ToolCall>), ProviderError> {
        let mut payload = Self::build_payload(messages, params);

        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters
                })
            })
            .collect();
        if !declarations.is_empty() {
            payload["tools"] = json!([{"functionDeclarations": declarations}]);
        }

        let data = post_json(
            &self.http,
            "google",
            &self.model,
            &self.url(),
            &[("Content-Type", "application/json".to_string())],
            &payload,
        )
        .await?;
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
        Capabilities::for_model("google", &self.model, false)
    }

    fn provider_name(&self) -> &str {
        "google"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
