//! Shared utilities used across the vendor adapter implementations.
//!
//! The helpers in this module carry everything the OpenAI-compatible vendors (OpenAI,
//! Mistral, Fireworks, and Cohere's v2 surface) have in common: a tuned [`reqwest`] client
//! with persistent connection pooling, wire rendering of the internal [`Message`] and
//! [`ToolDefinition`] types, response parsing with the gateway's resilience rules, error
//! classification into [`ProviderError`], and both native (SSE) and synthesized streaming.
//!
//! Adapters for vendors with their own wire formats (Anthropic, Google) reuse the client,
//! the error classification, and the streaming helpers, and keep their conversions local.

use crate::ledgerllm::provider::{
    Message, MessageChunk, MessageChunkStream, ProviderError, ResponseContent, Role, ToolCall,
    ToolDefinition,
};
use futures_util::StreamExt;
use lazy_static::lazy_static;
use serde_json::{json, Value};
use std::time::Duration;

/// Vendor calls are given one minute before the request is abandoned.
pub const VENDOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Character granularity used when a completed response is sliced into synthetic chunks.
pub const STREAM_CHUNK_CHARS: usize = 50;

lazy_static! {
    /// Shared HTTP client with persistent connection pooling.
    ///
    /// The single client instance keeps TLS sessions and DNS lookups warm, which
    /// significantly reduces latency when many concurrent requests are issued to upstream
    /// providers.  Per-request timeouts are applied at the call sites.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = {
        reqwest::ClientBuilder::new()
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build shared HTTP client")
    };
}

/// Borrow the lazily initialised shared [`reqwest::Client`].
///
/// The returned reference can be cloned and reused by individual adapters.
pub fn shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

/// Serialise messages to the OpenAI Chat Completions wire format.
///
/// | [`Role`] variant | Wire representation |
/// |---|---|
/// | `System` | `{"role":"system","content":"..."}` |
/// | `User` | `{"role":"user","content":"..."}` |
/// | `Assistant` with tool_calls | `{"role":"assistant","content":...,"tool_calls":[...]}` |
/// | `Assistant` without tool_calls | `{"role":"assistant","content":"..."}` |
/// | `Tool { call_id }` | `{"role":"tool","tool_call_id":"<id>","content":"..."}` |
pub fn openai_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match &msg.role {
            Role::System => json!({
                "role": "system",
                "content": msg.content.as_ref()
            }),
            Role::User => json!({
                "role": "user",
                "content": msg.content.as_ref()
            }),
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    json!({
                        "role": "assistant",
                        "content": msg.content.as_ref()
                    })
                } else {
                    let tool_calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": serde_json::to_string(&tc.arguments)
                                        .unwrap_or_else(|_| "{}".to_string())
                                }
                            })
                        })
                        .collect();
                    let content = if msg.content.is_empty() {
                        Value::Null
                    } else {
                        Value::String(msg.content.as_ref().to_owned())
                    };
                    json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": tool_calls
                    })
                }
            }
            Role::Tool { call_id } => json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": msg.content.as_ref()
            }),
        })
        .collect()
}

/// Serialise tool descriptors to the OpenAI `tools` array shape.
pub fn openai_wire_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters
                }
            })
        })
        .collect()
}

/// Interpret a raw tool-call `arguments` value.
///
/// Vendors ship arguments either as a JSON object or as a JSON-encoded string.  Strings
/// that fail to parse yield an empty object, never an error, so a malformed call still
/// reaches the executor.
pub fn parse_tool_arguments(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
        }
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// Extract assistant text and tool calls from an OpenAI-shaped `choices[0].message`.
///
/// A `content` field that is structurally present but semantically empty (null, or an
/// empty block list) projects to the empty string.
pub fn parse_openai_message(parsed: &Value) -> (String, Vec<ToolCall>) {
    let message = parsed
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"));

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
                    let name = func.get("name")?.as_str()?.to_string();
                    let id = tc
                        .get("id")
                        .and_then(|i| i.as_str())
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                    Some(ToolCall {
                        id,
                        name,
                        arguments: parse_tool_arguments(func.get("arguments")),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    (content, tool_calls)
}

/// Pull a human-readable error message out of a vendor error body.
///
/// Tries the common paths (`error.message`, `error.detail`, `message`, `detail`) before
/// falling back to the raw body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        let paths: [&[&str]; 4] = [
            &["error", "message"],
            &["error", "detail"],
            &["message"],
            &["detail"],
        ];
        for path in paths {
            let mut current = &parsed;
            let mut found = true;
            for key in path {
                match current.get(key) {
                    Some(next) => current = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found {
                if let Some(s) = current.as_str() {
                    return s.to_string();
                }
            }
        }
    }
    truncate_chars(body, 500)
}

/// Truncate a string to at most `limit` characters without splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

/// Classify a non-success vendor response into the uniform error taxonomy.
///
/// Status codes decide first (401/403 auth, 429 rate limit, 404 model); the vendor's error
/// message is then matched against indicator substrings so vendors that hide semantics
/// behind generic 400s still classify correctly.
pub fn classify_error(provider: &str, model: &str, status: u16, body: &str) -> ProviderError {
    let message = extract_error_message(body);
    let lowered = message.to_lowercase();

    if status == 401
        || status == 403
        || lowered.contains("authentication")
        || lowered.contains("unauthorized")
        || lowered.contains("api key")
    {
        return ProviderError::Auth {
            provider: provider.to_string(),
            message,
        };
    }
    if status == 429 || lowered.contains("rate limit") || lowered.contains("too many requests") {
        return ProviderError::RateLimit {
            provider: provider.to_string(),
            message,
        };
    }
    if status == 404 || lowered.contains("model not found") || lowered.contains("invalid model") {
        return ProviderError::ModelNotFound {
            provider: provider.to_string(),
            model: model.to_string(),
            message,
        };
    }
    ProviderError::Api {
        provider: provider.to_string(),
        model: model.to_string(),
        message: format!("HTTP {}: {}", status, message),
    }
}

/// Map a transport failure to [`ProviderError::Connection`].
pub fn connection_error(provider: &str, err: &reqwest::Error) -> ProviderError {
    ProviderError::Connection {
        provider: provider.to_string(),
        message: err.to_string(),
    }
}

/// POST a JSON body to a vendor endpoint and return the parsed response.
///
/// Transport failures are retried once before surfacing as `Connection`; HTTP error
/// statuses are classified via [`classify_error`].
pub async fn post_json(
    client: &reqwest::Client,
    provider: &str,
    model: &str,
    url: &str,
    headers: &[(&str, String)],
    body: &Value,
) -> Result<Value, ProviderError> {
    let mut last_err: Option<reqwest::Error> = None;

    for attempt in 0..2 {
        let mut request = client.post(url).timeout(VENDOR_TIMEOUT).json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                if !(200..300).contains(&status) {
                    return Err(classify_error(provider, model, status, &text));
                }
                return serde_json::from_str(&text).map_err(|e| ProviderError::Api {
                    provider: provider.to_string(),
                    model: model.to_string(),
                    message: format!("invalid JSON response: {}", e),
                });
            }
            Err(err) => {
                if attempt == 0 {
                    log::warn!(
                        "[{}] transport error, retrying once: {}",
                        provider,
                        err
                    );
                }
                last_err = Some(err);
            }
        }
    }

    Err(connection_error(
        provider,
        &last_err.expect("retry loop records the error"),
    ))
}

/// Slice a completed response into a finite chunk stream.
///
/// Used by adapters whose vendor lacks native streaming; the orchestrator and the HTTP
/// framing consume it exactly like a native stream.
pub fn simulate_stream(text: &str, granularity: usize) -> MessageChunkStream {
    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<Result<MessageChunk, ProviderError>> = chars
        .chunks(granularity.max(1))
        .map(|piece| {
            Ok(MessageChunk {
                content: piece.iter().collect(),
                finish_reason: None,
            })
        })
        .collect();
    Box::pin(futures_util::stream::iter(chunks))
}

/// Convert an SSE `data:` line response into a chunk stream.
///
/// Understands the OpenAI-compatible `choices[0].delta.content` shape and the `[DONE]`
/// terminator; lines without content (role deltas, keep-alives) are skipped.  A transport
/// error mid-stream yields one `Err` item and ends the stream.
pub fn sse_content_stream(
    response: reqwest::Response,
    provider: String,
) -> MessageChunkStream {
    let body = response.bytes_stream();
    let stream = futures_util::stream::unfold(
        (Box::pin(body), String::new(), false),
        move |(mut body, mut buf, done)| {
            let provider = provider.clone();
            async move {
                if done {
                    return None;
                }
                loop {
                    // Drain complete lines from the buffer before reading more bytes.
                    if let Some(pos) = buf.find('\n') {
                        let line: String = buf.drain(..=pos).collect();
                        let line = line.trim();
                        if let Some(data) = line.strip_prefix("data: ") {
                            if data.trim() == "[DONE]" {
                                return None;
                            }
                            if let Ok(parsed) = serde_json::from_str::<Value>(data) {
                                let delta = parsed
                                    .get("choices")
                                    .and_then(|c| c.get(0))
                                    .and_then(|c| c.get("delta"));
                                let content = delta
                                    .and_then(|d| d.get("content"))
                                    .and_then(|c| c.as_str())
                                    .unwrap_or_default();
                                let finish_reason = parsed
                                    .get("choices")
                                    .and_then(|c| c.get(0))
                                    .and_then(|c| c.get("finish_reason"))
                                    .and_then(|f| f.as_str())
                                    .map(|s| s.to_string());
                                if !content.is_empty() || finish_reason.is_some() {
                                    let chunk = MessageChunk {
                                        content: content.to_string(),
                                        finish_reason,
                                    };
                                    return Some((Ok(chunk), (body, buf, false)));
                                }
                            }
                        }
                        continue;
                    }

                    match body.next().await {
                        Some(Ok(bytes)) => {
                            buf.push_str(&String::from_utf8_lossy(&bytes));
                        }
                        Some(Err(err)) => {
                            let e = ProviderError::Connection {
                                provider: provider.clone(),
                                message: err.to_string(),
                            };
                            return Some((Err(e), (body, buf, true)));
                        }
                        None => return None,
                    }
                }
            }
        },
    );
    Box::pin(stream)
}
