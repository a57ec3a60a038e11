//! Request handlers and error rendering for the gateway surface.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ledgerllm::auth::Principal;
use crate::ledgerllm::error::GatewayError;
use crate::ledgerllm::orchestrator::{encode_frame, ChatRequest, RAG_TOOL};
use crate::ledgerllm::provider::ProviderAdapter;
use crate::ledgerllm::registry::{ActiveModel, SwitchReport};
use crate::ledgerllm::server::AppState;

/// A [`GatewayError`] paired with request context for the JSON error body.
pub struct ApiError {
    error: GatewayError,
    provider: Option<String>,
    model: Option<String>,
    request_id: Option<String>,
}

impl ApiError {
    fn new(error: GatewayError) -> ApiError {
        ApiError {
            error,
            provider: None,
            model: None,
            request_id: None,
        }
    }

    fn with_context(mut self, active: &ActiveModel, request_id: &str) -> ApiError {
        self.provider = Some(active.provider.clone());
        self.model = Some(active.api_name.clone());
        self.request_id = Some(request_id.to_string());
        self
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> ApiError {
        ApiError::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "error": self.error.to_string(),
            "error_type": self.error.error_type(),
        });
        if let Some(provider) = self.error.provider().map(str::to_string).or(self.provider) {
            body["provider"] = json!(provider);
        }
        if let Some(model) = self.model {
            body["model"] = json!(model);
        }
        if let Some(request_id) = self.request_id {
            body["request_id"] = json!(request_id);
        }
        log::error!("request failed ({}): {}", status, self.error);
        (status, Json(body)).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Required authentication: a missing or invalid credential fails the request.
fn require_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, GatewayError> {
    let token = bearer_token(headers)
        .ok_or_else(|| GatewayError::AuthInvalid("missing bearer credential".to_string()))?;
    Ok(state.validator.validate(token)?)
}

/// Optional authentication: an invalid credential is logged and ignored.
fn optional_principal(state: &AppState, headers: &HeaderMap) -> Option<Principal> {
    let token = bearer_token(headers)?;
    match state.validator.validate(token) {
        Ok(principal) => Some(principal),
        Err(err) => {
            log::warn!("optional auth failed: {}", err);
            None
        }
    }
}

async fn resolve_adapter(
    state: &AppState,
) -> Result<(Arc<dyn ProviderAdapter>, ActiveModel), GatewayError> {
    let active = state.active.read().await.clone();
    let adapter = state.factory.adapter(&active.provider, &active.api_name)?;
    Ok((adapter, active))
}

fn new_request_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

fn stream_response(frames: crate::ledgerllm::orchestrator::FrameStream) -> Response {
    let body = Body::from_stream(
        frames.map(|frame| Ok::<String, Infallible>(encode_frame(&frame))),
    );
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}

/// `POST /chat` — chat with optional authentication.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let request_id = new_request_id("chat");
    let principal = optional_principal(&state, &headers);
    let (adapter, active) = resolve_adapter(&state)
        .await
        .map_err(ApiError::from)?;

    request.validate().map_err(ApiError::from)?;
    if request.session_id.is_none() {
        request.session_id = Some(uuid::Uuid::new_v4().to_string());
    }

    log::info!(
        "{}: chat request (provider={}, model={}, rag={}, functions={})",
        request_id,
        active.provider,
        active.api_name,
        request.use_rag,
        request.use_functions
    );

    let streaming = request.stream.unwrap_or(state.settings.llm_streaming);
    if streaming {
        let frames = state
            .orchestrator
            .chat_stream(adapter, &active, principal.as_ref(), &request, &request_id)
            .await
            .map_err(|e| ApiError::from(e).with_context(&active, &request_id))?;
        return Ok(stream_response(frames));
    }

    let outcome = state
        .orchestrator
        .chat(adapter, &active, principal.as_ref(), &request, &request_id)
        .await
        .map_err(|e| ApiError::from(e).with_context(&active, &request_id))?;

    Ok(Json(json!({
        "response": outcome.answer,
        "provider": active.provider,
        "model": active.api_name,
        "function_calls": outcome.executed_calls,
        "request_id": request_id,
        "total_time": started.elapsed().as_secs_f64(),
    }))
    .into_response())
}

/// Body of `POST /auth/chat`.
#[derive(Debug, Deserialize)]
pub struct AuthenticatedChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_true")]
    pub use_rag: bool,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// `POST /auth/chat` — chat with required authentication; the principal's permitted
/// tools become the effective tool set.
pub async fn auth_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AuthenticatedChatRequest>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let request_id = new_request_id("auth_chat");
    let principal = require_principal(&state, &headers).map_err(ApiError::from)?;
    let (adapter, active) = resolve_adapter(&state).await.map_err(ApiError::from)?;

    if request.prompt.trim().is_empty() {
        return Err(ApiError::from(GatewayError::InvalidInput(
            "prompt is required".to_string(),
        )));
    }

    let chat_request = ChatRequest {
        prompt: Some(request.prompt.clone()),
        use_rag: request.use_rag,
        use_functions: !principal.permitted_tools.is_empty(),
        stream: Some(request.stream),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        session_id: Some(
            request
                .session_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        ),
        ..ChatRequest::default()
    };

    log::info!(
        "{}: authenticated chat (user={}, permitted_tools={})",
        request_id,
        principal.user_id,
        principal.permitted_tools.len()
    );

    if request.stream {
        let frames = state
            .orchestrator
            .chat_stream(adapter, &active, Some(&principal), &chat_request, &request_id)
            .await
            .map_err(|e| ApiError::from(e).with_context(&active, &request_id))?;
        return Ok(stream_response(frames));
    }

    let outcome = state
        .orchestrator
        .chat(adapter, &active, Some(&principal), &chat_request, &request_id)
        .await
        .map_err(|e| ApiError::from(e).with_context(&active, &request_id))?;

    // Re-validate returned calls against the permitted set before they leave the
    // gateway; the retrieval tool is whitelisted.
    let validated: Vec<_> = outcome
        .executed_calls
        .into_iter()
        .filter(|call| call.name == RAG_TOOL || principal.may_call(&call.name))
        .collect();

    Ok(Json(json!({
        "response": outcome.answer,
        "provider": active.provider,
        "model": active.api_name,
        "function_calls": validated,
        "request_id": request_id,
        "total_time": started.elapsed().as_secs_f64(),
    }))
    .into_response())
}

/// `GET /permissions` — the principal's resolved tool list with catalog detail.
pub async fn permissions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let principal = require_principal(&state, &headers).map_err(ApiError::from)?;

    let available: Vec<Value> = principal
        .permitted_tools
        .iter()
        .filter_map(|name| state.catalog.get(name))
        .map(|entry| {
            json!({
                "name": entry.name,
                "description": entry.description,
                "required_scopes": entry.required_scopes,
                "conditions": entry.conditions,
            })
        })
        .collect();

    Ok(Json(json!({
        "user_id": principal.user_id,
        "scopes": principal.scopes,
        "permitted_functions": principal.permitted_tools,
        "available_functions": available,
        "user_attributes": principal.attributes,
        "expires_at": principal.expires_at.to_rfc3339(),
    })))
}

/// `GET /models` — registry snapshot plus the active selection.
pub async fn models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let active = state.active.read().await.clone();
    let mut providers = serde_json::Map::new();

    for provider in state.registry.providers() {
        let mut models = serde_json::Map::new();
        for (category, entries) in state.registry.models_of(&provider) {
            for (friendly, api_name) in entries {
                let capabilities = state
                    .registry
                    .resolve(&provider, &friendly)
                    .map(|r| serde_json::to_value(&r.capabilities).unwrap_or(Value::Null))
                    .unwrap_or(Value::Null);
                models.insert(
                    friendly,
                    json!({
                        "api_name": api_name,
                        "category": category,
                        "capabilities": capabilities,
                    }),
                );
            }
        }
        providers.insert(provider, Value::Object(models));
    }

    Json(json!({
        "current_provider": active.provider,
        "current_model": active.api_name,
        "available_models": providers,
    }))
}

/// Body of `POST /switch-model`.
#[derive(Debug, Deserialize)]
pub struct ModelSwitchRequest {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_true")]
    pub should_validate: bool,
}

/// `POST /switch-model` — swap the active provider/model with validation and rollback.
pub async fn switch_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModelSwitchRequest>,
) -> Result<Json<SwitchReport>, ApiError> {
    let _guard = state.switch_lock.lock().await;
    let previous = state.active.read().await.clone();

    let resolved = state
        .registry
        .resolve(&request.provider, &request.model)
        .ok_or_else(|| {
            ApiError::from(GatewayError::InvalidInput(format!(
                "invalid provider/model combination: {}/{}",
                request.provider, request.model
            )))
        })?;

    let candidate = ActiveModel {
        provider: request.provider.clone(),
        friendly: request.model.clone(),
        api_name: resolved.api_name.clone(),
    };
    *state.active.write().await = candidate.clone();
    state.factory.clear();

    let mut connection_test = None;
    if request.should_validate {
        let probe = state
            .factory
            .adapter(&candidate.provider, &candidate.api_name)
            .map(|adapter| async move { adapter.test_connection().await });
        let test = match probe {
            Ok(future) => future.await,
            Err(err) => {
                // Roll back before reporting.
                *state.active.write().await = previous.clone();
                state.factory.clear();
                return Ok(Json(SwitchReport {
                    success: false,
                    provider: request.provider,
                    friendly_name: request.model,
                    api_name: Some(resolved.api_name),
                    previous_provider: Some(previous.provider),
                    previous_model: Some(previous.api_name),
                    error: Some(err.to_string()),
                    connection_test: None,
                }));
            }
        };
        if !test.success {
            *state.active.write().await = previous.clone();
            state.factory.clear();
            log::warn!(
                "model switch to {}/{} failed validation, rolled back",
                request.provider,
                request.model
            );
            return Ok(Json(SwitchReport {
                success: false,
                provider: request.provider,
                friendly_name: request.model,
                api_name: Some(resolved.api_name),
                previous_provider: Some(previous.provider),
                previous_model: Some(previous.api_name),
                error: test.error.clone(),
                connection_test: Some(test),
            }));
        }
        connection_test = Some(test);
    }

    log::info!(
        "switched model to {}/{} ({})",
        request.provider,
        request.model,
        resolved.api_name
    );
    Ok(Json(SwitchReport {
        success: true,
        provider: request.provider,
        friendly_name: request.model,
        api_name: Some(resolved.api_name),
        previous_provider: Some(previous.provider),
        previous_model: Some(previous.api_name),
        error: None,
        connection_test,
    }))
}

/// `POST /threads/{id}/close` — close the active thread and stamp its audit trail.
pub async fn close_thread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .memory
        .close(&id)
        .await
        .map_err(|e| ApiError::from(GatewayError::from(e)))?;
    Ok(Json(json!({"closed": id})))
}

/// `GET /health` and `GET /healthz`.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let active = state.active.read().await.clone();
    Json(json!({
        "status": "ok",
        "provider": active.provider,
        "model": active.api_name,
    }))
}
