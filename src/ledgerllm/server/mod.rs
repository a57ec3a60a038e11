//! HTTP gateway surface.
//!
//! Routes:
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | POST | `/chat` | optional |
//! | POST | `/auth/chat` | required |
//! | GET | `/permissions`, `/auth/permissions` | required |
//! | GET | `/models` | none |
//! | POST | `/switch-model` | none |
//! | POST | `/threads/{id}/close` | none |
//! | GET | `/health`, `/healthz` | none |
//!
//! Streaming responses use `data: <json>\n\n` frames terminated by a `done` (or terminal
//! `error`) frame.  Every error body is `{error, error_type, provider?, model?,
//! request_id?}` with the status mapping from
//! [`GatewayError`](crate::ledgerllm::error::GatewayError).

pub mod routes;

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use axum::routing::{get, post};
use axum::Router;

use crate::ledgerllm::auth::{ToolCatalog, TokenValidator};
use crate::ledgerllm::config::Settings;
use crate::ledgerllm::memory::MemoryStore;
use crate::ledgerllm::orchestrator::Orchestrator;
use crate::ledgerllm::providers::factory::AdapterFactory;
use crate::ledgerllm::registry::{ActiveModel, ModelRegistry};
use crate::ledgerllm::tools::ToolDispatch;

/// Explicit handles shared by every request handler.
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ModelRegistry>,
    pub catalog: Arc<ToolCatalog>,
    pub validator: TokenValidator,
    pub factory: AdapterFactory,
    pub executor: Arc<dyn ToolDispatch>,
    pub memory: Arc<dyn MemoryStore>,
    pub orchestrator: Orchestrator,
    pub active: Arc<RwLock<ActiveModel>>,
    /// Guards switch-model so concurrent switches cannot interleave their rollbacks.
    pub switch_lock: Mutex<()>,
}

/// Build the gateway router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(routes::chat))
        .route("/auth/chat", post(routes::auth_chat))
        .route("/permissions", get(routes::permissions))
        .route("/auth/permissions", get(routes::permissions))
        .route("/models", get(routes::models))
        .route("/switch-model", post(routes::switch_model))
        .route("/threads/{id}/close", post(routes::close_thread))
        .route("/health", get(routes::health))
        .route("/healthz", get(routes::health))
        .with_state(state)
}
