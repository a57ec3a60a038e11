//! Runtime configuration.
//!
//! Settings are read once from the environment at startup and passed around as an
//! explicit handle; nothing in the crate reads environment variables after construction.

use std::env;

/// Gateway settings sourced from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Active provider at startup (`LLM_PROVIDER`, default `openai`).
    pub llm_provider: String,
    /// Active friendly model name at startup (`LLM_MODEL`, default `gpt-4.1-nano`).
    pub llm_model: String,
    /// Whether responses stream by default when the request leaves `stream` unset.
    pub llm_streaming: bool,
    /// Use native vendor streaming when the model supports it.
    pub llm_enable_true_streaming: bool,
    /// Upper bound on tool-loop iterations per request.
    pub max_tool_iterations: usize,

    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub cohere_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub fireworks_api_key: Option<String>,

    /// Finance service base URL (`FINANCE_SERVICE_URL`).
    pub finance_service_url: String,
    /// User service base URL (`USER_SERVICE_URL`).
    pub user_service_url: String,
    /// Retrieval service base URL (`RAG_SERVICE_URL`).
    pub rag_service_url: String,
    /// Fallback truncation cap for retrieval context when the model has no override.
    pub rag_max_context_chars: usize,

    /// HS256 signing secret for bearer credentials (`JWT_SECRET`).
    pub jwt_secret: String,
    /// Expected `aud` claim; unset disables audience validation (`JWT_AUDIENCE`).
    pub jwt_audience: Option<String>,

    /// MongoDB connection string; unset selects the in-process memory store.
    pub mongo_uri: Option<String>,
    /// Inactivity window for active threads, in hours (`MEMORY_TTL_HOURS`, default 24).
    pub memory_ttl_hours: i64,

    /// Path to the model registry document (`MODEL_REGISTRY_PATH`).
    pub model_registry_path: String,
    /// Optional path to a system prompt file overriding the built-in one.
    pub system_prompt_path: Option<String>,

    /// Listen address for the HTTP surface (`BIND_ADDR`, default `0.0.0.0:8000`).
    pub bind_addr: String,
}

impl Settings {
    /// Read settings from the process environment, applying defaults.
    pub fn from_env() -> Settings {
        Settings {
            llm_provider: var_or("LLM_PROVIDER", "openai"),
            llm_model: var_or("LLM_MODEL", "gpt-4.1-nano"),
            llm_streaming: bool_var("LLM_STREAMING", false),
            llm_enable_true_streaming: bool_var("LLM_ENABLE_TRUE_STREAMING", true),
            max_tool_iterations: int_var("MAX_TOOL_ITERATIONS", 4),

            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            google_api_key: env::var("GOOGLE_API_KEY").ok(),
            cohere_api_key: env::var("COHERE_API_KEY").ok(),
            mistral_api_key: env::var("MISTRAL_API_KEY").ok(),
            fireworks_api_key: env::var("FIREWORKS_API_KEY").ok(),

            finance_service_url: var_or("FINANCE_SERVICE_URL", "http://finance-service:4002"),
            user_service_url: var_or("USER_SERVICE_URL", "http://user-service:8081"),
            rag_service_url: var_or("RAG_SERVICE_URL", "http://rag-service:8002"),
            rag_max_context_chars: int_var("RAG_MAX_CONTEXT_CHARS", 2000),

            jwt_secret: var_or("JWT_SECRET", "super-secret-not-safe"),
            jwt_audience: env::var("JWT_AUDIENCE").ok(),

            mongo_uri: env::var("MONGO_URI").ok(),
            memory_ttl_hours: int_var("MEMORY_TTL_HOURS", 24) as i64,

            model_registry_path: var_or("MODEL_REGISTRY_PATH", "config/model_registry.json"),
            system_prompt_path: env::var("SYSTEM_PROMPT_PATH").ok(),

            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8000"),
        }
    }

    /// Settings suitable for tests: localhost backends, fixed secret, no Mongo.
    pub fn for_tests() -> Settings {
        Settings {
            llm_provider: "openai".to_string(),
            llm_model: "gpt-4.1-nano".to_string(),
            llm_streaming: false,
            llm_enable_true_streaming: false,
            max_tool_iterations: 4,
            openai_api_key: Some("test-key".to_string()),
            anthropic_api_key: None,
            google_api_key: None,
            cohere_api_key: None,
            mistral_api_key: None,
            fireworks_api_key: None,
            finance_service_url: "http://127.0.0.1:4002".to_string(),
            user_service_url: "http://127.0.0.1:8081".to_string(),
            rag_service_url: "http://127.0.0.1:8002".to_string(),
            rag_max_context_chars: 2000,
            jwt_secret: "test-secret".to_string(),
            jwt_audience: None,
            mongo_uri: None,
            memory_ttl_hours: 24,
            model_registry_path: "config/model_registry.json".to_string(),
            system_prompt_path: None,
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn bool_var(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(
            v.split('#').next().unwrap_or("").trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn int_var(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.split('#').next().unwrap_or("").trim().parse().ok())
        .unwrap_or(default)
}
