//! ledgerllmd — the LLM gateway daemon.
//!
//! Wires the explicit handles together (settings, registry, catalog, validator,
//! adapters, executor, memory, orchestrator) and serves the axum router.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use ledgerllm::auth::{TokenValidator, ToolCatalog};
use ledgerllm::config::Settings;
use ledgerllm::memory::{EphemeralMemory, MemoryStore, MongoMemory};
use ledgerllm::orchestrator::Orchestrator;
use ledgerllm::providers::factory::AdapterFactory;
use ledgerllm::registry::{ActiveModel, ModelRegistry};
use ledgerllm::server::{router, AppState};
use ledgerllm::system_prompt;
use ledgerllm::tools::{BackendClients, ToolDispatch, ToolExecutor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let settings = Arc::new(Settings::from_env());

    let registry = Arc::new(ModelRegistry::load(&settings.model_registry_path)?);
    let resolved = registry
        .resolve(&settings.llm_provider, &settings.llm_model)
        .ok_or_else(|| {
            format!(
                "configured model {}/{} is not in the registry",
                settings.llm_provider, settings.llm_model
            )
        })?;
    let active = Arc::new(RwLock::new(ActiveModel {
        provider: settings.llm_provider.clone(),
        friendly: settings.llm_model.clone(),
        api_name: resolved.api_name.clone(),
    }));
    log::info!(
        "active model: {}/{} ({})",
        settings.llm_provider,
        settings.llm_model,
        resolved.api_name
    );

    let memory: Arc<dyn MemoryStore> = match &settings.mongo_uri {
        Some(uri) => {
            let store = MongoMemory::connect(uri, "ledgerllm", settings.memory_ttl_hours).await?;
            log::info!("memory store: mongodb");
            Arc::new(store)
        }
        None => {
            log::info!("memory store: in-process (MONGO_URI not set)");
            Arc::new(EphemeralMemory::new(settings.memory_ttl_hours))
        }
    };

    let catalog = Arc::new(ToolCatalog::banking());
    let validator = TokenValidator::new(
        &settings.jwt_secret,
        settings.jwt_audience.as_deref(),
        catalog.clone(),
    );

    let backends = BackendClients::new(
        &settings.finance_service_url,
        &settings.user_service_url,
        &settings.rag_service_url,
    );
    let executor: Arc<dyn ToolDispatch> = Arc::new(ToolExecutor::new(
        backends,
        registry.clone(),
        active.clone(),
        settings.rag_max_context_chars,
    ));

    let orchestrator = Orchestrator::new(
        memory.clone(),
        executor.clone(),
        registry.clone(),
        system_prompt::load(settings.system_prompt_path.as_deref()),
        settings.max_tool_iterations,
        settings.llm_enable_true_streaming,
    );

    let state = Arc::new(AppState {
        settings: settings.clone(),
        registry,
        catalog,
        validator,
        factory: AdapterFactory::new(settings.clone()),
        executor,
        memory,
        orchestrator,
        active,
        switch_lock: Mutex::new(()),
    });

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    log::info!("ledgerllmd listening on {}", settings.bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
