// src/lib.rs

// Import the top-level `ledgerllm` module.
pub mod ledgerllm;

// Re-export the submodules at the crate root so callers write `ledgerllm::provider::…`
// instead of navigating the whole hierarchy.
pub use ledgerllm::{
    auth, config, error, memory, orchestrator, provider, providers, registry, system_prompt,
    tools,
};

#[cfg(feature = "server")]
pub use ledgerllm::server;

// Re-exporting key items for easier external access.
pub use ledgerllm::auth::{Principal, TokenValidator};
pub use ledgerllm::orchestrator::Orchestrator;
pub use ledgerllm::provider::{Message, ProviderAdapter, Role};
pub use ledgerllm::registry::ModelRegistry;
