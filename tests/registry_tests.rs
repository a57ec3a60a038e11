use std::io::Write;

use serde_json::json;

use ledgerllm::provider::ToolSchema;
use ledgerllm::registry::{ModelRegistry, ModelType};

fn sample_document() -> serde_json::Value {
    json!({
        "model_registry": {
            "openai": {
                "reasoning": {"o4-mini": "o4-mini-2025-04-16"},
                "one_shot": {"gpt-4o": "gpt-4o", "gpt-4.1-nano": "gpt-4.1-nano-2025-04-14"}
            },
            "anthropic": {
                "one_shot": {"claude-haiku": "claude-3-5-haiku-latest"}
            },
            "cohere": {
                "one_shot": {"command-light": "command-light", "command-r": "command-r-08-2024"}
            }
        },
        "model_parameters": {
            "openai": {
                "gpt-4.1-nano": {"max_tokens": 1024, "rag_k": 4, "rag_max_context_chars": 2000}
            }
        }
    })
}

#[test]
fn resolve_maps_friendly_to_api_name() {
    let registry = ModelRegistry::from_value(sample_document()).unwrap();

    let resolved = registry.resolve("openai", "gpt-4.1-nano").unwrap();
    assert_eq!(resolved.api_name, "gpt-4.1-nano-2025-04-14");
    assert_eq!(resolved.model_type, ModelType::OneShot);

    let reasoning = registry.resolve("openai", "o4-mini").unwrap();
    assert_eq!(reasoning.model_type, ModelType::Reasoning);
    assert!(reasoning.capabilities.supports_reasoning);

    assert!(registry.resolve("openai", "not-a-model").is_none());
    assert!(registry.resolve("nobody", "gpt-4o").is_none());
}

#[test]
fn friendly_of_inverts_resolve() {
    let registry = ModelRegistry::from_value(sample_document()).unwrap();
    assert_eq!(
        registry.friendly_of("openai", "gpt-4.1-nano-2025-04-14"),
        Some("gpt-4.1-nano".to_string())
    );
    assert_eq!(
        registry.friendly_of("openai", "o4-mini-2025-04-16"),
        Some("o4-mini".to_string())
    );
    assert_eq!(registry.friendly_of("openai", "unknown"), None);
}

#[test]
fn reasoning_classification_follows_the_category() {
    let registry = ModelRegistry::from_value(sample_document()).unwrap();
    assert!(registry.is_reasoning("openai", "o4-mini"));
    assert!(!registry.is_reasoning("openai", "gpt-4o"));
    assert!(!registry.is_reasoning("anthropic", "claude-haiku"));
}

#[test]
fn capability_table_varies_by_provider_and_family() {
    let registry = ModelRegistry::from_value(sample_document()).unwrap();

    let anthropic = registry.resolve("anthropic", "claude-haiku").unwrap();
    assert_eq!(anthropic.capabilities.tool_schema, ToolSchema::Anthropic);
    assert_eq!(anthropic.capabilities.max_context_length, 200_000);

    let light = registry.resolve("cohere", "command-light").unwrap();
    assert!(!light.capabilities.supports_tool_calls);
    assert_eq!(light.capabilities.max_context_length, 4_096);

    let full = registry.resolve("cohere", "command-r").unwrap();
    assert!(full.capabilities.supports_tool_calls);
}

#[test]
fn defaults_are_per_provider_and_friendly_name() {
    let registry = ModelRegistry::from_value(sample_document()).unwrap();

    let defaults = registry.default_params("openai", "gpt-4.1-nano");
    assert_eq!(defaults.max_tokens, Some(1024));
    assert_eq!(defaults.rag_k, Some(4));
    assert_eq!(defaults.rag_max_context_chars, Some(2000));

    let none = registry.default_params("openai", "gpt-4o");
    assert!(none.max_tokens.is_none());
    assert!(none.rag_k.is_none());
}

#[test]
fn listing_groups_models_by_category() {
    let registry = ModelRegistry::from_value(sample_document()).unwrap();
    assert_eq!(registry.providers().len(), 3);

    let openai = registry.models_of("openai");
    assert!(openai.contains_key("reasoning"));
    assert_eq!(openai["one_shot"].len(), 2);

    assert!(registry.models_of("nobody").is_empty());
}

#[test]
fn reload_swaps_the_view_atomically() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", sample_document()).unwrap();
    file.flush().unwrap();

    let registry = ModelRegistry::load(file.path()).unwrap();
    assert!(registry.resolve("openai", "gpt-4o").is_some());
    assert!(registry.resolve("mistral", "mistral-small").is_none());

    let updated = json!({
        "model_registry": {
            "mistral": {"one_shot": {"mistral-small": "mistral-small-latest"}}
        }
    });
    std::fs::write(file.path(), updated.to_string()).unwrap();
    registry.reload().unwrap();

    assert!(registry.resolve("openai", "gpt-4o").is_none());
    let resolved = registry.resolve("mistral", "mistral-small").unwrap();
    assert_eq!(resolved.api_name, "mistral-small-latest");
}

#[test]
fn missing_file_is_an_error() {
    assert!(ModelRegistry::load("/nonexistent/registry.json").is_err());
}

#[test]
fn shipped_registry_document_is_valid() {
    let registry = ModelRegistry::load("config/model_registry.json").unwrap();
    for provider in ["openai", "anthropic", "google", "cohere", "mistral", "fireworks"] {
        assert!(
            !registry.models_of(provider).is_empty(),
            "provider {} missing from shipped registry",
            provider
        );
    }
    // The default active model must resolve.
    assert!(registry.resolve("openai", "gpt-4.1-nano").is_some());
}
