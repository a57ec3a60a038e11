//! Model registry: friendly-name ↔ API-name mapping, capabilities, and defaults.
//!
//! The registry is loaded from a JSON document at startup and swapped atomically on
//! [`ModelRegistry::reload`]; readers clone an `Arc` snapshot and never observe a partial
//! view.  A friendly name is reasoning-class iff it appears under the provider's
//! `reasoning` category.
//!
//! Document shape:
//!
//! ```json
//! {
//!   "model_registry": {
//!     "openai": {
//!       "reasoning": { "o4-mini": "o4-mini-2025-04-16" },
//!       "one_shot":  { "gpt-4o": "gpt-4o" }
//!     }
//!   },
//!   "model_parameters": {
//!     "openai": { "gpt-4o": { "max_tokens": 1024, "rag_k": 4,
//!                              "rag_max_context_chars": 2000 } }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use thiserror::Error;

use crate::ledgerllm::provider::{Capabilities, ConnectionTest};

/// Errors surfaced while loading or reloading the registry document.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model registry file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid model registry document: {0}")]
    Invalid(String),
}

/// Optional per-(provider, friendly) parameter overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDefaults {
    pub max_tokens: Option<u32>,
    pub rag_k: Option<u32>,
    pub rag_max_context_chars: Option<usize>,
}

/// Model category within a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Reasoning,
    OneShot,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Reasoning => "reasoning",
            ModelType::OneShot => "one_shot",
        }
    }
}

/// Everything the gateway needs to know about one registered model.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub api_name: String,
    pub model_type: ModelType,
    pub capabilities: Capabilities,
    pub defaults: ModelDefaults,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    model_registry: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
    #[serde(default)]
    model_parameters: BTreeMap<String, BTreeMap<String, ModelDefaults>>,
}

struct RegistryView {
    file: RegistryFile,
}

/// Shared registry handle; cheap to clone behind an `Arc`.
pub struct ModelRegistry {
    path: Option<PathBuf>,
    view: RwLock<Arc<RegistryView>>,
}

impl ModelRegistry {
    /// Load the registry from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<ModelRegistry, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let view = Self::read_file(&path)?;
        Ok(ModelRegistry {
            path: Some(path),
            view: RwLock::new(Arc::new(view)),
        })
    }

    /// Build a registry from an in-memory JSON value (tests, embedded defaults).
    pub fn from_value(value: serde_json::Value) -> Result<ModelRegistry, RegistryError> {
        let file: RegistryFile =
            serde_json::from_value(value).map_err(|e| RegistryError::Invalid(e.to_string()))?;
        Ok(ModelRegistry {
            path: None,
            view: RwLock::new(Arc::new(RegistryView { file })),
        })
    }

    /// An empty registry; every lookup misses.
    pub fn empty() -> ModelRegistry {
        ModelRegistry {
            path: None,
            view: RwLock::new(Arc::new(RegistryView {
                file: RegistryFile::default(),
            })),
        }
    }

    fn read_file(path: &Path) -> Result<RegistryView, RegistryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| RegistryError::NotFound(path.to_path_buf()))?;
        let file: RegistryFile =
            serde_json::from_str(&raw).map_err(|e| RegistryError::Invalid(e.to_string()))?;
        Ok(RegistryView { file })
    }

    /// Re-read the backing file and swap the in-memory view atomically.
    ///
    /// Registries built from a value keep their current view.
    pub fn reload(&self) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let fresh = Self::read_file(path)?;
        *self.view.write().expect("registry view poisoned") = Arc::new(fresh);
        log::info!("model registry reloaded from {}", path.display());
        Ok(())
    }

    fn snapshot(&self) -> Arc<RegistryView> {
        self.view.read().expect("registry view poisoned").clone()
    }

    /// All providers present in the registry.
    pub fn providers(&self) -> Vec<String> {
        self.snapshot().file.model_registry.keys().cloned().collect()
    }

    /// Category → friendly → api mapping for one provider.
    pub fn models_of(&self, provider: &str) -> BTreeMap<String, BTreeMap<String, String>> {
        self.snapshot()
            .file
            .model_registry
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    /// True iff `friendly` is listed under the provider's reasoning category.
    pub fn is_reasoning(&self, provider: &str, friendly: &str) -> bool {
        self.snapshot()
            .file
            .model_registry
            .get(provider)
            .and_then(|categories| categories.get("reasoning"))
            .map(|models| models.contains_key(friendly))
            .unwrap_or(false)
    }

    /// Resolve a friendly name to its API name, type, capabilities, and defaults.
    pub fn resolve(&self, provider: &str, friendly: &str) -> Option<ResolvedModel> {
        let snapshot = self.snapshot();
        let categories = snapshot.file.model_registry.get(provider)?;

        let (model_type, api_name) = if let Some(api) =
            categories.get("reasoning").and_then(|m| m.get(friendly))
        {
            (ModelType::Reasoning, api.clone())
        } else if let Some(api) = categories.get("one_shot").and_then(|m| m.get(friendly)) {
            (ModelType::OneShot, api.clone())
        } else {
            return None;
        };

        let capabilities = Capabilities::for_model(
            provider,
            &api_name,
            model_type == ModelType::Reasoning,
        );
        let defaults = self.default_params(provider, friendly);
        Some(ResolvedModel {
            api_name,
            model_type,
            capabilities,
            defaults,
        })
    }

    /// Map an API model name back to its friendly name.
    pub fn friendly_of(&self, provider: &str, api_name: &str) -> Option<String> {
        let snapshot = self.snapshot();
        let categories = snapshot.file.model_registry.get(provider)?;
        for category in ["reasoning", "one_shot"] {
            if let Some(models) = categories.get(category) {
                for (friendly, api) in models {
                    if api == api_name {
                        return Some(friendly.clone());
                    }
                }
            }
        }
        None
    }

    /// Optional per-(provider, friendly) defaults; empty when absent.
    pub fn default_params(&self, provider: &str, friendly: &str) -> ModelDefaults {
        self.snapshot()
            .file
            .model_parameters
            .get(provider)
            .and_then(|models| models.get(friendly))
            .cloned()
            .unwrap_or_default()
    }

    /// True when the provider/friendly combination exists.
    pub fn validate_combo(&self, provider: &str, friendly: &str) -> bool {
        self.resolve(provider, friendly).is_some()
    }
}

/// The gateway's active provider/model selection.
#[derive(Debug, Clone)]
pub struct ActiveModel {
    pub provider: String,
    pub friendly: String,
    pub api_name: String,
}

/// Outcome of a model switch, reported to the caller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SwitchReport {
    pub success: bool,
    pub provider: String,
    pub friendly_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_test: Option<ConnectionTest>,
}
