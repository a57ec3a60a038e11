//! Adapter construction and caching.
//!
//! Adapters are stateless apart from the shared pooled HTTP client, so one instance per
//! `(provider, model)` is built on first use and shared between concurrent requests.  A
//! model switch clears the cache so the next request picks up fresh construction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::ledgerllm::config::Settings;
use crate::ledgerllm::provider::{ProviderAdapter, ProviderError};
use crate::ledgerllm::providers::anthropic::AnthropicAdapter;
use crate::ledgerllm::providers::cohere::CohereAdapter;
use crate::ledgerllm::providers::fireworks::FireworksAdapter;
use crate::ledgerllm::providers::google::GoogleAdapter;
use crate::ledgerllm::providers::mistral::MistralAdapter;
use crate::ledgerllm::providers::openai::OpenAiAdapter;

/// Builds and caches vendor adapters keyed by `(provider, model)`.
pub struct AdapterFactory {
    settings: Arc<Settings>,
    cache: RwLock<HashMap<(String, String), Arc<dyn ProviderAdapter>>>,
}

impl AdapterFactory {
    pub fn new(settings: Arc<Settings>) -> Self {
        AdapterFactory {
            settings,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached adapter for `(provider, api_model)`, constructing it on first use.
    ///
    /// An unknown provider maps to `ModelNotFound`; a provider without a configured API
    /// key maps to `Auth` so the HTTP surface reports it as a provider credential issue.
    pub fn adapter(
        &self,
        provider: &str,
        api_model: &str,
    ) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        let key = (provider.to_string(), api_model.to_string());
        if let Some(adapter) = self.cache.read().expect("adapter cache poisoned").get(&key) {
            return Ok(adapter.clone());
        }

        let adapter = self.build(provider, api_model)?;
        self.cache
            .write()
            .expect("adapter cache poisoned")
            .insert(key, adapter.clone());
        log::info!("provider adapter created: {}/{}", provider, api_model);
        Ok(adapter)
    }

    /// Drop every cached adapter (used after a model switch).
    pub fn clear(&self) {
        let mut cache = self.cache.write().expect("adapter cache poisoned");
        let previous = cache.len();
        cache.clear();
        log::info!("adapter cache cleared ({} entries)", previous);
    }

    fn build(
        &self,
        provider: &str,
        api_model: &str,
    ) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        let key = |slot: &Option<String>| -> Result<String, ProviderError> {
            slot.clone().ok_or_else(|| ProviderError::Auth {
                provider: provider.to_string(),
                message: "API key not configured".to_string(),
            })
        };

        let adapter: Arc<dyn ProviderAdapter> = match provider {
            "openai" => Arc::new(OpenAiAdapter::new(
                &key(&self.settings.openai_api_key)?,
                api_model,
            )),
            "anthropic" => Arc::new(AnthropicAdapter::new(
                &key(&self.settings.anthropic_api_key)?,
                api_model,
            )),
            "google" => Arc::new(GoogleAdapter::new(
                &key(&self.settings.google_api_key)?,
                api_model,
            )),
            "cohere" => Arc::new(CohereAdapter::new(
                &key(&self.settings.cohere_api_key)?,
                api_model,
            )),
            "mistral" => Arc::new(MistralAdapter::new(
                &key(&self.settings.mistral_api_key)?,
                api_model,
            )),
            "fireworks" => Arc::new(FireworksAdapter::new(
                &key(&self.settings.fireworks_api_key)?,
                api_model,
            )),
            other => {
                return Err(ProviderError::ModelNotFound {
                    provider: other.to_string(),
                    model: api_model.to_string(),
                    message: "unknown provider".to_string(),
                })
            }
        };
        Ok(adapter)
    }
}
