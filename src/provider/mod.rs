//! Language-model provider abstraction and implementations.
//!
//! Defines the [`Provider`] trait and concrete backends:
//! - **[`OpenAiProvider`](openai::OpenAiProvider)**: OpenAI-compatible chat completions (OpenAI, OpenRouter).
//! - **[`AnthropicProvider`](anthropic::AnthropicProvider)**: Anthropic Messages API.
//! - **[`CohereProvider`](cohere::CohereProvider)**: Cohere Chat API.
//! - **[`HuggingFaceProvider`](huggingface::HuggingFaceProvider)**: Hugging Face Inference API.
//! - **[`OllamaProvider`](ollama::OllamaProvider)**: local Ollama daemon.
//! - **[`ExtractiveProvider`](extractive::ExtractiveProvider)**: deterministic, in-process.
//!
//! # Chain construction
//!
//! [`build_chain`] turns the `[[providers]]` config tables into an ordered
//! list of [`ProviderSlot`]s: stable-sorted by `priority` (lower first,
//! ties keep declaration order). API keys are read from the environment
//! variable named by `api_key_env` once, here; a provider whose variable is
//! unset is left out of the chain with a warning.
//!
//! # Failure classification
//!
//! Each call is made exactly once. Outcomes map onto
//! [`FailureReason`]:
//! - HTTP 401/403 → `Auth`
//! - HTTP 429 → `RateLimited`
//! - other non-2xx, connection errors → `Transport`
//! - client-side timeout → `Timeout`
//! - unparsable body or completion → `MalformedResponse`

pub mod anthropic;
pub mod cohere;
pub mod extractive;
mod http;
pub mod huggingface;
pub mod ollama;
pub mod openai;
pub mod parse;
pub mod prompt;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{ProviderConfig, ProviderKind, ProviderSpec, ResponseConfig};
use crate::error::FailureReason;
use crate::models::{ContextBundle, Mode, RawGeneration};

/// A language-model backend.
///
/// Implementations classify every failure into a [`FailureReason`] and
/// never panic. Size limits are applied later by the normalizer.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured name, used in results and logs.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        bundle: &ContextBundle,
        question: Option<&str>,
        mode: Mode,
    ) -> Result<RawGeneration, FailureReason>;
}

/// One entry of the fallback chain.
#[derive(Clone)]
pub struct ProviderSlot {
    pub spec: ProviderSpec,
    pub provider: Arc<dyn Provider>,
}

impl ProviderSlot {
    pub fn new(spec: ProviderSpec, provider: Arc<dyn Provider>) -> Self {
        Self { spec, provider }
    }
}

/// Outcome of resolving `api_key_env`.
pub(crate) enum ApiKey {
    NotRequested,
    Present(String),
    Missing(String),
}

pub(crate) fn resolve_api_key(config: &ProviderConfig) -> ApiKey {
    match &config.api_key_env {
        None => ApiKey::NotRequested,
        Some(var) => match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => ApiKey::Present(v.trim().to_string()),
            _ => ApiKey::Missing(var.clone()),
        },
    }
}

/// Instantiate the backend for one provider table.
pub fn create_provider(
    config: &ProviderConfig,
    api_key: Option<String>,
    response: &ResponseConfig,
) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config.kind {
        ProviderKind::Openai => Arc::new(openai::OpenAiProvider::new(config, api_key)?),
        ProviderKind::Anthropic => Arc::new(anthropic::AnthropicProvider::new(config, api_key)?),
        ProviderKind::Cohere => Arc::new(cohere::CohereProvider::new(config, api_key)?),
        ProviderKind::Huggingface => {
            Arc::new(huggingface::HuggingFaceProvider::new(config, api_key)?)
        }
        ProviderKind::Ollama => Arc::new(ollama::OllamaProvider::new(config)?),
        ProviderKind::Extractive => Arc::new(extractive::ExtractiveProvider::new(
            config.name.clone(),
            response,
        )),
    };
    Ok(provider)
}

/// Build the ordered provider chain from configuration.
pub fn build_chain(
    configs: &[ProviderConfig],
    response: &ResponseConfig,
) -> Result<Vec<ProviderSlot>> {
    let mut chain = Vec::with_capacity(configs.len());
    for config in configs {
        let api_key = match resolve_api_key(config) {
            ApiKey::NotRequested => None,
            ApiKey::Present(key) => Some(key),
            ApiKey::Missing(var) => {
                tracing::warn!(
                    provider = %config.name,
                    env = %var,
                    "API key variable not set; provider disabled"
                );
                continue;
            }
        };
        let provider = create_provider(config, api_key, response)?;
        chain.push(ProviderSlot::new(config.spec(), provider));
    }
    // Stable: equal priorities keep declaration order.
    chain.sort_by_key(|slot| slot.spec.priority);
    Ok(chain)
}
