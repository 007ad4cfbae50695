//! Fallback orchestration over the provider chain.
//!
//! ```text
//! Trying(0) ──ok──▶ Done
//!    │fail/timeout/skip
//!    ▼
//! Trying(1) ──ok──▶ Done
//!    │ ...
//!    ▼
//! Fallback ─────────▶ Done   (extractive, always succeeds)
//! ```
//!
//! Providers are tried strictly in order, once each, each bounded by its
//! own timeout. A provider whose capability excludes the request mode is
//! skipped without being called. Worst-case latency is the sum of the
//! chain's timeouts plus the (local) fallback.
//!
//! The cache is consulted before the first attempt and written only after
//! `Done`, so an abandoned provider call can never touch it.

use std::sync::Arc;

use anyhow::Result;

use crate::cache::{CacheKey, ResultCache};
use crate::config::Config;
use crate::error::{Failure, FailureReason};
use crate::models::{ContextBundle, Generation, GenerationResult, Mode};
use crate::normalize::{Normalizer, ResponseLimits};
use crate::provider::extractive::{ExtractiveProvider, UNABLE_TO_ANSWER};
use crate::provider::{build_chain, Provider, ProviderSlot};
use crate::text;

const PLACEHOLDER_ONE_LINE: &str = "No summary available.";

/// Result of one orchestration, with the path that produced it.
#[derive(Debug, Clone)]
pub struct Orchestrated {
    pub generation: Generation,
    /// Served from the cache; no provider was called.
    pub cached: bool,
    /// Failed attempts, in chain order.
    pub failures: Vec<Failure>,
}

enum Step {
    Trying(usize),
    Fallback,
    Done(Generation),
}

pub struct Orchestrator {
    chain: Vec<ProviderSlot>,
    fallback: ExtractiveProvider,
    normalizer: Normalizer,
    cache: Arc<ResultCache>,
}

impl Orchestrator {
    pub fn new(
        chain: Vec<ProviderSlot>,
        fallback: ExtractiveProvider,
        normalizer: Normalizer,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            chain,
            fallback,
            normalizer,
            cache,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let chain = build_chain(&config.providers, &config.response)?;
        if chain.is_empty() {
            tracing::info!("no providers configured; extractive fallback only");
        }
        Ok(Self::new(
            chain,
            ExtractiveProvider::new(ExtractiveProvider::DEFAULT_NAME, &config.response),
            Normalizer::new(ResponseLimits::from(&config.response)),
            Arc::new(ResultCache::from_config(&config.cache)),
        ))
    }

    pub fn chain(&self) -> &[ProviderSlot] {
        &self.chain
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn limits(&self) -> &ResponseLimits {
        self.normalizer.limits()
    }

    /// Produce a contract-satisfying generation for a non-empty bundle.
    /// Never fails.
    pub async fn orchestrate(&self, bundle: &ContextBundle, question: Option<&str>) -> Orchestrated {
        let mode = Mode::for_question(question);
        let key = CacheKey::new(bundle.patient_id, bundle.fingerprint.clone(), mode);

        if let Some(generation) = self.cache.get(&key) {
            tracing::info!(
                patient_id = bundle.patient_id,
                mode = mode.as_str(),
                provider = %generation.provider,
                "cache hit"
            );
            return Orchestrated {
                generation,
                cached: true,
                failures: Vec::new(),
            };
        }

        let mut failures = Vec::new();
        let mut step = Step::Trying(0);
        let generation = loop {
            step = match step {
                Step::Trying(i) => match self.chain.get(i) {
                    None => Step::Fallback,
                    Some(slot) if !slot.spec.capability.supports(mode) => {
                        tracing::debug!(
                            provider = %slot.spec.name,
                            mode = mode.as_str(),
                            "provider does not support mode; skipping"
                        );
                        Step::Trying(i + 1)
                    }
                    Some(slot) => match self.attempt(slot, bundle, question, mode).await {
                        Ok(generation) => Step::Done(generation),
                        Err(failure) => {
                            tracing::warn!(
                                provider = %failure.provider,
                                reason = failure.reason.code(),
                                "provider attempt failed: {}",
                                failure.reason
                            );
                            failures.push(failure);
                            Step::Trying(i + 1)
                        }
                    },
                },
                Step::Fallback => Step::Done(self.run_fallback(bundle, mode)),
                Step::Done(generation) => break generation,
            };
        };

        tracing::info!(
            patient_id = bundle.patient_id,
            mode = mode.as_str(),
            provider = %generation.provider,
            failed_attempts = failures.len(),
            "generation complete"
        );

        self.cache.put(key, generation.clone());
        Orchestrated {
            generation,
            cached: false,
            failures,
        }
    }

    async fn attempt(
        &self,
        slot: &ProviderSlot,
        bundle: &ContextBundle,
        question: Option<&str>,
        mode: Mode,
    ) -> GenerationResult {
        let name = slot.spec.name.as_str();
        let call = slot.provider.generate(bundle, question, mode);
        match tokio::time::timeout(slot.spec.timeout, call).await {
            Err(_) => Err(Failure::new(name, FailureReason::Timeout(slot.spec.timeout))),
            Ok(Err(reason)) => Err(Failure::new(name, reason)),
            Ok(Ok(raw)) => self.normalizer.normalize(raw, bundle, mode, name),
        }
    }

    fn run_fallback(&self, bundle: &ContextBundle, mode: Mode) -> Generation {
        let raw = match mode {
            Mode::Summarize => self.fallback.summarize(bundle),
            Mode::Answer => self.fallback.answer(bundle),
        };
        match self
            .normalizer
            .normalize(raw, bundle, mode, self.fallback.name())
        {
            Ok(generation) => generation,
            Err(failure) => {
                tracing::error!("extractive fallback output rejected: {}", failure);
                placeholder(bundle, mode, self.fallback.name(), self.normalizer.limits())
            }
        }
    }
}

/// Constant result used only if the extractive output is ever rejected,
/// cut to the configured limits.
fn placeholder(
    bundle: &ContextBundle,
    mode: Mode,
    provider: &str,
    limits: &ResponseLimits,
) -> Generation {
    Generation {
        one_line: text::truncate_at_sentence(PLACEHOLDER_ONE_LINE, limits.max_field_chars),
        bullets: Vec::new(),
        answer: match mode {
            Mode::Answer => Some(text::truncate_at_sentence(
                UNABLE_TO_ANSWER,
                limits.max_answer_chars,
            )),
            Mode::Summarize => None,
        },
        sources: bundle.origins(),
        provider: provider.to_string(),
        confidence: 0.0,
    }
}
