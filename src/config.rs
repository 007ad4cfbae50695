use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Capability;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_context_chars")]
    pub max_chars: usize,
    #[serde(default = "default_min_confidence")]
    pub min_document_confidence: f64,
    #[serde(default = "default_true")]
    pub include_vitals: bool,
    #[serde(default = "default_max_vitals")]
    pub max_vitals: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: default_context_chars(),
            min_document_confidence: default_min_confidence(),
            include_vitals: true,
            max_vitals: default_max_vitals(),
        }
    }
}

fn default_context_chars() -> usize {
    6000
}
fn default_min_confidence() -> f64 {
    10.0
}
fn default_max_vitals() -> usize {
    3
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResponseConfig {
    #[serde(default = "default_answer_chars")]
    pub max_chars: usize,
    #[serde(default = "default_field_chars")]
    pub max_field_chars: usize,
    #[serde(default = "default_max_bullets")]
    pub max_bullets: usize,
    #[serde(default = "default_fallback_bullets")]
    pub fallback_bullets: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_chars: default_answer_chars(),
            max_field_chars: default_field_chars(),
            max_bullets: default_max_bullets(),
            fallback_bullets: default_fallback_bullets(),
        }
    }
}

fn default_answer_chars() -> usize {
    2000
}
fn default_field_chars() -> usize {
    300
}
fn default_max_bullets() -> usize {
    10
}
fn default_fallback_bullets() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry lifetime in seconds; `0` disables expiry.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}
fn default_max_entries() -> usize {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8002".to_string()
}

/// Backend family of a configured provider.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions (OpenAI, OpenRouter, ...).
    Openai,
    Anthropic,
    Cohere,
    Huggingface,
    Ollama,
    Extractive,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Cohere => "cohere",
            ProviderKind::Huggingface => "huggingface",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Extractive => "extractive",
        }
    }

    /// Whether the kind calls out over the network and needs a `model`.
    pub fn is_remote(&self) -> bool {
        !matches!(self, ProviderKind::Extractive)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_true")]
    pub qa: bool,
    #[serde(default = "default_true")]
    pub summarize: bool,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_priority() -> i64 {
    100
}
fn default_provider_timeout() -> u64 {
    20
}
fn default_max_tokens() -> u32 {
    300
}
fn default_temperature() -> f32 {
    0.2
}

/// Resolved, immutable identity of a provider in the chain.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: ProviderKind,
    pub priority: i64,
    pub timeout: Duration,
    pub capability: Capability,
}

impl ProviderConfig {
    /// The extractive kind never answers questions, whatever `qa` says.
    pub fn spec(&self) -> ProviderSpec {
        ProviderSpec {
            name: self.name.clone(),
            kind: self.kind,
            priority: self.priority,
            timeout: Duration::from_secs(self.timeout_secs),
            capability: Capability {
                qa: self.qa && self.kind != ProviderKind::Extractive,
                summarize: self.summarize,
            },
        }
    }
}

impl Config {
    /// Defaults everywhere, no providers; only the extractive fallback runs.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            context: ContextConfig::default(),
            response: ResponseConfig::default(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
            providers: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.context.max_chars == 0 {
            anyhow::bail!("context.max_chars must be > 0");
        }
        if self.context.min_document_confidence < 0.0 {
            anyhow::bail!("context.min_document_confidence must be >= 0");
        }

        if self.response.max_chars == 0 {
            anyhow::bail!("response.max_chars must be > 0");
        }
        if self.response.max_field_chars == 0 {
            anyhow::bail!("response.max_field_chars must be > 0");
        }
        if self.response.max_field_chars > self.response.max_chars {
            anyhow::bail!("response.max_field_chars must be <= response.max_chars");
        }
        if !(1..=10).contains(&self.response.max_bullets) {
            anyhow::bail!("response.max_bullets must be in [1, 10]");
        }

        let mut seen = HashSet::new();
        for p in &self.providers {
            if p.name.trim().is_empty() {
                anyhow::bail!("providers: name must not be empty");
            }
            if !seen.insert(p.name.as_str()) {
                anyhow::bail!("providers: duplicate provider name '{}'", p.name);
            }
            if p.timeout_secs == 0 {
                anyhow::bail!("providers.{}: timeout_secs must be > 0", p.name);
            }
            if p.kind.is_remote() && p.model.as_deref().map_or(true, |m| m.trim().is_empty()) {
                anyhow::bail!(
                    "providers.{}: model must be specified for kind '{}'",
                    p.name,
                    p.kind.as_str()
                );
            }
            if !(0.0..=2.0).contains(&p.temperature) {
                anyhow::bail!("providers.{}: temperature must be in [0.0, 2.0]", p.name);
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
