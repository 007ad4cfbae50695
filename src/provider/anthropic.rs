//! Anthropic Messages API (`POST {url}/v1/messages`).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{http, parse, prompt::Prompt, Provider};
use crate::config::ProviderConfig;
use crate::error::FailureReason;
use crate::models::{ContextBundle, Mode, RawGeneration};

const DEFAULT_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    name: String,
    model: String,
    url: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            name: config.name.clone(),
            model: config.model.clone().unwrap_or_default(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
            client: http::client(timeout)?,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        bundle: &ContextBundle,
        question: Option<&str>,
        mode: Mode,
    ) -> Result<RawGeneration, FailureReason> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            FailureReason::NotConfigured("anthropic requires api_key_env".to_string())
        })?;

        let prompt = Prompt::build(bundle, question, mode);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": prompt.system,
            "messages": [
                { "role": "user", "content": prompt.user },
            ],
        });

        let request = self
            .client
            .post(format!("{}/v1/messages", self.url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let json = http::send_json(request, self.timeout).await?;
        let text: String = json
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .ok_or_else(|| {
                FailureReason::MalformedResponse("missing content blocks".to_string())
            })?;

        parse::parse_completion(&text, mode)
    }
}
