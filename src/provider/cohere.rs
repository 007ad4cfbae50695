//! Cohere Chat API v2 (`POST {url}/v2/chat`).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{http, parse, prompt::Prompt, Provider};
use crate::config::ProviderConfig;
use crate::error::FailureReason;
use crate::models::{ContextBundle, Mode, RawGeneration};

const DEFAULT_URL: &str = "https://api.cohere.com";

pub struct CohereProvider {
    name: String,
    model: String,
    url: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl CohereProvider {
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

/// Concatenated `text` items of `message.content`.
fn message_text(json: &Value) -> Option<String> {
    let items = json.pointer("/message/content")?.as_array()?;
    let parts: Vec<&str> = items
        .iter()
        .filter(|c| c.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}

#[async_trait]
impl Provider for CohereProvider {
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
            FailureReason::NotConfigured("cohere requires api_key_env".to_string())
        })?;

        let prompt = Prompt::build(bundle, question, mode);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        });

        let request = self
            .client
            .post(format!("{}/v2/chat", self.url))
            .bearer_auth(api_key)
            .json(&body);

        let json = http::send_json(request, self.timeout).await?;
        let text = message_text(&json).ok_or_else(|| {
            FailureReason::MalformedResponse("missing message.content text".to_string())
        })?;

        parse::parse_completion(&text, mode)
    }
}
