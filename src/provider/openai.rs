//! OpenAI-compatible chat completions (`POST {url}/chat/completions`).
//!
//! Works against OpenAI, OpenRouter and any server speaking the same
//! protocol. OpenRouter attribution headers go in `extra_headers`.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{http, parse, prompt::Prompt, Provider};
use crate::config::ProviderConfig;
use crate::error::FailureReason;
use crate::models::{ContextBundle, Mode, RawGeneration};

const DEFAULT_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    name: String,
    model: String,
    url: String,
    api_key: Option<String>,
    extra_headers: HashMap<String, String>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiProvider {
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
            extra_headers: config.extra_headers.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
            client: http::client(timeout)?,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        bundle: &ContextBundle,
        question: Option<&str>,
        mode: Mode,
    ) -> Result<RawGeneration, FailureReason> {
        let prompt = Prompt::build(bundle, question, mode);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        for (name, value) in &self.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let json = http::send_json(request, self.timeout).await?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                FailureReason::MalformedResponse(
                    "missing choices[0].message.content".to_string(),
                )
            })?;

        parse::parse_completion(content, mode)
    }
}
