//! Local Ollama daemon (`POST {url}/api/generate`, non-streaming).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{http, parse, prompt::Prompt, Provider};
use crate::config::ProviderConfig;
use crate::error::FailureReason;
use crate::models::{ContextBundle, Mode, RawGeneration};

const DEFAULT_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    name: String,
    model: String,
    url: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
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
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout,
            client: http::client(timeout)?,
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
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
            "system": prompt.system,
            "prompt": prompt.user,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });

        let request = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body);

        let json = http::send_json(request, self.timeout)
            .await
            .map_err(|reason| match reason {
                FailureReason::Transport(msg) => FailureReason::Transport(format!(
                    "{} (is Ollama running at {}?)",
                    msg, self.url
                )),
                other => other,
            })?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| FailureReason::MalformedResponse("missing response".to_string()))?;

        parse::parse_completion(text, mode)
    }
}
