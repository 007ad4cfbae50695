//! Hugging Face Inference API text generation
//! (`POST {url}/models/{model}`).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{http, parse, prompt::Prompt, Provider};
use crate::config::ProviderConfig;
use crate::error::FailureReason;
use crate::models::{ContextBundle, Mode, RawGeneration};

const DEFAULT_URL: &str = "https://api-inference.huggingface.co";

pub struct HuggingFaceProvider {
    name: String,
    model: String,
    url: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl HuggingFaceProvider {
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

/// The API answers `[{"generated_text": ...}]` or `{"generated_text": ...}`.
fn generated_text(json: &Value) -> Option<&str> {
    match json {
        Value::Array(items) => items.first()?.get("generated_text")?.as_str(),
        Value::Object(_) => json.get("generated_text")?.as_str(),
        _ => None,
    }
}

#[async_trait]
impl Provider for HuggingFaceProvider {
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
            FailureReason::NotConfigured("huggingface requires api_key_env".to_string())
        })?;

        let prompt = Prompt::build(bundle, question, mode);
        let body = serde_json::json!({
            "inputs": prompt.combined(),
            "parameters": {
                "max_new_tokens": self.max_tokens,
                "temperature": self.temperature,
                "return_full_text": false,
            },
        });

        let request = self
            .client
            .post(format!("{}/models/{}", self.url, self.model))
            .bearer_auth(api_key)
            .json(&body);

        let json = http::send_json(request, self.timeout).await?;
        if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
            return Err(FailureReason::Transport(format!("inference error: {}", err)));
        }
        let text = generated_text(&json).ok_or_else(|| {
            FailureReason::MalformedResponse("missing generated_text".to_string())
        })?;

        parse::parse_completion(text, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_text_shapes() {
        let list = serde_json::json!([{ "generated_text": "a" }]);
        let obj = serde_json::json!({ "generated_text": "b" });
        assert_eq!(generated_text(&list), Some("a"));
        assert_eq!(generated_text(&obj), Some("b"));
        assert_eq!(generated_text(&serde_json::json!([])), None);
        assert_eq!(generated_text(&serde_json::json!("x")), None);
    }
}
