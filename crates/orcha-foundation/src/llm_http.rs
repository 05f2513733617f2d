//! OpenAI-compatible LLM client
//!
//! Thin `reqwest` implementation of [`LlmClient`] against a
//! `/chat/completions` endpoint. Works with OpenAI itself and with any
//! compatible server (vLLM, Ollama's OpenAI facade, gateways).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;

use orcha_kernel::error::{EngineError, EngineResult};
use orcha_kernel::llm::{ChatMessage, LlmClient, Usage};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model id.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout.
    pub timeout_secs: u64,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

impl OpenAiCompatConfig {
    /// Create a config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL`, and `ORCHA_MODEL` from the
    /// environment.
    pub fn from_env() -> EngineResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EngineError::Llm("OPENAI_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = normalize_base_url(&base_url);
        }
        if let Ok(model) = std::env::var("ORCHA_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(&url.into());
        self
    }

    /// Set the model id.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// OpenAI-compatible [`LlmClient`].
pub struct OpenAiCompatClient {
    config: OpenAiCompatConfig,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a client from a config.
    pub fn new(config: OpenAiCompatConfig) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| EngineError::Llm(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { config, http })
    }

    /// Create a client from the environment.
    pub fn from_env() -> EngineResult<Self> {
        Self::new(OpenAiCompatConfig::from_env()?)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> EngineResult<ChatMessage> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| EngineError::Llm(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Llm(format!(
                "chat completion returned {status}: {body}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| EngineError::Llm(format!("invalid completion payload: {err}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| EngineError::Llm("completion contained no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let config = OpenAiCompatConfig::new("key").with_base_url("http://localhost:11434/v1/");
        assert_eq!(config.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn response_payload_shape() {
        let raw = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "c1", "type": "function",
                     "function": {"name": "search", "arguments": "{\"query\":\"cheese\"}"}}
                ]}}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let message = &parsed.choices[0].message;
        assert!(message.has_tool_calls());
        assert_eq!(
            message.tool_calls.as_ref().unwrap()[0].function.name,
            "search"
        );
        assert_eq!(parsed.usage.unwrap().total_tokens, 15);
    }
}
