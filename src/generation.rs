//! Language-model providers for answer generation.
//!
//! | Config Value | Provider | Default model | Key variable |
//! |-------------|----------|---------------|--------------|
//! | `"openai"` | [`ChatCompletionsGenerator`] | `gpt-4-turbo` | `OPENAI_API_KEY` |
//! | `"mistral"` | [`ChatCompletionsGenerator`] | `mistral-small-latest` | `MISTRAL_API_KEY` |
//! | `"anthropic"` | [`AnthropicGenerator`] | `claude-3-5-haiku-latest` | `ANTHROPIC_API_KEY` |
//! | `"disabled"` | [`DisabledGenerator`] | | |
//!
//! Transient failures get at most one immediate retry (see [`crate::http`]).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::ServiceError;
use crate::http;

/// A fully assembled prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &Prompt) -> Result<String, ServiceError>;
}

struct Endpoint {
    url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
    timeout: Duration,
}

impl Endpoint {
    fn new(config: &GenerationConfig, default_base: &str, path: &str, default_key_env: &str) -> Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or(default_key_env);
        let api_key = match std::env::var(key_env) {
            Ok(key) => key,
            Err(_) => bail!("{} environment variable not set", key_env),
        };
        let base = config.url.as_deref().unwrap_or(default_base);
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            url: format!("{}{}", base.trim_end_matches('/'), path),
            api_key,
            client: http::build_client(timeout)?,
            max_retries: config.max_retries,
            timeout,
        })
    }
}

// ============ Chat Completions (OpenAI, Mistral) ============

pub struct ChatCompletionsGenerator {
    service: &'static str,
    model: String,
    temperature: f32,
    max_tokens: u32,
    endpoint: Endpoint,
}

impl ChatCompletionsGenerator {
    pub fn openai(config: &GenerationConfig) -> Result<Self> {
        Self::with_service(config, "openai", "gpt-4-turbo", "https://api.openai.com", "OPENAI_API_KEY")
    }

    pub fn mistral(config: &GenerationConfig) -> Result<Self> {
        Self::with_service(
            config,
            "mistral",
            "mistral-small-latest",
            "https://api.mistral.ai",
            "MISTRAL_API_KEY",
        )
    }

    fn with_service(
        config: &GenerationConfig,
        service: &'static str,
        default_model: &str,
        default_base: &str,
        default_key_env: &str,
    ) -> Result<Self> {
        Ok(Self {
            service,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            endpoint: Endpoint::new(config, default_base, "/v1/chat/completions", default_key_env)?,
        })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ServiceError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let ep = &self.endpoint;
        let json = http::send_json(
            self.service,
            || ep.client.post(&ep.url).bearer_auth(&ep.api_key).json(&body),
            ep.max_retries,
            ep.timeout,
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String, ServiceError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| ServiceError::InvalidResponse("missing choices[0].message.content".to_string()))
}

// ============ Anthropic Messages ============

pub struct AnthropicGenerator {
    model: String,
    temperature: f32,
    max_tokens: u32,
    endpoint: Endpoint,
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

impl AnthropicGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            endpoint: Endpoint::new(
                config,
                "https://api.anthropic.com",
                "/v1/messages",
                "ANTHROPIC_API_KEY",
            )?,
        })
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ServiceError> {
        let body = serde_json::json!({
            "model": self.model,
            "system": prompt.system,
            "messages": [{"role": "user", "content": prompt.user}],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let ep = &self.endpoint;
        let json = http::send_json(
            "anthropic",
            || {
                ep.client
                    .post(&ep.url)
                    .header("x-api-key", &ep.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            },
            ep.max_retries,
            ep.timeout,
        )
        .await?;
        parse_anthropic_response(&json)
    }
}

/// Concatenate the `text` blocks of a Messages API response.
fn parse_anthropic_response(json: &serde_json::Value) -> Result<String, ServiceError> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| ServiceError::InvalidResponse("missing content array".to_string()))?;
    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(ServiceError::InvalidResponse("no text content".to_string()));
    }
    Ok(text.trim().to_string())
}

// ============ Disabled ============

/// Used when `generation.provider = "disabled"`; retrieval still works.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable(
            "generation is disabled; set [generation].provider".to_string(),
        ))
    }
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(ChatCompletionsGenerator::openai(config)?)),
        "mistral" => Ok(Arc::new(ChatCompletionsGenerator::mistral(config)?)),
        "anthropic" => Ok(Arc::new(AnthropicGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  Paris.\n"}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Paris.");
        assert!(parse_chat_response(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn test_parse_anthropic_response_joins_text_blocks() {
        let json = serde_json::json!({
            "content": [
                {"type": "text", "text": "First. "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "Second."}
            ]
        });
        assert_eq!(parse_anthropic_response(&json).unwrap(), "First. Second.");
    }

    #[tokio::test]
    async fn test_disabled_generator_fails_without_retry() {
        let prompt = Prompt {
            system: "s".into(),
            user: "u".into(),
        };
        let err = DisabledGenerator.generate(&prompt).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
