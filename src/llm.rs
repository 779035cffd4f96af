//! Generation backend abstraction and implementations.
//!
//! Defines the [`GenerationBackend`] trait and two concrete providers:
//!
//! - **[`OpenAiBackend`]** — OpenAI-compatible chat completions endpoint
//!   with retry and exponential backoff.
//! - **[`OllamaBackend`]** — a local Ollama server (`/api/generate`).
//!
//! Use [`create_backend`] to instantiate the provider named in the
//! configuration. A `disabled` provider yields `None`; the pipeline and
//! classifier both treat an absent backend gracefully (content-based
//! classification is skipped, generation fails with a clear message).
//!
//! # Retry strategy (OpenAI)
//!
//! - HTTP 429 and 5xx → retry with backoff (1s, 2s, 4s, ... capped at 2^5)
//! - HTTP 401/403 → fail immediately as an auth error
//! - other 4xx → fail immediately
//! - network errors → retry

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::BackendError;

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    /// Overrides the configured temperature when set.
    pub temperature: Option<f32>,
}

/// A text-generation provider.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Provider name for logging (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Generate text for a prompt. Errors are tagged so the pipeline can
    /// map them to user-facing messages.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, BackendError>;
}

/// Instantiate the backend named in the config, or `None` when disabled.
pub fn create_backend(config: &LlmConfig) -> Result<Option<Arc<dyn GenerationBackend>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAiBackend::new(config)?))),
        "ollama" => Ok(Some(Arc::new(OllamaBackend::new(config)?))),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ OpenAI-compatible provider ============

/// Chat-completions provider for OpenAI and OpenAI-compatible gateways.
///
/// Reads the API key from the `OPENAI_API_KEY` environment variable.
/// `llm.base_url` overrides the endpoint for compatible services.
pub struct OpenAiBackend {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Ok(Self {
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, prompt: &str, options: &GenerateOptions) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &options.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.temperature),
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(prompt, options);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        let body_text = response.text().await.unwrap_or_default();
                        return Err(BackendError::Auth(body_text));
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(BackendError::Api {
                            status: status.as_u16(),
                            body: body_text,
                        });
                        continue;
                    }

                    // Other client error — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(BackendError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    last_err = Some(BackendError::Network(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| BackendError::Network("generation failed after retries".into())))
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, BackendError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            BackendError::InvalidResponse("missing choices[0].message.content".to_string())
        })
}

// ============ Ollama provider ============

/// Provider for a local Ollama server.
///
/// Uses the non-streaming `/api/generate` endpoint. No API key, no retry:
/// a local server either answers or it doesn't.
pub struct OllamaBackend {
    model: String,
    base_url: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": options.temperature.unwrap_or(self.temperature) },
        });
        if let Some(system) = &options.system_prompt {
            body["system"] = serde_json::Value::String(system.clone());
        }

        let response = client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| BackendError::InvalidResponse("missing response field".to_string()))
    }
}
