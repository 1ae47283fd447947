//! Language model completion clients
//!
//! Provides a unified interface over chat-completion providers:
//! - OpenAI-compatible chat completions (gpt-*)
//! - Anthropic messages (claude-*)
//!
//! Completion calls are never retried here; a failure is returned to the
//! caller, which decides whether the surrounding operation fails.

use crate::config::{AppConfig, LlmProvider};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Chat message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Trait for text generation
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete a single prompt
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(&[ChatMessage::user(prompt)]).await
    }

    /// Answer a chat transcript
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

async fn read_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AppError::Completion {
        message: format!("API error {}: {}", status, body),
    }
}

/// OpenAI-compatible chat completion client
pub struct OpenAiCompleter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

impl OpenAiCompleter {
    /// Create a new OpenAI completer
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            model,
            max_tokens,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = OpenAiRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
        };

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Completion {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let result: OpenAiResponse = response.json().await.map_err(|e| AppError::Completion {
            message: format!("Failed to parse response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Completion {
                message: "Empty response".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Anthropic messages API client
pub struct AnthropicCompleter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<&'a ChatMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

impl AnthropicCompleter {
    /// Create a new Anthropic completer
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            model,
            max_tokens,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        })
    }
}

#[async_trait]
impl Completer for AnthropicCompleter {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        // The messages API takes the system prompt out of band
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: messages.iter().filter(|m| m.role != Role::System).collect(),
        };

        let url = format!("{}/v1/messages", self.base_url);
        let response = self.client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Completion {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let result: AnthropicResponse = response.json().await.map_err(|e| AppError::Completion {
            message: format!("Failed to parse response: {}", e),
        })?;

        let text: String = result
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect();

        if text.is_empty() {
            return Err(AppError::Completion {
                message: "Empty response".to_string(),
            });
        }
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Create a completer based on configuration
pub fn create_completer(config: &AppConfig) -> Result<Arc<dyn Completer>> {
    let llm = &config.llm;
    let api_key = llm.api_key.clone().ok_or_else(|| AppError::Configuration {
        message: format!("No API key configured for model '{}'", llm.model),
    })?;

    let completer: Arc<dyn Completer> = match config.llm_provider() {
        LlmProvider::OpenAi => Arc::new(OpenAiCompleter::new(
            api_key,
            llm.model.clone(),
            llm.api_base.clone(),
            llm.max_tokens,
            llm.timeout_secs,
        )?),
        LlmProvider::Anthropic => Arc::new(AnthropicCompleter::new(
            api_key,
            llm.model.clone(),
            llm.api_base.clone(),
            llm.max_tokens,
            llm.timeout_secs,
        )?),
    };

    tracing::info!(model = completer.model_name(), "Completion client ready");
    Ok(completer)
}
