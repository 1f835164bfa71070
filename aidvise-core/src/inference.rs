//! Chat-completion inference client
//!
//! Provides an `InferenceBackend` trait with an OpenAI-compatible
//! implementation. A single request per call: no retries, bounded by the
//! client timeout.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{InferenceConfig, Secret};

/// Fixed system instruction sent ahead of every symptom description.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful but cautious medical assistant. Always remind the user to consult a professional.";

/// Prefix of the user message.
pub const SYMPTOMS_PREFIX: &str = "Symptoms: ";

// ============================================================================
// InferenceBackend trait
// ============================================================================

/// Abstraction over chat-completion providers.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one completion. Returns `Ok(None)` when the provider answered
    /// successfully but the first choice carried no usable content.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, InferenceError>;

    /// Model identifier for logging.
    fn model(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference request timed out")]
    Timeout,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response payload: {0}")]
    InvalidPayload(String),

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// The two-message conversation for a symptom description.
pub fn symptom_messages(symptoms: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("{}{}", SYMPTOMS_PREFIX, symptoms)),
    ]
}

// ============================================================================
// OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiChatClient
// ============================================================================

/// Chat client settings, separated from `InferenceConfig` so tests can build
/// one without loading configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: Secret,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl From<&InferenceConfig> for ChatConfig {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

/// OpenAI chat client: calls `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    config: ChatConfig,
    base_url: String,
}

impl OpenAiChatClient {
    pub fn new(config: ChatConfig) -> Result<Self, InferenceError> {
        Self::with_base_url(config, "https://api.openai.com/v1".to_string())
    }

    /// Create a client against another OpenAI-compatible endpoint (tests, gateways).
    pub fn with_base_url(config: ChatConfig, base_url: String) -> Result<Self, InferenceError> {
        if config.api_key.is_empty() {
            return Err(InferenceError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        Self::with_base_url(ChatConfig::from(config), config.base_url.clone())
    }
}

#[async_trait]
impl InferenceBackend for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else {
                    InferenceError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(status = status.as_u16(), message = %message, "Inference API error");

            return Err(InferenceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout
            } else {
                InferenceError::Http(e)
            }
        })?;
        let completion: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| InferenceError::InvalidPayload(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty());

        Ok(content)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// TESTS
// ============================================================================
