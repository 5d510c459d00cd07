//! Hosted language model client.
//!
//! Speaks the OpenAI-compatible `/v1/chat/completions` protocol, so OpenAI and
//! Groq are both reachable by changing `base_url`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AssistantError, GenerationFailureKind, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// One bounded completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// The hosted text-completion capability the pipeline depends on.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    fn name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

pub struct ChatCompletionsClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AssistantError::Configuration(
                "language model API key is not set (OPENAI_API_KEY or LLM_API_KEY)".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!("Language model client initialized with backend: {}", base_url);

        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
            http_client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn classify_status(status: StatusCode) -> GenerationFailureKind {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationFailureKind::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => GenerationFailureKind::RateLimited,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GenerationFailureKind::Timeout,
            _ => GenerationFailureKind::Backend,
        }
    }

    fn classify_transport(err: &reqwest::Error) -> GenerationFailureKind {
        if err.is_timeout() {
            GenerationFailureKind::Timeout
        } else if err.is_decode() {
            GenerationFailureKind::MalformedResponse
        } else {
            GenerationFailureKind::Transport
        }
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        debug!(
            "Requesting completion from {} ({} messages, max_tokens {}, temperature {})",
            request.model,
            request.messages.len(),
            request.max_tokens,
            request.temperature
        );

        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AssistantError::generation(
                    Self::classify_transport(&e),
                    format!("language model request failed: {}", e),
                )
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::generation(
                Self::classify_status(status),
                format!("language model returned {}: {}", status, body),
            ));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            AssistantError::generation(
                Self::classify_transport(&e),
                format!("failed to parse language model response: {}", e),
            )
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .ok_or_else(|| {
                AssistantError::generation(
                    GenerationFailureKind::MalformedResponse,
                    "language model returned no choices",
                )
            })
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}
