pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{Config, ProviderKind};

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;

/// Provider credential. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// One logical report request. Fields are private so a request cannot be
/// altered between retry attempts.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    prompt: String,
    model_id: String,
    api_key: ApiKey,
}

impl ReportRequest {
    pub fn new(prompt: impl Into<String>, model_id: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            prompt: prompt.into(),
            model_id: model_id.into(),
            api_key,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
}

/// Raw failure of a single provider call, before retry classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("content blocked by provider: {0}")]
    Blocked(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else if err.is_builder() {
            ProviderError::InvalidRequest(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ProviderError::Connect(err.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn send(&self, req: &ReportRequest) -> Result<ProviderResponse, ProviderError>;
    fn name(&self) -> &str;
}

pub fn build_provider(config: &Config) -> Result<Arc<dyn Provider>, reqwest::Error> {
    let base = config.llm_base_url.as_str();
    let timeout = config.request_timeout;

    let provider: Arc<dyn Provider> = match config.llm_provider {
        ProviderKind::Google => Arc::new(GeminiProvider::new(base, timeout)?),
        ProviderKind::OpenAi => Arc::new(OpenAiCompatibleProvider::new(base, timeout)?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(base, timeout)?),
        ProviderKind::Ollama => Arc::new(OpenAiCompatibleProvider::new_ollama(base, timeout)?),
    };

    Ok(provider)
}

/// Shared by the providers: turns a non-success body into a `Status` error,
/// preferring the `error.message` field most vendors return.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    #[derive(serde::Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }

    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
        Err(_) => truncate(body, 500),
    };

    ProviderError::Status {
        status: status.as_u16(),
        message,
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}
