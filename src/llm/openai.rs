use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{Provider, ProviderError, ProviderResponse, ReportRequest, status_error};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and servers speaking the same API
/// (Ollama exposes it under `/v1`).
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    provider_name: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::named("openai", base_url, timeout)
    }

    /// Accepts the server root or its `/v1` path.
    pub fn new_ollama(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let root = base_url.trim_end_matches('/');
        let base_url = if root.ends_with("/v1") {
            root.to_string()
        } else {
            format!("{root}/v1")
        };
        Self::named("ollama", &base_url, timeout)
    }

    fn named(name: &str, base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider_name: name.to_string(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn send(&self, req: &ReportRequest) -> Result<ProviderResponse, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", req.api_key().expose()))
                .map_err(|e| ProviderError::InvalidRequest(format!("invalid API key header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = ChatRequest {
            model: req.model_id(),
            messages: vec![ChatMessage {
                role: "user",
                content: req.prompt(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_body));
        }

        let resp: ChatResponse = response.json().await?;
        parse_response(resp)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}

fn parse_response(resp: ChatResponse) -> Result<ProviderResponse, ProviderError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode("response contained no choices".to_string()))?;

    let finish_reason = choice.finish_reason.unwrap_or_default();
    if finish_reason == "content_filter" {
        return Err(ProviderError::Blocked("completion filtered".to_string()));
    }

    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(ProviderError::Decode("completion had no text".to_string()));
    }

    let (input_tokens, output_tokens) = match resp.usage {
        Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
        None => (0, 0),
    };

    Ok(ProviderResponse {
        content,
        model: resp.model,
        input_tokens,
        output_tokens,
        finish_reason,
    })
}
