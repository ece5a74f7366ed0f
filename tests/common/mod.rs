#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use meme_stock_reporter::fetch::{ApiKey, ReportRequest, RetryPolicy};
use meme_stock_reporter::llm::{Provider, ProviderError, ProviderResponse};

pub type Step = Result<ProviderResponse, ProviderError>;

/// Provider that replays a fixed script and records every call.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    then: Step,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>, then: Step) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            then,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new(Vec::new(), step)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    /// Waits between consecutive calls, i.e. the backoff sleeps taken.
    pub fn gaps(&self) -> Vec<Duration> {
        self.call_times()
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    async fn send(&self, req: &ReportRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), req.prompt().to_string()));
        let next = self.steps.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.then.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn ok(text: &str) -> Step {
    Ok(ProviderResponse {
        content: text.to_string(),
        model: "gemini-2.5-pro".to_string(),
        input_tokens: 12,
        output_tokens: 34,
        finish_reason: "STOP".to_string(),
    })
}

pub fn unavailable() -> Step {
    Err(ProviderError::Status {
        status: 503,
        message: "The model is overloaded".to_string(),
    })
}

pub fn unauthorized() -> Step {
    Err(ProviderError::Status {
        status: 401,
        message: "API key not valid".to_string(),
    })
}

pub fn request() -> ReportRequest {
    ReportRequest::new(
        "Pre-open 2026-10-16, list 10 likely meme stocks today.",
        "gemini-2.5-pro",
        ApiKey::new("test-key"),
    )
}

pub fn policy(max_attempts: u32, initial: Duration, multiplier: f64, max: Duration) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: initial,
        backoff_multiplier: multiplier,
        max_delay: max,
        jitter: 0.0,
    }
}

/// The paused clock advances in whole milliseconds.
pub fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(1),
        "expected {expected:?}, got {actual:?}"
    );
}
