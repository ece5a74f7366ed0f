use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::classify::{Classify, Disposition, StatusClassifier, error_type};
use super::policy::RetryPolicy;
use super::state::{FetchState, Step};
use crate::error::AppError;
use crate::llm::{Provider, ProviderError, ReportRequest, truncate};
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_RETRY_COUNT, GEN_AI_TOKEN_USAGE,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ReportResult {
    pub text: String,
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub attempts: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Success(ReportResult),
    TransientFailure(ProviderError),
    FatalFailure(ProviderError),
}

impl AttemptOutcome {
    fn step(&self) -> Step {
        match self {
            AttemptOutcome::Success(_) => Step::Succeeded,
            AttemptOutcome::TransientFailure(_) => Step::FailedTransient,
            AttemptOutcome::FatalFailure(_) => Step::FailedFatal,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider rejected the request on attempt {attempt}: {reason}")]
    Fatal { attempt: u32, reason: ProviderError },

    #[error("gave up after {attempts} attempts, last error: {last_reason}")]
    ExhaustedRetries {
        attempts: u32,
        last_reason: ProviderError,
    },

    #[error("fetch cancelled after {attempts} attempt(s)")]
    Cancelled {
        attempts: u32,
        last_reason: Option<ProviderError>,
    },
}

impl FetchError {
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Fatal { attempt, .. } => *attempt,
            FetchError::ExhaustedRetries { attempts, .. }
            | FetchError::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Turns one `ReportRequest` into one `ReportResult`, retrying transient
/// provider failures with exponential backoff.
///
/// The provider handle is only borrowed for the duration of a fetch; the
/// attempt counter and delay live on the stack of [`fetch_with_cancel`].
///
/// [`fetch_with_cancel`]: ResilientReportFetcher::fetch_with_cancel
pub struct ResilientReportFetcher {
    provider: Arc<dyn Provider>,
    policy: RetryPolicy,
    classifier: Box<dyn Classify>,
}

impl ResilientReportFetcher {
    /// Fails with [`AppError::Validation`] when `policy` does not validate.
    pub fn new(provider: Arc<dyn Provider>, policy: RetryPolicy) -> Result<Self, AppError> {
        policy.validate()?;
        Ok(Self {
            provider,
            policy,
            classifier: Box::new(StatusClassifier),
        })
    }

    pub fn with_classifier(mut self, classifier: impl Classify + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn fetch(&self, request: &ReportRequest) -> Result<ReportResult, FetchError> {
        self.fetch_with_cancel(request, &CancellationToken::new())
            .await
    }

    #[tracing::instrument(
        name = "report.fetch",
        skip_all,
        fields(
            gen_ai.provider.name = %self.provider.name(),
            gen_ai.request.model = %request.model_id(),
            fetch.max_attempts = self.policy.max_attempts,
            fetch.attempts,
            fetch.final_state,
            otel.status_code,
        )
    )]
    pub async fn fetch_with_cancel(
        &self,
        request: &ReportRequest,
        cancel: &CancellationToken,
    ) -> Result<ReportResult, FetchError> {
        let span = tracing::Span::current();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = FetchState::Idle.begin();
        let mut attempt = 0;
        let mut last_reason: Option<ProviderError> = None;
        let mut last_delay = Duration::ZERO;

        let result = loop {
            attempt += 1;

            if cancel.is_cancelled() {
                state = state.advance(Step::Cancelled, max_attempts);
                break Err(FetchError::Cancelled {
                    attempts: attempt - 1,
                    last_reason: last_reason.take(),
                });
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    state = state.advance(Step::Cancelled, max_attempts);
                    break Err(FetchError::Cancelled {
                        attempts: attempt,
                        last_reason: last_reason.take(),
                    });
                }
                outcome = self.attempt(request, attempt) => outcome,
            };

            state = state.advance(outcome.step(), max_attempts);

            match outcome {
                AttemptOutcome::Success(result) => {
                    tracing::info!(
                        attempts = attempt,
                        model = %result.model,
                        "Report fetched"
                    );
                    break Ok(result);
                }
                AttemptOutcome::FatalFailure(reason) => {
                    tracing::error!(
                        attempt,
                        error = %reason,
                        "LLM call failed with a non-retryable error"
                    );
                    break Err(FetchError::Fatal { attempt, reason });
                }
                AttemptOutcome::TransientFailure(reason) => {
                    if state == FetchState::ExhaustedRetries {
                        tracing::error!(
                            attempts = attempt,
                            error = %reason,
                            "LLM call failed, retries exhausted"
                        );
                        break Err(FetchError::ExhaustedRetries {
                            attempts: attempt,
                            last_reason: reason,
                        });
                    }

                    let delay = self.policy.delay_for(attempt).max(last_delay);
                    last_delay = delay;
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "LLM call failed, retrying"
                    );
                    GEN_AI_RETRY_COUNT.add(
                        1,
                        &[
                            KeyValue::new("gen_ai.provider.name", self.provider.name().to_string()),
                            KeyValue::new("gen_ai.request.model", request.model_id().to_string()),
                        ],
                    );

                    last_reason = Some(reason);

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            state = state.advance(Step::Cancelled, max_attempts);
                            break Err(FetchError::Cancelled {
                                attempts: attempt,
                                last_reason: last_reason.take(),
                            });
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        span.record(
            "fetch.attempts",
            match &result {
                Ok(report) => report.attempts,
                Err(err) => err.attempts(),
            },
        );
        span.record("fetch.final_state", state.to_string().as_str());
        if result.is_err() {
            span.record("otel.status_code", "ERROR");
        }

        result
    }

    async fn attempt(&self, request: &ReportRequest, attempt: u32) -> AttemptOutcome {
        let provider_name = self.provider.name();
        let span_display_name = format!("gen_ai.chat {}", request.model_id());
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %request.model_id(),
            gen_ai.attempt = attempt,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        span.add_event(
            "gen_ai.user.message",
            vec![KeyValue::new(
                "gen_ai.prompt",
                truncate(request.prompt(), 1000),
            )],
        );

        let result = self.provider.send(request).instrument(span.clone()).await;

        let duration = start.elapsed().as_secs_f64();
        let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
        let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name.to_string());
        let model_kv = KeyValue::new("gen_ai.request.model", request.model_id().to_string());

        GEN_AI_OPERATION_DURATION.record(
            duration,
            &[op_kv.clone(), provider_kv.clone(), model_kv.clone()],
        );

        match result {
            Ok(resp) => {
                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", i64::from(resp.input_tokens));
                span.record("gen_ai.usage.output_tokens", i64::from(resp.output_tokens));
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv,
                        provider_kv,
                        model_kv,
                    ],
                );

                AttemptOutcome::Success(ReportResult {
                    text: resp.content,
                    generated_at: Utc::now(),
                    model: resp.model,
                    provider: provider_name.to_string(),
                    attempts: attempt,
                    input_tokens: resp.input_tokens,
                    output_tokens: resp.output_tokens,
                })
            }
            Err(err) => {
                let kind = error_type(&err);
                span.record("otel.status_code", "ERROR");
                span.record("error.type", kind);

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        provider_kv,
                        model_kv,
                        KeyValue::new("error.type", kind),
                    ],
                );

                match self.classifier.classify(&err) {
                    Disposition::Transient => AttemptOutcome::TransientFailure(err),
                    Disposition::Fatal => AttemptOutcome::FatalFailure(err),
                }
            }
        }
    }
}
