use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;

use super::prompt;
use super::sink::{Delivery, ReportSink};
use crate::error::AppResult;
use crate::fetch::{ApiKey, ReportRequest, ReportResult, ResilientReportFetcher};
use crate::telemetry::metrics::{REPORT_GENERATION_DURATION, REPORT_RUNS};

#[derive(Debug)]
pub struct JobOutcome {
    pub report_date: NaiveDate,
    pub report: ReportResult,
    pub deliveries: Vec<Delivery>,
}

/// Fetch-and-save flow: render the prompt for a date, fetch, hand the result
/// to each sink in order.
pub struct ReportJob {
    fetcher: ResilientReportFetcher,
    sinks: Vec<Arc<dyn ReportSink>>,
    prompt_template: String,
    model_id: String,
    api_key: ApiKey,
}

impl ReportJob {
    pub fn new(
        fetcher: ResilientReportFetcher,
        prompt_template: impl Into<String>,
        model_id: impl Into<String>,
        api_key: ApiKey,
    ) -> Self {
        Self {
            fetcher,
            sinks: Vec::new(),
            prompt_template: prompt_template.into(),
            model_id: model_id.into(),
            api_key,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn request_for(&self, report_date: NaiveDate) -> ReportRequest {
        ReportRequest::new(
            prompt::render(&self.prompt_template, report_date),
            self.model_id.clone(),
            self.api_key.clone(),
        )
    }

    /// Runs for today's local calendar date.
    pub async fn run(&self, cancel: &CancellationToken) -> AppResult<JobOutcome> {
        self.run_for(Local::now().date_naive(), cancel).await
    }

    #[tracing::instrument(
        name = "report.job",
        skip(self, cancel),
        fields(
            report.model = %self.model_id,
            report.duration_ms,
            report.outcome,
        )
    )]
    pub async fn run_for(
        &self,
        report_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> AppResult<JobOutcome> {
        let start = Instant::now();
        let span = tracing::Span::current();

        tracing::info!(
            %report_date,
            model = %self.model_id,
            provider = %self.fetcher.provider_name(),
            "Generating meme stock report"
        );

        let result = self.fetch_and_deliver(report_date, cancel).await;

        let duration = start.elapsed();
        let outcome = if result.is_ok() { "success" } else { "failure" };
        REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[]);
        REPORT_RUNS.add(1, &[KeyValue::new("report.outcome", outcome)]);
        span.record("report.duration_ms", duration.as_millis() as u64);
        span.record("report.outcome", outcome);

        result
    }

    async fn fetch_and_deliver(
        &self,
        report_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> AppResult<JobOutcome> {
        let request = self.request_for(report_date);
        let report = self.fetcher.fetch_with_cancel(&request, cancel).await?;

        let mut deliveries = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let delivery = sink.deliver(&report, report_date).await.inspect_err(|e| {
                tracing::error!(sink = sink.name(), error = %e, "Report sink failed");
            })?;
            deliveries.push(delivery);
        }

        Ok(JobOutcome {
            report_date,
            report,
            deliveries,
        })
    }
}
