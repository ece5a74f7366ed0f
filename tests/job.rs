mod common;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use common::{ScriptedProvider, assert_close, ok, policy, unauthorized, unavailable};
use meme_stock_reporter::error::{AppError, AppResult};
use meme_stock_reporter::fetch::{ApiKey, FetchError, ReportResult, ResilientReportFetcher};
use meme_stock_reporter::report::{Delivery, FileSink, ReportJob, ReportSink};
use meme_stock_reporter::scheduler;

const TEMPLATE: &str = "Today is {today_date}. List the meme stocks to watch.";

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn job(provider: &Arc<ScriptedProvider>) -> ReportJob {
    let fetcher = ResilientReportFetcher::new(
        provider.clone(),
        policy(3, Duration::from_secs(1), 2.0, Duration::from_secs(10)),
    )
    .unwrap();
    ReportJob::new(fetcher, TEMPLATE, "gemini-2.5-pro", ApiKey::new("test-key"))
}

/// Counts deliveries so ordering and short-circuiting can be observed.
#[derive(Default)]
struct CountingSink {
    delivered: AtomicUsize,
}

#[async_trait::async_trait]
impl ReportSink for CountingSink {
    async fn deliver(&self, _report: &ReportResult, _report_date: NaiveDate) -> AppResult<Delivery> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(Delivery::Displayed)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[tokio::test(start_paused = true)]
async fn run_for_renders_prompt_and_saves_dated_file() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![unavailable()], ok("| GME | AMC |")));
    let job = job(&provider).with_sink(Arc::new(FileSink::new(dir.path())));

    let outcome = assert_ok!(job.run_for(date(), &CancellationToken::new()).await);

    assert_eq!(outcome.report_date, date());
    assert_eq!(outcome.report.attempts, 2);

    let expected = dir.path().join("2026-10-16_MemeStock.txt");
    assert_eq!(outcome.deliveries, vec![Delivery::Saved(expected.clone())]);
    assert_eq!(std::fs::read_to_string(expected).unwrap(), "| GME | AMC |");

    assert_eq!(
        provider.prompts(),
        vec!["Today is 2026-10-16. List the meme stocks to watch.".to_string(); 2]
    );
}

#[tokio::test(start_paused = true)]
async fn rerun_on_same_date_overwrites_file() {
    let dir = tempfile::tempdir().unwrap();
    let first = Arc::new(ScriptedProvider::always(ok("first")));
    let second = Arc::new(ScriptedProvider::always(ok("second")));
    let cancel = CancellationToken::new();

    assert_ok!(job(&first).with_sink(Arc::new(FileSink::new(dir.path()))).run_for(date(), &cancel).await);
    assert_ok!(job(&second).with_sink(Arc::new(FileSink::new(dir.path()))).run_for(date(), &cancel).await);

    let saved = std::fs::read_to_string(dir.path().join("2026-10-16_MemeStock.txt")).unwrap();
    assert_eq!(saved, "second");
}

#[tokio::test(start_paused = true)]
async fn fatal_fetch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::always(unauthorized()));
    let counting = Arc::new(CountingSink::default());
    let job = job(&provider)
        .with_sink(Arc::new(FileSink::new(dir.path())))
        .with_sink(counting.clone());

    let err = assert_err!(job.run_for(date(), &CancellationToken::new()).await);

    assert!(matches!(err, AppError::Fetch(FetchError::Fatal { attempt: 1, .. })));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(counting.delivered.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn failing_sink_stops_later_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "occupied").unwrap();

    let provider = Arc::new(ScriptedProvider::always(ok("report")));
    let counting = Arc::new(CountingSink::default());
    let job = job(&provider)
        .with_sink(Arc::new(FileSink::new(&blocker)))
        .with_sink(counting.clone());

    let err = assert_err!(job.run_for(date(), &CancellationToken::new()).await);

    assert!(matches!(err, AppError::Sink(_)));
    assert_eq!(err.exit_code(), 74);
    assert_eq!(counting.delivered.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn sinks_run_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::always(ok("report")));
    let counting = Arc::new(CountingSink::default());
    let job = job(&provider)
        .with_sink(Arc::new(FileSink::new(dir.path())))
        .with_sink(counting.clone());

    let outcome = assert_ok!(job.run_for(date(), &CancellationToken::new()).await);

    assert!(matches!(outcome.deliveries[0], Delivery::Saved(_)));
    assert_eq!(outcome.deliveries[1], Delivery::Displayed);
    assert_eq!(counting.delivered.load(Ordering::SeqCst), 1);
}

/// Wall clock starting at `start` that follows tokio's (paused) clock.
fn clock_from(start: DateTime<Utc>) -> impl Fn() -> DateTime<Utc> {
    let origin = Instant::now();
    move || start + TimeDelta::from_std(origin.elapsed()).unwrap()
}

fn utc(h: u32, m: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, h, m, sec).unwrap()
}

fn schedule_at() -> NaiveTime {
    NaiveTime::from_hms_opt(13, 25, 0).unwrap()
}

#[tokio::test(start_paused = true)]
async fn scheduler_returns_when_cancelled_while_waiting() {
    let provider = Arc::new(ScriptedProvider::always(ok("report")));
    let job = job(&provider);
    let cancel = CancellationToken::new();

    tokio::join!(
        scheduler::run_daily_with_clock(&job, schedule_at(), &cancel, clock_from(utc(9, 0, 0))),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        }
    );

    assert_eq!(provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn scheduler_keeps_running_after_failed_day() {
    let provider = Arc::new(ScriptedProvider::always(unauthorized()));
    let job = job(&provider);
    let cancel = CancellationToken::new();
    let one_day = Duration::from_secs(24 * 60 * 60);

    tokio::join!(
        scheduler::run_daily_with_clock(&job, schedule_at(), &cancel, clock_from(utc(13, 24, 59))),
        async {
            tokio::time::sleep(one_day + Duration::from_secs(10)).await;
            cancel.cancel();
        }
    );

    assert_eq!(provider.call_count(), 2);
    assert_close(provider.gaps()[0], one_day);
}

#[tokio::test(start_paused = true)]
async fn scheduler_stops_when_run_is_cancelled_mid_backoff() {
    let provider = Arc::new(ScriptedProvider::always(unavailable()));
    let job = job(&provider);
    let cancel = CancellationToken::new();

    let start = Instant::now();
    tokio::join!(
        scheduler::run_daily_with_clock(&job, schedule_at(), &cancel, clock_from(utc(13, 24, 59))),
        async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            cancel.cancel();
        }
    );

    assert_eq!(provider.call_count(), 1);
    assert_close(start.elapsed(), Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn run_once_continues_on_failure_and_breaks_on_cancel() {
    let provider = Arc::new(ScriptedProvider::always(unauthorized()));
    let job = job(&provider);
    let cancel = CancellationToken::new();

    assert_eq!(scheduler::run_once(&job, &cancel).await, ControlFlow::Continue(()));
    assert_eq!(provider.call_count(), 1);

    cancel.cancel();
    assert_eq!(scheduler::run_once(&job, &cancel).await, ControlFlow::Break(()));
    assert_eq!(provider.call_count(), 1);
}
