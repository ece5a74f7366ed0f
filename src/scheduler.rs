//! In-process daily runner for the `schedule` command.

use std::ops::ControlFlow;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::fetch::FetchError;
use crate::report::ReportJob;

/// First instant strictly after `now` whose UTC wall-clock time is `at`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Runs `job` every day at `at` (UTC) until `cancel` fires. A failed run is
/// logged and the loop waits for the next day.
pub async fn run_daily(job: &ReportJob, at: NaiveTime, cancel: &CancellationToken) {
    run_daily_with_clock(job, at, cancel, Utc::now).await;
}

/// [`run_daily`] reading wall-clock time from `now`.
pub async fn run_daily_with_clock<F>(
    job: &ReportJob,
    at: NaiveTime,
    cancel: &CancellationToken,
    now: F,
) where
    F: Fn() -> DateTime<Utc>,
{
    loop {
        let current = now();
        let next = next_run_after(current, at);
        let wait = (next - current).to_std().unwrap_or_default();

        tracing::info!(
            next_run = %next,
            wait_secs = wait.as_secs(),
            "Next report scheduled"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("Scheduler received shutdown signal");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }

        if run_once(job, cancel).await.is_break() {
            return;
        }
    }
}

/// One scheduled run. Breaks only when the run was cancelled; any other
/// failure is logged and the schedule continues.
pub async fn run_once(job: &ReportJob, cancel: &CancellationToken) -> ControlFlow<()> {
    match job.run(cancel).await {
        Ok(outcome) => {
            tracing::info!(
                report_date = %outcome.report_date,
                attempts = outcome.report.attempts,
                deliveries = outcome.deliveries.len(),
                "Scheduled report completed"
            );
            ControlFlow::Continue(())
        }
        Err(AppError::Fetch(FetchError::Cancelled { .. })) => {
            tracing::info!("Scheduled report cancelled");
            ControlFlow::Break(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Scheduled report failed");
            ControlFlow::Continue(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_later_today() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(13, 25)),
            Utc.with_ymd_and_hms(2026, 10, 16, 13, 25, 0).unwrap()
        );
    }

    #[test]
    fn test_already_passed_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 14, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(13, 25)),
            Utc.with_ymd_and_hms(2026, 10, 17, 13, 25, 0).unwrap()
        );
    }

    #[test]
    fn test_exact_instant_is_not_reused() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 13, 25, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(13, 25)),
            Utc.with_ymd_and_hms(2026, 10, 17, 13, 25, 0).unwrap()
        );
    }

    #[test]
    fn test_month_and_year_rollover() {
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(0, 5)),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 5, 0).unwrap()
        );
    }
}
