//! Resilient report fetching: one logical request, bounded retries.

pub mod classify;
pub mod fetcher;
pub mod policy;
pub mod state;

pub use classify::{Classify, Disposition, StatusClassifier};
pub use fetcher::{AttemptOutcome, FetchError, ReportResult, ResilientReportFetcher};
pub use policy::RetryPolicy;
pub use state::FetchState;

pub use crate::llm::{ApiKey, ReportRequest};
