use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::AppResult;
use crate::fetch::ReportResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Saved(PathBuf),
    Displayed,
}

/// Receives a finished report.
#[async_trait::async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &ReportResult, report_date: NaiveDate) -> AppResult<Delivery>;
    fn name(&self) -> &str;
}

/// Writes `{dir}/{YYYY-MM-DD}_MemeStock.txt`, replacing any earlier report
/// for the same date.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, report_date: NaiveDate) -> PathBuf {
        report_path(&self.dir, report_date)
    }
}

pub fn report_path(dir: &Path, report_date: NaiveDate) -> PathBuf {
    dir.join(format!("{}_MemeStock.txt", report_date.format("%Y-%m-%d")))
}

#[async_trait::async_trait]
impl ReportSink for FileSink {
    #[tracing::instrument(name = "report.sink.file", skip_all, fields(report.path))]
    async fn deliver(&self, report: &ReportResult, report_date: NaiveDate) -> AppResult<Delivery> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(report_date);
        tokio::fs::write(&path, report.text.as_bytes()).await?;

        tracing::Span::current().record("report.path", path.display().to_string());
        tracing::info!(path = %path.display(), bytes = report.text.len(), "Report saved");

        Ok(Delivery::Saved(path))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Prints the report to stdout under a dated header.
pub struct ConsoleSink;

pub fn render_for_console(report: &ReportResult, report_date: NaiveDate) -> String {
    let title = format!("Meme Stock Report - {}", report_date.format("%Y-%m-%d"));
    let rule = "=".repeat(title.len().max(46));
    format!(
        "{rule}\n{title}\n{rule}\n{}\n\n(model {} via {}, generated {})\n",
        report.text.trim_end(),
        report.model,
        report.provider,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[async_trait::async_trait]
impl ReportSink for ConsoleSink {
    async fn deliver(&self, report: &ReportResult, report_date: NaiveDate) -> AppResult<Delivery> {
        let rendered = render_for_console(report, report_date);
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        stdout.flush()?;
        Ok(Delivery::Displayed)
    }

    fn name(&self) -> &str {
        "console"
    }
}
