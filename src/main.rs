use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use meme_stock_reporter::config::Config;
use meme_stock_reporter::fetch::ResilientReportFetcher;
use meme_stock_reporter::llm;
use meme_stock_reporter::report::{ConsoleSink, Delivery, FileSink, ReportJob};
use meme_stock_reporter::scheduler;
use meme_stock_reporter::telemetry::init_telemetry;

const USAGE: &str = "\
Usage: meme-report <command>

Commands:
  run           Generate today's meme stock report now and exit
  schedule      Stay running and generate a report every day at SCHEDULE_TIME_UTC
  show-config   Print the effective configuration (API key redacted)
  help          Show this message

Settings are read from the environment and an optional .env file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Schedule,
    ShowConfig,
    Help,
}

fn parse_command(arg: Option<&str>) -> Option<Command> {
    match arg {
        None | Some("help" | "-h" | "--help") => Some(Command::Help),
        Some("run") => Some(Command::Run),
        Some("schedule") => Some(Command::Schedule),
        Some("show-config") => Some(Command::ShowConfig),
        Some(_) => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let arg = std::env::args().nth(1);
    let Some(command) = parse_command(arg.as_deref()) else {
        eprintln!("Unknown command: {}\n\n{USAGE}", arg.unwrap_or_default());
        return Ok(ExitCode::from(64));
    };

    if command == Command::Help {
        println!("{USAGE}");
        return Ok(ExitCode::SUCCESS);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    if command == Command::ShowConfig {
        for (key, value) in config.summary() {
            println!("{key:<26} {value}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        environment = %config.environment,
        provider = %config.llm_provider,
        model = %config.llm_model,
        "Starting meme-stock-reporter"
    );

    let provider = llm::build_provider(&config)?;
    let fetcher = ResilientReportFetcher::new(provider, config.retry.clone())?;

    let mut job = ReportJob::new(
        fetcher,
        config.prompt_template.clone(),
        config.llm_model.clone(),
        config.api_key.clone(),
    )
    .with_sink(Arc::new(FileSink::new(&config.report_output_dir)));
    if config.show_report {
        job = job.with_sink(Arc::new(ConsoleSink));
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let code = match command {
        Command::Run => {
            tracing::info!("Automated run initiated");
            match job.run(&cancel).await {
                Ok(outcome) => {
                    for delivery in &outcome.deliveries {
                        if let Delivery::Saved(path) = delivery {
                            tracing::info!(path = %path.display(), "Report written");
                        }
                    }
                    tracing::info!(attempts = outcome.report.attempts, "Automated run complete");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "Automated run failed");
                    ExitCode::from(e.exit_code())
                }
            }
        }
        Command::Schedule => {
            scheduler::run_daily(&job, config.schedule_time_utc, &cancel).await;
            ExitCode::SUCCESS
        }
        Command::ShowConfig | Command::Help => ExitCode::SUCCESS,
    };

    tracing::info!("Shutdown complete");
    telemetry_guard.shutdown();

    Ok(code)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
