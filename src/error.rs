use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Report sink error: {0}")]
    Sink(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    /// Process exit status for the `run` command.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Validation(_) => 78,
            AppError::Fetch(FetchError::Fatal { .. }) => 2,
            AppError::Fetch(FetchError::ExhaustedRetries { .. }) => 3,
            AppError::Fetch(FetchError::Cancelled { .. }) => 130,
            AppError::Sink(_) => 74,
            AppError::Http(_) => 1,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
