pub mod config;
pub mod error;
pub mod fetch;
pub mod llm;
pub mod report;
pub mod scheduler;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, AppResult};
