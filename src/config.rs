use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;

use crate::error::AppError;
use crate::fetch::RetryPolicy;
use crate::llm::{ApiKey, anthropic, gemini, openai};
use crate::report::prompt::DEFAULT_PROMPT_TEMPLATE;

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_SCHEDULE_TIME_UTC: &str = "13:25";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }

    fn api_key_vars(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
            ProviderKind::Anthropic => &["ANTHROPIC_API_KEY"],
            ProviderKind::Ollama => &[],
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Ok(ProviderKind::Google),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!(
                "unknown provider {other:?}, expected google, openai, anthropic or ollama"
            )),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub llm_provider: ProviderKind,
    pub llm_model: String,
    pub llm_base_url: String,
    pub api_key: ApiKey,
    pub prompt_template: String,
    pub report_output_dir: PathBuf,
    pub show_report: bool,
    pub schedule_time_utc: NaiveTime,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_provider: ProviderKind = parse_or(&get, "LLM_PROVIDER", "google")?;

        let llm_model = get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let llm_base_url = match (llm_provider, get("LLM_BASE_URL")) {
            (ProviderKind::Ollama, base_url) => {
                ollama_base_url(base_url, get("OLLAMA_BASE_URL"))?
            }
            (_, Some(url)) => url,
            (ProviderKind::Google, None) => gemini::GEMINI_BASE_URL.to_string(),
            (ProviderKind::OpenAi, None) => openai::OPENAI_BASE_URL.to_string(),
            (ProviderKind::Anthropic, None) => anthropic::ANTHROPIC_BASE_URL.to_string(),
        };

        let api_key = resolve_api_key(&get, llm_provider)?;

        let prompt_template = match (get("PROMPT_TEMPLATE"), get("PROMPT_TEMPLATE_FILE")) {
            (Some(template), _) => template,
            (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
                AppError::Config(format!("PROMPT_TEMPLATE_FILE {path:?} could not be read: {e}"))
            })?,
            (None, None) => DEFAULT_PROMPT_TEMPLATE.to_string(),
        };

        let schedule_time = get("SCHEDULE_TIME_UTC")
            .unwrap_or_else(|| DEFAULT_SCHEDULE_TIME_UTC.to_string());
        let schedule_time_utc = parse_schedule_time(&schedule_time)?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "RETRY_MAX_ATTEMPTS", &defaults.max_attempts.to_string())?,
            initial_delay: Duration::from_millis(parse_or(
                &get,
                "RETRY_INITIAL_DELAY_MS",
                &defaults.initial_delay.as_millis().to_string(),
            )?),
            backoff_multiplier: parse_or(
                &get,
                "RETRY_BACKOFF_MULTIPLIER",
                &defaults.backoff_multiplier.to_string(),
            )?,
            max_delay: Duration::from_millis(parse_or(
                &get,
                "RETRY_MAX_DELAY_MS",
                &defaults.max_delay.as_millis().to_string(),
            )?),
            jitter: parse_or(&get, "RETRY_JITTER", "0.0")?,
        };
        retry
            .validate()
            .map_err(|e| AppError::Config(format!("retry settings: {e}")))?;

        Ok(Self {
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            llm_provider,
            llm_model,
            llm_base_url,
            api_key,
            prompt_template,
            report_output_dir: PathBuf::from(
                get("REPORT_OUTPUT_DIR").unwrap_or_else(|| ".".to_string()),
            ),
            show_report: parse_bool(&get, "SHOW_REPORT", true)?,
            schedule_time_utc,
            retry,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", "120")?),
            otel_service_name: get("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "meme-stock-reporter".to_string()),
            otel_exporter_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Effective settings for display. The API key is always redacted.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("environment", self.environment.clone()),
            ("provider", self.llm_provider.to_string()),
            ("model", self.llm_model.clone()),
            ("base_url", self.llm_base_url.clone()),
            ("api_key", self.api_key.to_string()),
            ("output_dir", self.report_output_dir.display().to_string()),
            ("show_report", self.show_report.to_string()),
            (
                "schedule_time_utc",
                self.schedule_time_utc.format("%H:%M").to_string(),
            ),
            ("retry.max_attempts", self.retry.max_attempts.to_string()),
            (
                "retry.initial_delay_ms",
                self.retry.initial_delay.as_millis().to_string(),
            ),
            (
                "retry.backoff_multiplier",
                self.retry.backoff_multiplier.to_string(),
            ),
            (
                "retry.max_delay_ms",
                self.retry.max_delay.as_millis().to_string(),
            ),
            ("retry.jitter", self.retry.jitter.to_string()),
            (
                "request_timeout_secs",
                self.request_timeout.as_secs().to_string(),
            ),
            (
                "otel_exporter_endpoint",
                self.otel_exporter_endpoint
                    .clone()
                    .unwrap_or_else(|| "(disabled)".to_string()),
            ),
        ]
    }
}

pub fn parse_schedule_time(value: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        AppError::Config(format!(
            "SCHEDULE_TIME_UTC must be HH:MM in 24-hour UTC (e.g. 13:30), got {value:?}"
        ))
    })
}

fn resolve_api_key<G>(get: &G, provider: ProviderKind) -> Result<ApiKey, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    let vars = provider.api_key_vars();
    if vars.is_empty() {
        return Ok(ApiKey::new(provider.as_str()));
    }

    let key = vars
        .iter()
        .find_map(|&var| get(var))
        .map(|k| k.trim().to_string())
        .ok_or_else(|| {
            AppError::Config(format!(
                "API key not set for provider {provider}, set {}",
                vars.join(" or ")
            ))
        })?;

    if key == PLACEHOLDER_API_KEY {
        return Err(AppError::Config(format!(
            "{} still holds the placeholder value",
            vars[0]
        )));
    }

    Ok(ApiKey::new(key))
}

fn parse_or<G, T>(get: &G, key: &str, default: &str) -> Result<T, AppError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{key} has invalid value {raw:?}: {e}")))
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config(format!(
                "{key} must be true or false, got {raw:?}"
            ))),
        },
    }
}

/// `LLM_BASE_URL` and `OLLAMA_BASE_URL` both name the Ollama server; setting
/// them to different hosts is an error.
fn ollama_base_url(llm_base_url: Option<String>, ollama: Option<String>) -> Result<String, AppError> {
    match (llm_base_url, ollama) {
        (Some(a), Some(b)) if a.trim_end_matches('/') != b.trim_end_matches('/') => {
            Err(AppError::Config(format!(
                "LLM_BASE_URL {a:?} conflicts with OLLAMA_BASE_URL {b:?}; set only one"
            )))
        }
        (Some(url), _) | (None, Some(url)) => Ok(url),
        (None, None) => Ok(DEFAULT_OLLAMA_BASE_URL.to_string()),
    }
}
