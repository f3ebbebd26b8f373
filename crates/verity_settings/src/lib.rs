use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub mod logging;

pub use logging::{setup_logging, LogSettings};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to parse time format: {0}")]
    TimeFormatError(String),

    #[error("Failed to build log filter: {0}")]
    FilterError(String),

    #[error("Failed to install global subscriber: {0}")]
    SubscriberError(String),
}

/// Reads `key` from the environment, falling back to `default` when unset or unparseable
pub(crate) fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("Ignoring invalid value for {}: {}", key, e);
            default
        }),
        Err(_) => default,
    }
}

pub(crate) fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|raw| matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSettings {
    /// Opt-in for the sandboxed expression evaluator
    pub allow_expressions: bool,

    /// Model used by judge evaluators that do not name one
    pub judge_model: Option<String>,

    pub max_concurrency: usize,

    pub log_settings: LogSettings,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        let allow_expressions = env_flag("VERITY_ALLOW_EXPRESSIONS");

        let judge_model = std::env::var("VERITY_JUDGE_MODEL")
            .ok()
            .filter(|model| !model.trim().is_empty());

        let max_concurrency = env_or("VERITY_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY).max(1);

        Self {
            allow_expressions,
            judge_model,
            max_concurrency,
            log_settings: LogSettings::default(),
        }
    }
}
