use crate::{env_flag, SettingsError};
use serde::Serialize;
use std::io;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const DEFAULT_TIME_PATTERN: &str =
    "[year]-[month]-[day]T[hour repr:24]:[minute]:[second]::[subsecond digits:4]";

#[derive(Debug, Clone, Serialize)]
pub struct LogSettings {
    pub log_level: String,
    pub use_json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_json = env_flag("LOG_JSON");

        Self {
            log_level,
            use_json,
        }
    }
}

/// Installs the global fmt subscriber described by `settings`
pub fn setup_logging(settings: &LogSettings) -> Result<(), SettingsError> {
    let time_format = time::format_description::parse(DEFAULT_TIME_PATTERN)
        .map_err(|e| SettingsError::TimeFormatError(e.to_string()))?;

    let filter = EnvFilter::try_new(&settings.log_level)
        .map_err(|e| SettingsError::FilterError(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_timer(UtcTime::new(time_format))
        .with_writer(io::stdout);

    let result = if settings.use_json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.with_ansi(true).try_init()
    };

    result.map_err(|e| SettingsError::SubscriberError(e.to_string()))
}
