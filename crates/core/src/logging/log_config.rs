use serde::{Deserialize, Serialize};

use crate::logging::log_level::LogLevel;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum log level to display
    #[serde(default = "default_level")]
    pub level: LogLevel,
    /// Output format for logs
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for log entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format
    Json,
    /// Human readable format
    #[default]
    Pretty,
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: OutputFormat::default(),
        }
    }
}

impl LogConfig {
    /// Apply `LOG_LEVEL` / `LOG_FORMAT` overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level_str) = std::env::var("LOG_LEVEL") {
            if let Ok(level) = level_str.parse::<LogLevel>() {
                self.level = level;
            }
        }

        if let Ok(format_str) = std::env::var("LOG_FORMAT") {
            self.format = match format_str.to_lowercase().as_str() {
                "json" => OutputFormat::Json,
                _ => OutputFormat::Pretty,
            };
        }

        self
    }

    pub fn with_level(level: LogLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}
