//! Logging configuration

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, for a developer terminal
    #[default]
    Pretty,
    /// One line per event
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::UnknownValue {
                field: "logging.format",
                value: s.to_string(),
                expected: "pretty, compact, json",
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level for every target.
    pub level: String,
    pub format: LogFormat,
    /// Per-module levels under `chatwire::`, e.g. {"api": "debug", "source": "trace"}
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_levels: Option<HashMap<String, String>>,
    /// Log a short preview of the last user message of each request.
    /// Prompts may carry sensitive data.
    pub enable_content_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            component_levels: None,
            enable_content_logging: false,
        }
    }
}

impl LoggingConfig {
    /// Every level, base and per component, must name a tracing level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_level("logging.level", &self.level)?;
        for (component, level) in self.component_levels.iter().flatten() {
            check_level(&format!("logging.component_levels.{component}"), level)?;
        }
        Ok(())
    }
}

fn check_level(field: &str, level: &str) -> Result<(), ConfigError> {
    LevelFilter::from_str(level).map(|_| ()).map_err(|_| {
        ConfigError::invalid(
            field,
            format!("'{level}' is not one of off, error, warn, info, debug, trace"),
        )
    })
}
