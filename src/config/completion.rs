//! Completion source configuration

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Which completion source backs the chat endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Deterministic local echo, useful for smoke tests and demos
    #[default]
    Echo,
    /// OpenAI-compatible backend reached over HTTP
    Upstream,
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "echo" => Ok(SourceKind::Echo),
            "upstream" => Ok(SourceKind::Upstream),
            _ => Err(ConfigError::UnknownValue {
                field: "completion.source",
                value: s.to_string(),
                expected: "echo, upstream",
            }),
        }
    }
}

/// Completion source settings and the dispatcher's bounded waits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub source: SourceKind,
    /// Maximum wait for the first fragment of a streamed completion
    pub first_fragment_timeout_ms: u64,
    /// Maximum silence between reads of a streamed upstream body
    pub fragment_idle_timeout_ms: u64,
    /// Maximum wait for a whole buffered completion
    pub result_timeout_ms: u64,
    /// Pause between echo fragments
    pub fragment_delay_ms: u64,
    /// Base URL of the OpenAI-compatible backend (upstream source only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_url: Option<String>,
    /// Name of the env var holding the upstream bearer key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Echo,
            first_fragment_timeout_ms: 30_000,
            fragment_idle_timeout_ms: 30_000,
            result_timeout_ms: 300_000,
            fragment_delay_ms: 0,
            upstream_url: None,
            api_key_env: None,
        }
    }
}

impl CompletionConfig {
    pub fn first_fragment_timeout(&self) -> Duration {
        Duration::from_millis(self.first_fragment_timeout_ms)
    }

    pub fn fragment_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.fragment_idle_timeout_ms)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }

    pub fn fragment_delay(&self) -> Duration {
        Duration::from_millis(self.fragment_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_fragment_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "completion.first_fragment_timeout_ms",
                "timeout must be non-zero",
            ));
        }
        if self.fragment_idle_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "completion.fragment_idle_timeout_ms",
                "timeout must be non-zero",
            ));
        }
        if self.result_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "completion.result_timeout_ms",
                "timeout must be non-zero",
            ));
        }
        if self.source == SourceKind::Upstream {
            let url = self
                .upstream_url
                .as_deref()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| {
                    ConfigError::invalid("completion.upstream_url", "upstream source requires a URL")
                })?;
            match reqwest::Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => {
                    return Err(ConfigError::invalid(
                        "completion.upstream_url",
                        format!("'{}' is not an http(s) URL", url),
                    ))
                }
            }
        }
        Ok(())
    }
}
