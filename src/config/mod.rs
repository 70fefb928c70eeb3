//! Configuration module for chatwire
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`CHATWIRE_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use chatwire::config::ChatwireConfig;
//!
//! // Load defaults
//! let config = ChatwireConfig::default();
//! assert_eq!(config.server.port, 8000);
//!
//! // Parse from TOML
//! let toml = r#"
//! [server]
//! port = 9000
//! "#;
//! let config: ChatwireConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.server.port, 9000);
//! ```

pub mod completion;
pub mod error;
pub mod logging;
pub mod server;

pub use completion::{CompletionConfig, SourceKind};
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the chatwire server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChatwireConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Completion source selection and bounded waits
    pub completion: CompletionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ChatwireConfig {
    /// Read a TOML file, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    /// Apply environment variable overrides
    ///
    /// Supports CHATWIRE_* environment variables for common settings.
    /// Invalid values are ignored and the previous value is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("CHATWIRE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("CHATWIRE_HOST") {
            self.server.host = host;
        }
        if let Ok(require_auth) = std::env::var("CHATWIRE_REQUIRE_AUTH") {
            self.server.require_auth = require_auth.to_lowercase() == "true";
        }

        if let Ok(level) = std::env::var("CHATWIRE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CHATWIRE_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(source) = std::env::var("CHATWIRE_SOURCE") {
            if let Ok(kind) = source.parse() {
                self.completion.source = kind;
            }
        }
        if let Ok(url) = std::env::var("CHATWIRE_UPSTREAM_URL") {
            self.completion.upstream_url = Some(url);
        }

        self
    }

    /// Check every section; the first failure wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.completion.validate()?;
        self.logging.validate()
    }
}
