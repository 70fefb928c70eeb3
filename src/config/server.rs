//! HTTP listener settings

use super::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Reject chat requests that carry no `Authorization: Bearer` token.
    pub require_auth: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            require_auth: false,
        }
    }
}

impl ServerConfig {
    /// `host:port` for the TCP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::invalid("server.port", "port must be non-zero"));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("server.host", "host must not be empty"));
        }
        Ok(())
    }
}
