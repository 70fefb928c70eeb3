//! Structured logging module for request tracing
//!
//! Filter construction, request ids and privacy-safe field helpers shared
//! by the dispatcher.

pub mod fields;
pub mod request_id;

pub use fields::{outcome_status, truncate_prompt};
pub use request_id::generate_request_id;

use crate::config::LoggingConfig;

/// Build filter directives string from LoggingConfig
///
/// The result has the form `base_level,chatwire::component=level,...`.
///
/// # Examples
///
/// ```
/// use chatwire::config::{LogFormat, LoggingConfig};
/// use chatwire::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("source".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
///     enable_content_logging: false,
/// };
///
/// assert_eq!(build_filter_directives(&config), "info,chatwire::source=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",chatwire::{}={}", component, level));
        }
    }

    filter_str
}
