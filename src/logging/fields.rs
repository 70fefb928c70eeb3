//! Field extraction helpers for structured logging

use crate::api::error::DispatchError;
use crate::api::types::ChatRequest;

/// Maximum characters of prompt preview written to logs.
const PROMPT_PREVIEW_CHARS: usize = 100;

/// Short status label for a dispatch outcome.
///
/// # Examples
///
/// ```
/// use chatwire::api::error::DispatchError;
/// use chatwire::logging::outcome_status;
///
/// assert_eq!(outcome_status(None), "success");
/// assert_eq!(outcome_status(Some(&DispatchError::MissingStreamingAccept)), "rejected");
/// ```
pub fn outcome_status(error: Option<&DispatchError>) -> &'static str {
    match error {
        None => "success",
        Some(DispatchError::ClientDisconnected) => "disconnected",
        Some(e) if e.is_rejection() => "rejected",
        Some(_) => "error",
    }
}

/// Truncate request prompt for logging preview (privacy-safe)
///
/// Returns `None` when content logging is disabled. Otherwise returns the
/// last user message cut to 100 characters.
pub fn truncate_prompt(request: &ChatRequest, enable_content_logging: bool) -> Option<String> {
    if !enable_content_logging {
        return None;
    }

    request
        .last_user_message()
        .map(|text| truncate_string(text, PROMPT_PREVIEW_CHARS))
}

fn truncate_string(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((end, _)) => format!("{}...", &s[..end]),
    }
}
