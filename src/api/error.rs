//! Dispatch error taxonomy.
//!
//! Every failure a chat request can meet between arrival and the last byte of
//! its response. Validation and negotiation failures are raised before any
//! byte is written and become HTTP errors; completion failures become HTTP
//! errors for buffered responses and terminal SSE error events once streaming
//! headers are out.

use super::types::{ApiError, ApiErrorBody};
use crate::source::SourceError;
use thiserror::Error;

/// Errors raised by the chat dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unsupported media type '{content_type}': expected application/json")]
    UnsupportedMediaType { content_type: String },

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Invalid messages: {0}")]
    InvalidMessages(String),

    #[error("stream=true requires an 'Accept: text/event-stream' header")]
    MissingStreamingAccept,

    #[error("Completion source produced nothing within {waited_ms}ms")]
    CompletionTimeout { waited_ms: u64 },

    #[error("Completion source failed: {0}")]
    CompletionFailure(String),

    #[error("Client disconnected before the response completed")]
    ClientDisconnected,
}

impl DispatchError {
    /// Stable machine-readable code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::UnsupportedMediaType { .. } => "unsupported_media_type",
            DispatchError::MalformedBody(_) => "malformed_body",
            DispatchError::InvalidMessages(_) => "invalid_messages",
            DispatchError::MissingStreamingAccept => "missing_streaming_accept",
            DispatchError::CompletionTimeout { .. } => "completion_timeout",
            DispatchError::CompletionFailure(_) => "completion_failure",
            DispatchError::ClientDisconnected => "client_disconnected",
        }
    }

    /// Request parameter the error points at, when there is one.
    fn param(&self) -> Option<&'static str> {
        match self {
            DispatchError::InvalidMessages(_) => Some("messages"),
            DispatchError::MissingStreamingAccept => Some("stream"),
            _ => None,
        }
    }

    /// True for errors detected before any response byte is written.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DispatchError::UnsupportedMediaType { .. }
                | DispatchError::MalformedBody(_)
                | DispatchError::InvalidMessages(_)
                | DispatchError::MissingStreamingAccept
        )
    }

    /// Error envelope in the shape clients receive, over HTTP or as an SSE event.
    pub fn to_api_error(&self) -> ApiError {
        let message = self.to_string();
        if self.is_rejection() {
            return ApiError::bad_request(&message, self.code(), self.param());
        }
        match self {
            DispatchError::CompletionTimeout { .. } => ApiError::completion_timeout(&message),
            DispatchError::CompletionFailure(_) => ApiError::completion_failure(&message),
            _ => ApiError {
                error: ApiErrorBody {
                    message,
                    r#type: "server_error".to_string(),
                    param: None,
                    code: Some(self.code().to_string()),
                },
            },
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        e.to_api_error()
    }
}

impl From<SourceError> for DispatchError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Timeout(waited_ms) => DispatchError::CompletionTimeout { waited_ms },
            other => DispatchError::CompletionFailure(other.to_string()),
        }
    }
}
