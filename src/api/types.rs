//! Request and response types for both chat surfaces.
//!
//! The native surface answers with a `completion_message` object whose
//! content is a typed text block; the compatibility surface answers in the
//! OpenAI `chat.completion` / `chat.completion.chunk` shapes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A validated chat message with its content flattened to text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A validated chat completion request.
///
/// Built only by [`crate::api::validate::validate_request`], so `messages` is
/// never empty and every message has non-empty content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Content of the most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
        }
    }

    /// Map an upstream `finish_reason` string; unknown values count as `stop`.
    pub fn from_upstream(value: &str) -> Self {
        match value {
            "length" => FinishReason::Length,
            _ => FinishReason::Stop,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

// ============================================================================
// Native surface
// ============================================================================

/// Typed text block used by the native surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// The `completion_message` object of native responses and stream events.
///
/// Stream content events carry only `content`; the final status event and
/// buffered responses also carry `role` and `stop_reason`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompletionMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub content: TextContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<FinishReason>,
}

/// One entry of the native `metrics` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NativeMetric {
    pub metric: String,
    pub value: u32,
    pub unit: String,
}

impl NativeMetric {
    fn tokens(metric: &str, value: u32) -> Self {
        Self {
            metric: metric.to_string(),
            value,
            unit: "tokens".to_string(),
        }
    }

    /// Express token usage as native metrics entries.
    pub fn from_usage(usage: &Usage) -> Vec<Self> {
        vec![
            Self::tokens("num_prompt_tokens", usage.prompt_tokens),
            Self::tokens("num_completion_tokens", usage.completion_tokens),
            Self::tokens("num_total_tokens", usage.total_tokens),
        ]
    }
}

/// Native non-streaming response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeCompletionResponse {
    pub id: String,
    pub completion_message: CompletionMessage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<NativeMetric>,
}

/// Payload of one native SSE event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeStreamEvent {
    pub completion_message: CompletionMessage,
}

// ============================================================================
// Compatibility (OpenAI) surface
// ============================================================================

/// Assistant message inside a compatibility choice.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssistantMessage {
    pub role: Role,
    pub content: String,
}

/// Chat completion response (non-streaming).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A single choice in the response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: Option<FinishReason>,
}

/// Chat completion chunk for streaming responses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// A single choice in a streaming chunk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

/// Delta content in a streaming chunk.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// API error response in OpenAI format, used by both surfaces.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

/// Error details.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    fn new(message: &str, r#type: &str, param: Option<&str>, code: &str) -> Self {
        Self {
            error: ApiErrorBody {
                message: message.to_string(),
                r#type: r#type.to_string(),
                param: param.map(str::to_string),
                code: Some(code.to_string()),
            },
        }
    }

    /// Create a bad request error (400) with a specific code.
    pub fn bad_request(message: &str, code: &str, param: Option<&str>) -> Self {
        Self::new(message, "invalid_request_error", param, code)
    }

    /// Create an unauthorized error (401).
    pub fn unauthorized() -> Self {
        Self::new(
            "Missing bearer token in Authorization header",
            "authentication_error",
            None,
            "unauthorized",
        )
    }

    /// Create a completion timeout error (504).
    pub fn completion_timeout(message: &str) -> Self {
        Self::new(message, "server_error", None, "completion_timeout")
    }

    /// Create a completion failure error (502).
    pub fn completion_failure(message: &str) -> Self {
        Self::new(message, "server_error", None, "completion_failure")
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.error.code.as_deref() {
            Some("unsupported_media_type")
            | Some("malformed_body")
            | Some("invalid_messages")
            | Some("missing_streaming_accept") => StatusCode::BAD_REQUEST,
            Some("unauthorized") => StatusCode::UNAUTHORIZED,
            Some("completion_failure") => StatusCode::BAD_GATEWAY,
            Some("completion_timeout") => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}
