//! Response encoding for both chat surfaces.
//!
//! Streaming answers are framed as SSE `data:` events, one per fragment, and
//! end with `data: [DONE]`. Buffered answers are assembled into one JSON
//! object. The schema is picked per route; nothing else differs.

use super::types::{
    ApiError, AssistantMessage, ChatCompletionChunk, ChatCompletionResponse, Choice, ChunkChoice,
    ChunkDelta, CompletionMessage, FinishReason, NativeCompletionResponse, NativeMetric,
    NativeStreamEvent, Role, TextContent,
};
use crate::source::{CompletionFragment, CompletionResult};
use axum::response::sse::Event;
use serde::Serialize;
use serde_json::Value;

/// Terminal payload of every stream.
pub const DONE: &str = "[DONE]";

/// Wire schema of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    /// `completion_message` events with typed text content.
    Native,
    /// OpenAI `chat.completion` / `chat.completion.chunk` objects.
    Compat,
}

impl ResponseSchema {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseSchema::Native => "native",
            ResponseSchema::Compat => "compat",
        }
    }
}

/// One server-sent event of a completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Data(Value),
    Done,
}

impl SseEvent {
    fn data<T: Serialize>(payload: &T) -> Self {
        SseEvent::Data(serde_json::to_value(payload).unwrap_or(Value::Null))
    }

    /// Text carried on the `data:` line.
    pub fn payload(&self) -> String {
        match self {
            SseEvent::Data(value) => value.to_string(),
            SseEvent::Done => DONE.to_string(),
        }
    }

    /// Wire form: `data: <payload>\n\n`.
    pub fn render(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }

    pub fn to_event(&self) -> Event {
        Event::default().data(self.payload())
    }
}

/// Per-request encoder.
///
/// Holds the identity shared by every event of one response (id, model,
/// creation time) and whether the role has been announced yet.
#[derive(Debug, Clone)]
pub struct StreamEncoder {
    schema: ResponseSchema,
    id: String,
    model: String,
    created: i64,
    role_sent: bool,
}

impl StreamEncoder {
    pub fn new(schema: ResponseSchema, model: impl Into<String>) -> Self {
        let id = match schema {
            ResponseSchema::Native => uuid::Uuid::new_v4().to_string(),
            ResponseSchema::Compat => format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        };
        Self {
            schema,
            id,
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            role_sent: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> ResponseSchema {
        self.schema
    }

    /// Content event for a fragment; `None` when it carries no text.
    pub fn fragment(&mut self, fragment: &CompletionFragment) -> Option<SseEvent> {
        if fragment.text.is_empty() {
            return None;
        }
        let event = match self.schema {
            ResponseSchema::Native => SseEvent::data(&NativeStreamEvent {
                completion_message: CompletionMessage {
                    role: None,
                    content: TextContent::text(fragment.text.clone()),
                    stop_reason: None,
                },
            }),
            ResponseSchema::Compat => {
                let role = (!self.role_sent).then_some(Role::Assistant);
                self.role_sent = true;
                SseEvent::data(&self.chunk(
                    ChunkDelta {
                        role,
                        content: Some(fragment.text.clone()),
                    },
                    None,
                ))
            }
        };
        Some(event)
    }

    /// Closing status event carrying the finish reason.
    pub fn finish(&self, finish_reason: FinishReason) -> SseEvent {
        match self.schema {
            ResponseSchema::Native => SseEvent::data(&NativeStreamEvent {
                completion_message: CompletionMessage {
                    role: Some(Role::Assistant),
                    content: TextContent::text(""),
                    stop_reason: Some(finish_reason),
                },
            }),
            ResponseSchema::Compat => {
                SseEvent::data(&self.chunk(ChunkDelta::default(), Some(finish_reason)))
            }
        }
    }

    /// Error event sent in place of further content.
    pub fn error(&self, error: &ApiError) -> SseEvent {
        SseEvent::data(error)
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    /// Assemble the single JSON body of a buffered answer.
    pub fn buffered(&self, result: &CompletionResult) -> Value {
        let body = match self.schema {
            ResponseSchema::Native => serde_json::to_value(NativeCompletionResponse {
                id: self.id.clone(),
                completion_message: CompletionMessage {
                    role: Some(Role::Assistant),
                    content: TextContent::text(result.content.clone()),
                    stop_reason: Some(result.finish_reason),
                },
                metrics: result
                    .usage
                    .as_ref()
                    .map(NativeMetric::from_usage)
                    .unwrap_or_default(),
            }),
            ResponseSchema::Compat => serde_json::to_value(ChatCompletionResponse {
                id: self.id.clone(),
                object: "chat.completion".to_string(),
                created: self.created,
                model: self.model.clone(),
                choices: vec![Choice {
                    index: 0,
                    message: AssistantMessage {
                        role: Role::Assistant,
                        content: result.content.clone(),
                    },
                    finish_reason: Some(result.finish_reason),
                }],
                usage: result.usage,
            }),
        };
        body.unwrap_or(Value::Null)
    }
}
