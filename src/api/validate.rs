//! Request validation.
//!
//! Turns the raw `Content-Type` header and body bytes of a chat request into a
//! [`ChatRequest`], classifying every failure. Pure: no I/O, no logging.

use super::error::DispatchError;
use super::types::{ChatRequest, Message, Role};
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Message content as clients send it: a plain string, a typed text block,
/// or a list of typed text blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Part(ContentPart),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    part_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    role: Option<Value>,
    content: Option<RawContent>,
}

/// Media type of a header value: parameters dropped, trimmed, lowercased.
pub(crate) fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Fail with `UnsupportedMediaType` when a Content-Type is present and is not JSON.
pub fn check_content_type(headers: &HeaderMap) -> Result<(), DispatchError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(());
    };
    let raw = String::from_utf8_lossy(value.as_bytes()).into_owned();
    if media_type(&raw) == "application/json" {
        Ok(())
    } else {
        Err(DispatchError::UnsupportedMediaType { content_type: raw })
    }
}

/// Validate headers and body of a chat request.
pub fn validate_request(headers: &HeaderMap, body: &[u8]) -> Result<ChatRequest, DispatchError> {
    check_content_type(headers)?;
    parse_body(body)
}

/// Parse and check a chat request body.
pub fn parse_body(body: &[u8]) -> Result<ChatRequest, DispatchError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| DispatchError::MalformedBody(format!("body is not valid JSON: {}", e)))?;
    let Value::Object(fields) = value else {
        return Err(DispatchError::MalformedBody(
            "body must be a JSON object".to_string(),
        ));
    };

    let model = match fields.get("model") {
        Some(Value::String(model)) if !model.trim().is_empty() => model.clone(),
        Some(_) => {
            return Err(DispatchError::MalformedBody(
                "'model' must be a non-empty string".to_string(),
            ))
        }
        None => {
            return Err(DispatchError::MalformedBody(
                "missing required field 'model'".to_string(),
            ))
        }
    };

    let raw_messages = match fields.get("messages") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(DispatchError::MalformedBody(
                "'messages' must be an array".to_string(),
            ))
        }
        None => {
            return Err(DispatchError::MalformedBody(
                "missing required field 'messages'".to_string(),
            ))
        }
    };

    let stream = match fields.get("stream") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(stream)) => *stream,
        Some(_) => {
            return Err(DispatchError::MalformedBody(
                "'stream' must be a boolean".to_string(),
            ))
        }
    };

    let messages = parse_messages(raw_messages)?;

    Ok(ChatRequest {
        model,
        messages,
        stream,
        temperature: optional_f32(&fields, "temperature")?,
        top_p: optional_f32(&fields, "top_p")?,
        max_tokens: match optional_u32(&fields, "max_tokens")? {
            Some(n) => Some(n),
            None => optional_u32(&fields, "max_completion_tokens")?,
        },
    })
}

fn parse_messages(items: &[Value]) -> Result<Vec<Message>, DispatchError> {
    if items.is_empty() {
        return Err(DispatchError::InvalidMessages(
            "'messages' must contain at least one message".to_string(),
        ));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_message(i, item))
        .collect()
}

fn parse_message(index: usize, item: &Value) -> Result<Message, DispatchError> {
    let invalid = |reason: &str| DispatchError::InvalidMessages(format!("messages[{}] {}", index, reason));

    let raw: RawMessage =
        serde_json::from_value(item.clone()).map_err(|_| invalid("is not a valid message object"))?;

    let role = match raw.role {
        Some(value) => serde_json::from_value::<Role>(value)
            .map_err(|_| invalid("has an unknown role (expected system, user or assistant)"))?,
        None => return Err(invalid("is missing 'role'")),
    };

    let content = match raw.content {
        Some(content) => flatten_content(content).ok_or_else(|| invalid("has non-text content"))?,
        None => return Err(invalid("is missing 'content'")),
    };
    if content.trim().is_empty() {
        return Err(invalid("has empty 'content'"));
    }

    Ok(Message { role, content })
}

fn flatten_content(content: RawContent) -> Option<String> {
    match content {
        RawContent::Text(text) => Some(text),
        RawContent::Part(part) => part_text(part),
        RawContent::Parts(parts) => parts
            .into_iter()
            .map(part_text)
            .collect::<Option<Vec<_>>>()
            .map(|texts| texts.concat()),
    }
}

fn part_text(part: ContentPart) -> Option<String> {
    if part.part_type == "text" {
        part.text
    } else {
        None
    }
}

fn optional_f32(fields: &Map<String, Value>, name: &str) -> Result<Option<f32>, DispatchError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64().map(|v| v as f32)),
        Some(_) => Err(DispatchError::MalformedBody(format!(
            "'{}' must be a number",
            name
        ))),
    }
}

fn optional_u32(fields: &Map<String, Value>, name: &str) -> Result<Option<u32>, DispatchError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                DispatchError::MalformedBody(format!("'{}' must be a positive integer", name))
            }),
        Some(_) => Err(DispatchError::MalformedBody(format!(
            "'{}' must be a positive integer",
            name
        ))),
    }
}
