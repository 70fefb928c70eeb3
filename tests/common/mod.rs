//! Shared test utilities for chatwire integration tests.
//!
//! Router builders, request builders, SSE body readers and test-double
//! completion sources.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use chatwire::api::types::{ChatRequest, FinishReason};
use chatwire::api::{create_router, AppState};
use chatwire::config::{ChatwireConfig, SourceKind};
use chatwire::source::{
    build_source, CompletionFragment, CompletionSource, EchoSource, FragmentStream, SourceError,
};
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

// =============================================================================
// Well-Known Test Constants
// =============================================================================

pub const NATIVE_PATH: &str = "/v1/chat/completions";
pub const COMPAT_PATH: &str = "/compat/v1/chat/completions";
pub const BOTH_PATHS: [&str; 2] = [NATIVE_PATH, COMPAT_PATH];

pub const EVENT_STREAM: &str = "text/event-stream";

/// Payload shared by the acceptance scenarios, without `stream`.
pub const SCENARIO_PAYLOAD: &str = r#"{"model": "test-model", "messages": [{"role": "system", "content": "You are a helpful assistant."}, {"role": "user", "content": "Hello, how are you?"}]}"#;

/// Scenario payload with `"stream": true`.
pub const SCENARIO_STREAM_PAYLOAD: &str = r#"{"model": "test-model", "messages": [{"role": "system", "content": "You are a helpful assistant."}, {"role": "user", "content": "Hello, how are you?"}], "stream": true}"#;

// =============================================================================
// App Builders
// =============================================================================

/// Router backed by the echo source and default configuration.
pub fn make_app() -> Router {
    make_app_with_source(Arc::new(EchoSource::new()))
}

pub fn make_app_with_source(source: Arc<dyn CompletionSource>) -> Router {
    make_app_with(ChatwireConfig::default(), source)
}

pub fn make_app_with(config: ChatwireConfig, source: Arc<dyn CompletionSource>) -> Router {
    let state = Arc::new(AppState::new(Arc::new(config), source));
    create_router(state)
}

/// Router whose upstream source points at a wiremock server.
pub fn make_app_with_mock(mock_server: &MockServer) -> Router {
    let mut config = ChatwireConfig::default();
    config.completion.source = SourceKind::Upstream;
    config.completion.upstream_url = Some(mock_server.uri());
    let source = build_source(&config.completion).unwrap();
    make_app_with(config, source)
}

// =============================================================================
// Request Builders
// =============================================================================

/// POST a JSON body with an optional Accept header.
pub fn chat_request(uri: &str, body: &str, accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(accept) = accept {
        builder = builder.header("accept", accept);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Streaming request with `Accept: text/event-stream`.
pub fn stream_request(uri: &str, body: &str) -> Request<Body> {
    chat_request(uri, body, Some(EVENT_STREAM))
}

/// JSON body with one user message.
pub fn user_payload(text: &str, stream: bool) -> String {
    serde_json::json!({
        "model": "test-model",
        "messages": [{"role": "user", "content": text}],
        "stream": stream,
    })
    .to_string()
}

// =============================================================================
// Body Readers
// =============================================================================

/// Read body as string
pub async fn body_to_string(body: Body) -> String {
    let mut body_stream = body.into_data_stream();
    let mut result = String::new();
    while let Some(chunk) = body_stream.next().await {
        if let Ok(bytes) = chunk {
            result.push_str(&String::from_utf8_lossy(&bytes));
        }
    }
    result
}

pub async fn body_to_json(body: Body) -> Value {
    let text = body_to_string(body).await;
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("invalid JSON ({e}): {text}"))
}

/// Payloads of every `data:` line, in order.
pub fn sse_payloads(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

/// Parsed JSON events of a stream, excluding the `[DONE]` marker.
pub fn sse_events(body: &str) -> Vec<Value> {
    sse_payloads(body)
        .iter()
        .filter(|p| p.as_str() != "[DONE]")
        .map(|p| serde_json::from_str(p).unwrap_or_else(|e| panic!("bad event ({e}): {p}")))
        .collect()
}

/// Concatenated text of native or compat content events.
pub fn streamed_text(events: &[Value]) -> String {
    events
        .iter()
        .filter_map(|e| {
            e["completion_message"]["content"]["text"]
                .as_str()
                .or_else(|| e["choices"][0]["delta"]["content"].as_str())
        })
        .collect()
}

/// Assistant text of a native or compat buffered body.
pub fn buffered_text(body: &Value) -> String {
    body["completion_message"]["content"]["text"]
        .as_str()
        .or_else(|| body["choices"][0]["message"]["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

/// Sorted key paths of a JSON value, ignoring leaf values.
pub fn key_shape(value: &Value) -> Vec<String> {
    fn walk(value: &Value, prefix: String, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = format!("{prefix}.{key}");
                    out.push(path.clone());
                    walk(child, path, out);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    walk(child, format!("{prefix}[{i}]"), out);
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(value, String::new(), &mut out);
    out.sort();
    out
}

// =============================================================================
// Test-Double Sources
// =============================================================================

/// Streams a fixed script of fragments.
pub struct ScriptedSource(pub Vec<Result<CompletionFragment, SourceError>>);

#[async_trait]
impl CompletionSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, _request: ChatRequest) -> Result<FragmentStream, SourceError> {
        Ok(Box::pin(futures::stream::iter(self.0.clone())))
    }
}

/// Never produces anything.
pub struct SilentSource;

#[async_trait]
impl CompletionSource for SilentSource {
    fn name(&self) -> &str {
        "silent"
    }

    async fn stream(&self, _request: ChatRequest) -> Result<FragmentStream, SourceError> {
        Ok(Box::pin(futures::stream::pending()))
    }
}

/// Fails before producing anything.
pub struct FailingSource(pub SourceError);

#[async_trait]
impl CompletionSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn stream(&self, _request: ChatRequest) -> Result<FragmentStream, SourceError> {
        Err(self.0.clone())
    }
}

/// Emits numbered fragments forever, one per `interval`.
///
/// Counts pulled fragments and records when its stream is dropped.
pub struct EndlessSource {
    pub interval: Duration,
    pub pulled: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicBool>,
}

impl EndlessSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pulled: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompletionSource for EndlessSource {
    fn name(&self) -> &str {
        "endless"
    }

    async fn stream(&self, _request: ChatRequest) -> Result<FragmentStream, SourceError> {
        let interval = self.interval;
        let pulled = Arc::clone(&self.pulled);
        let flag = DropFlag(Arc::clone(&self.dropped));
        Ok(Box::pin(async_stream::stream! {
            let _flag = flag;
            let mut n = 0usize;
            loop {
                pulled.fetch_add(1, Ordering::SeqCst);
                yield Ok::<_, SourceError>(CompletionFragment::text(format!("t{n} ")));
                n += 1;
                tokio::time::sleep(interval).await;
            }
        }))
    }
}

/// Waits `delay` before a single terminal fragment.
pub struct DelayedSource {
    pub delay: Duration,
    pub text: &'static str,
}

#[async_trait]
impl CompletionSource for DelayedSource {
    fn name(&self) -> &str {
        "delayed"
    }

    async fn stream(&self, _request: ChatRequest) -> Result<FragmentStream, SourceError> {
        let delay = self.delay;
        let text = self.text;
        Ok(Box::pin(async_stream::stream! {
            tokio::time::sleep(delay).await;
            yield Ok::<_, SourceError>(CompletionFragment::terminal(text, FinishReason::Stop));
        }))
    }
}
