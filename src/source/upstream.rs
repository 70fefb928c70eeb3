//! OpenAI-compatible upstream source.
//!
//! Forwards the validated request to `{base_url}/v1/chat/completions` and
//! translates the answer into fragments or a result. Streaming answers are
//! read as SSE and split into lines as bytes arrive.

use super::{
    CompletionFragment, CompletionResult, CompletionSource, FragmentStream, SourceError,
};
use crate::api::types::{ChatRequest, FinishReason, Usage};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub struct UpstreamSource {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    idle_timeout: Duration,
    client: Client,
}

impl UpstreamSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| SourceError::Failure(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            idle_timeout: timeout,
            client,
        })
    }

    /// Bound the gap between two reads of a streamed body.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn map_send_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout.as_millis() as u64)
        } else {
            SourceError::Network(e.to_string())
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, SourceError> {
        let mut req = self.client.post(self.endpoint()).json(request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        // Streams must outlive the request deadline; each read is bounded by
        // the idle timeout instead.
        if !request.stream {
            req = req.timeout(self.timeout);
        }

        let response = req.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SourceError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

/// Non-streaming upstream answer.
#[derive(Deserialize)]
struct UpstreamResponse {
    choices: Vec<UpstreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct UpstreamChoice {
    message: UpstreamMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One upstream streaming chunk.
#[derive(Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    choices: Vec<UpstreamChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct UpstreamChunkChoice {
    #[serde(default)]
    delta: UpstreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct UpstreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Accumulates raw body bytes and hands out complete lines.
///
/// Lines are decoded only once their terminating `\n` has arrived, so a
/// multi-byte character split across network chunks stays intact.
#[derive(Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn remainder(&mut self) -> String {
        let rest = std::mem::take(&mut self.bytes);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// What one SSE line from upstream means.
#[derive(Debug, PartialEq)]
enum SseLine {
    Fragment(CompletionFragment),
    Done,
    Skip,
}

/// Interpret one line of an upstream SSE body.
fn parse_sse_line(line: &str) -> Result<SseLine, SourceError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments and non-data fields carry no text.
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: UpstreamChunk = serde_json::from_str(data)
        .map_err(|e| SourceError::InvalidResponse(format!("Invalid stream chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(SourceError::Upstream {
            status: 200,
            message: error.to_string(),
        });
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseLine::Skip);
    };
    let text = choice.delta.content.unwrap_or_default();
    match choice.finish_reason.as_deref() {
        Some(reason) => Ok(SseLine::Fragment(CompletionFragment::terminal(
            text,
            FinishReason::from_upstream(reason),
        ))),
        None if text.is_empty() => Ok(SseLine::Skip),
        None => Ok(SseLine::Fragment(CompletionFragment::text(text))),
    }
}

#[async_trait]
impl CompletionSource for UpstreamSource {
    fn name(&self) -> &str {
        "upstream"
    }

    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, SourceError> {
        let mut request = request;
        request.stream = true;
        let response = self.send(&request).await?;
        let mut byte_stream = response.bytes_stream();

        let idle_timeout = self.idle_timeout;

        let stream = async_stream::stream! {
            let mut lines = LineBuffer::default();

            loop {
                let read = tokio::time::timeout(idle_timeout, byte_stream.next()).await;
                let chunk_result = match read {
                    Ok(Some(chunk_result)) => chunk_result,
                    Ok(None) => break,
                    Err(_) => {
                        warn!(idle_ms = idle_timeout.as_millis() as u64, "Upstream stream stalled");
                        yield Err::<CompletionFragment, _>(SourceError::Timeout(
                            idle_timeout.as_millis() as u64,
                        ));
                        return;
                    }
                };
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "Upstream stream read error");
                        yield Err(SourceError::Network(e.to_string()));
                        return;
                    }
                };
                lines.extend(&bytes);

                while let Some(line) = lines.next_line() {
                    match parse_sse_line(&line) {
                        Ok(SseLine::Fragment(fragment)) => {
                            let terminal = fragment.is_terminal();
                            yield Ok(fragment);
                            if terminal {
                                return;
                            }
                        }
                        Ok(SseLine::Done) => return,
                        Ok(SseLine::Skip) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            // Upstream closed without [DONE]; flush a final unterminated line.
            let rest = lines.remainder();
            if !rest.trim().is_empty() {
                match parse_sse_line(&rest) {
                    Ok(SseLine::Fragment(fragment)) => yield Ok(fragment),
                    Ok(_) => {}
                    Err(e) => yield Err(e),
                }
            }
            debug!("Upstream stream ended");
        };

        Ok(Box::pin(stream))
    }

    async fn complete(&self, request: ChatRequest) -> Result<CompletionResult, SourceError> {
        let mut request = request;
        request.stream = false;
        let response = self.send(&request).await?;

        let body: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(format!("Invalid upstream response: {}", e)))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::InvalidResponse("Upstream returned no choices".to_string()))?;

        Ok(CompletionResult {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_upstream)
                .unwrap_or_default(),
            usage: body.usage,
        })
    }
}
