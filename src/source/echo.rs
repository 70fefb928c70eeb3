//! Deterministic echo source.
//!
//! Replies `"You said: <last user message>"`, one word per fragment. Streaming
//! and buffered answers for the same request are always identical, which
//! makes the source useful for smoke tests of both response modes.

use super::{
    estimate_tokens, CompletionFragment, CompletionResult, CompletionSource, FragmentStream,
    SourceError,
};
use crate::api::types::{ChatRequest, FinishReason, Usage};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct EchoSource {
    delay: Duration,
}

impl EchoSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause before each fragment after the first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Words of the reply (trailing whitespace kept) and why it ends.
    ///
    /// `max_tokens` caps the number of words; hitting the cap ends with `length`.
    fn plan(request: &ChatRequest) -> (Vec<String>, FinishReason) {
        let reply = format!(
            "You said: {}",
            request.last_user_message().unwrap_or("nothing")
        );
        let mut words: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();

        match request.max_tokens.map(|n| n as usize) {
            Some(limit) if limit < words.len() => {
                words.truncate(limit);
                (words, FinishReason::Length)
            }
            _ => (words, FinishReason::Stop),
        }
    }
}

#[async_trait]
impl CompletionSource for EchoSource {
    fn name(&self) -> &str {
        "echo"
    }

    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, SourceError> {
        let (words, finish_reason) = Self::plan(&request);
        let delay = self.delay;
        let last = words.len().saturating_sub(1);

        let stream = async_stream::stream! {
            if words.is_empty() {
                yield Ok::<_, SourceError>(CompletionFragment::terminal("", finish_reason));
                return;
            }
            for (i, word) in words.into_iter().enumerate() {
                if i > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if i == last {
                    yield Ok::<_, SourceError>(CompletionFragment::terminal(word, finish_reason));
                } else {
                    yield Ok::<_, SourceError>(CompletionFragment::text(word));
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete(&self, request: ChatRequest) -> Result<CompletionResult, SourceError> {
        let (words, finish_reason) = Self::plan(&request);
        let content = words.concat();

        let prompt_tokens = request
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum();
        let usage = Usage::new(prompt_tokens, estimate_tokens(&content));

        Ok(CompletionResult {
            content,
            finish_reason,
            usage: Some(usage),
        })
    }
}
