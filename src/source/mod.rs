//! Completion sources.
//!
//! A [`CompletionSource`] produces the text of a chat completion, either as a
//! lazy stream of [`CompletionFragment`]s or as one [`CompletionResult`]. The
//! dispatcher owns framing, negotiation and transport; sources only generate.

use crate::api::types::{ChatRequest, FinishReason, Usage};
use crate::config::{CompletionConfig, SourceKind};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use thiserror::Error;

pub mod echo;
pub mod upstream;

pub use echo::EchoSource;
pub use upstream::UpstreamSource;

/// One incremental unit of generated text.
///
/// A fragment carrying a `finish_reason` is terminal: nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionFragment {
    pub text: String,
    pub finish_reason: Option<FinishReason>,
}

impl CompletionFragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
        }
    }

    pub fn terminal(text: impl Into<String>, reason: FinishReason) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some(reason),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// A fully materialized completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

/// Lazily produced fragments of one completion.
pub type FragmentStream = BoxStream<'static, Result<CompletionFragment, SourceError>>;

/// What a source hands back for a request.
pub enum Generation {
    Fragments(FragmentStream),
    Complete(CompletionResult),
}

impl Generation {
    /// View the generation as a fragment stream; a complete result becomes one terminal fragment.
    pub fn into_fragments(self) -> FragmentStream {
        match self {
            Generation::Fragments(fragments) => fragments,
            Generation::Complete(result) => Box::pin(stream::once(async move {
                Ok(CompletionFragment::terminal(
                    result.content,
                    result.finish_reason,
                ))
            })),
        }
    }

    /// Materialize the generation, collapsing fragments when needed.
    pub async fn into_result(self) -> Result<CompletionResult, SourceError> {
        match self {
            Generation::Complete(result) => Ok(result),
            Generation::Fragments(fragments) => collect_fragments(fragments).await,
        }
    }
}

/// Errors that can occur while generating a completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Generation exceeded its deadline.
    #[error("Completion timed out after {0}ms")]
    Timeout(u64),

    /// Connectivity failure reaching the generator.
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream generator answered with an error status.
    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Upstream answer did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other generation failure.
    #[error("{0}")]
    Failure(String),
}

/// Capability the dispatcher consumes to answer chat requests.
///
/// Implementations must be cancellation-safe: dropping a fragment stream stops
/// generation and releases whatever the stream holds.
#[async_trait]
pub trait CompletionSource: Send + Sync + 'static {
    /// Short name for logs and the health endpoint.
    fn name(&self) -> &str;

    /// Start generating and return the fragments lazily.
    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, SourceError>;

    /// Produce the whole completion.
    ///
    /// The default collapses [`stream`](Self::stream); override when the
    /// generator has a cheaper non-streaming path.
    async fn complete(&self, request: ChatRequest) -> Result<CompletionResult, SourceError> {
        let fragments = self.stream(request).await?;
        collect_fragments(fragments).await
    }

    /// Stream or complete, following the request's `stream` flag.
    async fn generate(&self, request: ChatRequest) -> Result<Generation, SourceError> {
        if request.stream {
            Ok(Generation::Fragments(self.stream(request).await?))
        } else {
            Ok(Generation::Complete(self.complete(request).await?))
        }
    }
}

/// Concatenate fragments up to and including the first terminal one.
pub async fn collect_fragments(
    mut fragments: FragmentStream,
) -> Result<CompletionResult, SourceError> {
    let mut content = String::new();
    let mut finish_reason = None;

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        content.push_str(&fragment.text);
        if let Some(reason) = fragment.finish_reason {
            finish_reason = Some(reason);
            break;
        }
    }

    Ok(CompletionResult {
        content,
        finish_reason: finish_reason.unwrap_or_default(),
        usage: None,
    })
}

/// Rough token count (4 bytes per token, rounded up).
pub fn estimate_tokens(text: &str) -> u32 {
    text.len().div_ceil(4) as u32
}

/// Build the configured completion source.
pub fn build_source(config: &CompletionConfig) -> Result<Arc<dyn CompletionSource>, SourceError> {
    match config.source {
        SourceKind::Echo => Ok(Arc::new(
            EchoSource::new().with_delay(config.fragment_delay()),
        )),
        SourceKind::Upstream => {
            let url = config
                .upstream_url
                .clone()
                .ok_or_else(|| SourceError::Failure("upstream_url is not set".to_string()))?;
            let api_key = config
                .api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok());
            let source = UpstreamSource::new(url, api_key, config.result_timeout())?
                .with_idle_timeout(config.fragment_idle_timeout());
            Ok(Arc::new(source))
        }
    }
}
