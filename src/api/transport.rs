//! Transport writer.
//!
//! Buffered answers are written once as JSON. Streaming answers return SSE
//! headers immediately and hand generation to a producer task connected to
//! the body by a channel of capacity 1, so the next fragment is pulled only
//! after the previous event was taken by the writer. When the client goes
//! away the body is dropped, the channel closes, and the producer drops the
//! source stream.

use super::encode::{SseEvent, StreamEncoder};
use super::error::DispatchError;
use super::types::{ChatRequest, FinishReason};
use crate::logging::outcome_status;
use crate::metrics::MetricsCollector;
use crate::source::{CompletionSource, SourceError};
use axum::{
    http::StatusCode,
    response::{sse::Sse, IntoResponse, Json, Response},
};
use futures::StreamExt;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

/// Write a buffered answer: HTTP 200 with one JSON body.
pub fn buffered_response(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// Everything the producer task needs besides the source and request.
pub struct StreamJob {
    pub request_id: String,
    pub encoder: StreamEncoder,
    pub first_fragment_timeout: Duration,
    pub metrics: Arc<MetricsCollector>,
    pub started: Instant,
    pub model: String,
}

/// Start a streaming answer.
///
/// Returns the SSE response right away; generation starts in a spawned task.
pub fn streaming_response(
    job: StreamJob,
    source: Arc<dyn CompletionSource>,
    request: ChatRequest,
) -> Response {
    let (tx, mut rx) = mpsc::channel::<SseEvent>(1);

    let span = tracing::info_span!(
        "stream",
        request_id = %job.request_id,
        schema = job.encoder.schema().label()
    );
    tokio::spawn(run_stream(job, source, request, tx).instrument(span));

    let body = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<_, Infallible>(event.to_event());
        }
    };

    Sse::new(body).into_response()
}

/// Drive one stream to its end and write the closing events.
async fn run_stream(
    mut job: StreamJob,
    source: Arc<dyn CompletionSource>,
    request: ChatRequest,
    tx: mpsc::Sender<SseEvent>,
) {
    let schema = job.encoder.schema().label();
    let outcome = pump_fragments(&mut job, source, request, &tx).await;

    let closing = match &outcome {
        Ok(reason) => Some(job.encoder.finish(*reason)),
        Err(DispatchError::ClientDisconnected) => None,
        Err(e) => {
            warn!(error = %e, code = e.code(), "Completion failed mid-stream");
            job.metrics.record_error(schema, e.code());
            Some(job.encoder.error(&e.to_api_error()))
        }
    };

    let delivered = match closing {
        Some(event) => tx.send(event).await.is_ok() && tx.send(SseEvent::Done).await.is_ok(),
        None => false,
    };

    let status = stream_status(&outcome, delivered);
    if delivered {
        info!(
            status,
            finish_reason = outcome.as_ref().map(FinishReason::as_str).unwrap_or("error"),
            duration_ms = job.started.elapsed().as_millis() as u64,
            "Stream completed"
        );
    } else {
        warn!(
            status,
            duration_ms = job.started.elapsed().as_millis() as u64,
            "Client disconnected, generation cancelled"
        );
        job.metrics.record_disconnect(schema);
    }

    job.metrics.record_request(
        schema,
        "streaming",
        StatusCode::OK.as_u16(),
        &job.model,
        job.started.elapsed(),
    );
}

/// Log status of a finished stream; an undelivered close counts as a disconnect.
fn stream_status(outcome: &Result<FinishReason, DispatchError>, delivered: bool) -> &'static str {
    if delivered {
        outcome_status(outcome.as_ref().err())
    } else {
        outcome_status(Some(&DispatchError::ClientDisconnected))
    }
}

/// Pull fragments from the source and forward their events.
///
/// Returns the finish reason once a terminal fragment was sent or the source
/// ran dry. Returning drops the fragment stream, which cancels generation.
async fn pump_fragments(
    job: &mut StreamJob,
    source: Arc<dyn CompletionSource>,
    request: ChatRequest,
    tx: &mpsc::Sender<SseEvent>,
) -> Result<FinishReason, DispatchError> {
    let first_timeout = job.first_fragment_timeout;
    let opening = async move {
        let mut fragments = source.generate(request).await?.into_fragments();
        let first = fragments.next().await;
        Ok::<_, SourceError>((fragments, first))
    };

    let (mut fragments, mut next) = tokio::select! {
        _ = tx.closed() => return Err(DispatchError::ClientDisconnected),
        opened = tokio::time::timeout(first_timeout, opening) => match opened {
            Err(_) => {
                return Err(DispatchError::CompletionTimeout {
                    waited_ms: first_timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(opened)) => opened,
        },
    };

    let schema = job.encoder.schema().label();
    loop {
        let fragment = match next {
            None => {
                debug!("Source ended without a finish reason");
                return Ok(FinishReason::Stop);
            }
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(fragment)) => fragment,
        };

        if let Some(event) = job.encoder.fragment(&fragment) {
            if tx.send(event).await.is_err() {
                return Err(DispatchError::ClientDisconnected);
            }
            job.metrics.record_fragment(schema);
        }

        if let Some(reason) = fragment.finish_reason {
            return Ok(reason);
        }

        next = tokio::select! {
            _ = tx.closed() => return Err(DispatchError::ClientDisconnected),
            item = fragments.next() => item,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::encode::ResponseSchema;
    use crate::api::types::{Message, Role};
    use crate::metrics::PrometheusBuilder;
    use crate::source::{CompletionFragment, FragmentStream};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            messages: vec![Message::new(Role::User, "hi")],
            stream: true,
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }

    fn job(schema: ResponseSchema, first_fragment_timeout: Duration) -> StreamJob {
        StreamJob {
            request_id: "req-1".to_string(),
            encoder: StreamEncoder::new(schema, "m"),
            first_fragment_timeout,
            metrics: Arc::new(MetricsCollector::new(
                Instant::now(),
                PrometheusBuilder::new().build_recorder().handle(),
            )),
            started: Instant::now(),
            model: "m".to_string(),
        }
    }

    struct Scripted(Vec<Result<CompletionFragment, SourceError>>);

    #[async_trait]
    impl CompletionSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(&self, _request: ChatRequest) -> Result<FragmentStream, SourceError> {
            Ok(Box::pin(stream::iter(self.0.clone())))
        }
    }

    /// Yields one fragment, then hangs; flags when its stream is dropped.
    struct Hanging(Arc<AtomicBool>);

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CompletionSource for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn stream(&self, _request: ChatRequest) -> Result<FragmentStream, SourceError> {
            let flag = DropFlag(Arc::clone(&self.0));
            Ok(Box::pin(async_stream::stream! {
                let _flag = flag;
                yield Ok::<_, SourceError>(CompletionFragment::text("first"));
                futures::future::pending::<()>().await;
            }))
        }
    }

    async fn drain(
        schema: ResponseSchema,
        source: Arc<dyn CompletionSource>,
        timeout: Duration,
    ) -> Vec<SseEvent> {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_stream(job(schema, timeout), source, request(), tx));
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        handle.await.unwrap();
        events
    }

    #[tokio::test]
    async fn test_terminal_fragment_stops_pulling() {
        let source = Arc::new(Scripted(vec![
            Ok(CompletionFragment::text("a")),
            Ok(CompletionFragment::terminal("b", FinishReason::Length)),
            Ok(CompletionFragment::text("never")),
        ]));
        let events = drain(ResponseSchema::Native, source, Duration::from_secs(1)).await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[3], SseEvent::Done);
        let SseEvent::Data(finish) = &events[2] else {
            panic!("expected finish event");
        };
        assert_eq!(finish["completion_message"]["stop_reason"], "length");
        assert!(!events.iter().any(|e| e.payload().contains("never")));
    }

    #[tokio::test]
    async fn test_source_without_terminal_finishes_with_stop() {
        let source = Arc::new(Scripted(vec![
            Ok(CompletionFragment::text("a")),
            Ok(CompletionFragment::text("")),
        ]));
        let events = drain(ResponseSchema::Compat, source, Duration::from_secs(1)).await;

        assert_eq!(events.len(), 3);
        let SseEvent::Data(finish) = &events[1] else {
            panic!("expected finish event");
        };
        assert_eq!(finish["choices"][0]["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_sends_error_then_done() {
        let source = Arc::new(Scripted(vec![
            Ok(CompletionFragment::text("partial")),
            Err(SourceError::Network("reset".to_string())),
        ]));
        let events = drain(ResponseSchema::Native, source, Duration::from_secs(1)).await;

        assert_eq!(events.len(), 3);
        let SseEvent::Data(error) = &events[1] else {
            panic!("expected error event");
        };
        assert_eq!(error["error"]["code"], "completion_failure");
        assert_eq!(events[2], SseEvent::Done);
    }

    #[tokio::test]
    async fn test_first_fragment_timeout() {
        struct Silent;
        #[async_trait]
        impl CompletionSource for Silent {
            fn name(&self) -> &str {
                "silent"
            }
            async fn stream(&self, _r: ChatRequest) -> Result<FragmentStream, SourceError> {
                Ok(Box::pin(stream::pending()))
            }
        }
        let events = drain(
            ResponseSchema::Compat,
            Arc::new(Silent),
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(events.len(), 2);
        let SseEvent::Data(error) = &events[0] else {
            panic!("expected error event");
        };
        assert_eq!(error["error"]["code"], "completion_timeout");
        assert_eq!(events[1], SseEvent::Done);
    }

    #[tokio::test]
    async fn test_disconnect_drops_source_stream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = Arc::new(Hanging(Arc::clone(&dropped)));
        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_stream(
            job(ResponseSchema::Native, Duration::from_secs(1)),
            source,
            request(),
            tx,
        ));

        assert!(rx.recv().await.is_some());
        drop(rx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("producer should stop after disconnect")
            .unwrap();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stream_status_labels() {
        assert_eq!(stream_status(&Ok(FinishReason::Stop), true), "success");
        let failed = Err(DispatchError::CompletionTimeout { waited_ms: 10 });
        assert_eq!(stream_status(&failed, true), "error");
        assert_eq!(stream_status(&Ok(FinishReason::Stop), false), "disconnected");
        assert_eq!(stream_status(&failed, false), "disconnected");
    }
}
