//! Chat completions dispatcher shared by both surfaces.

use super::encode::{ResponseSchema, StreamEncoder};
use super::error::DispatchError;
use super::negotiate::{accept_header, negotiate, NegotiationOutcome};
use super::transport::{buffered_response, streaming_response, StreamJob};
use super::types::ChatRequest;
use super::validate::validate_request;
use super::AppState;
use crate::logging::{generate_request_id, outcome_status, truncate_prompt};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// POST /v1/chat/completions and /compat/v1/chat/completions.
///
/// The route's [`ResponseSchema`] arrives as an extension; everything else is
/// identical between the two endpoints.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    Extension(schema): Extension<ResponseSchema>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start_time = Instant::now();
    let request_id = generate_request_id();

    let request = match validate_request(&headers, &body) {
        Ok(request) => request,
        Err(e) => return reject(&state, schema, &request_id, "", start_time, e),
    };

    let accept = accept_header(&headers);
    let outcome = negotiate(request.stream, accept.as_deref());
    let prompt = truncate_prompt(&request, state.config.logging.enable_content_logging);

    info!(
        request_id = %request_id,
        model = %request.model,
        schema = schema.label(),
        mode = outcome.mode(),
        messages = request.messages.len(),
        prompt = prompt.as_deref(),
        "Chat completion request"
    );

    match outcome {
        NegotiationOutcome::Rejected(e) => {
            reject(&state, schema, &request_id, &request.model, start_time, e)
        }
        NegotiationOutcome::Streaming => {
            let job = StreamJob {
                request_id,
                encoder: StreamEncoder::new(schema, request.model.clone()),
                first_fragment_timeout: state.config.completion.first_fragment_timeout(),
                metrics: Arc::clone(&state.metrics_collector),
                started: start_time,
                model: request.model.clone(),
            };
            streaming_response(job, Arc::clone(&state.source), request)
        }
        NegotiationOutcome::Buffered => {
            let model = request.model.clone();
            match buffered(&state, schema, request).await {
                Ok(response) => {
                    info!(
                        request_id = %request_id,
                        status = outcome_status(None),
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Buffered completion sent"
                    );
                    state.metrics_collector.record_request(
                        schema.label(),
                        "buffered",
                        response.status().as_u16(),
                        &model,
                        start_time.elapsed(),
                    );
                    response
                }
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        status = outcome_status(Some(&e)),
                        error = %e,
                        code = e.code(),
                        "Completion failed"
                    );
                    fail(&state, schema, &model, "buffered", start_time, e)
                }
            }
        }
    }
}

/// Generate the whole completion within the result deadline and encode it.
async fn buffered(
    state: &AppState,
    schema: ResponseSchema,
    request: ChatRequest,
) -> Result<Response, DispatchError> {
    let encoder = StreamEncoder::new(schema, request.model.clone());
    let result_timeout = state.config.completion.result_timeout();
    let source = Arc::clone(&state.source);

    let result = tokio::time::timeout(result_timeout, async move {
        source.generate(request).await?.into_result().await
    })
    .await
    .map_err(|_| DispatchError::CompletionTimeout {
        waited_ms: result_timeout.as_millis() as u64,
    })??;

    Ok(buffered_response(encoder.buffered(&result)))
}

/// Answer a validation or negotiation failure before any byte was written.
fn reject(
    state: &AppState,
    schema: ResponseSchema,
    request_id: &str,
    model: &str,
    start_time: Instant,
    e: DispatchError,
) -> Response {
    info!(
        request_id = %request_id,
        schema = schema.label(),
        status = outcome_status(Some(&e)),
        code = e.code(),
        "Request rejected: {}",
        e
    );
    fail(state, schema, model, "rejected", start_time, e)
}

fn fail(
    state: &AppState,
    schema: ResponseSchema,
    model: &str,
    mode: &'static str,
    start_time: Instant,
    e: DispatchError,
) -> Response {
    state.metrics_collector.record_error(schema.label(), e.code());
    let response = e.to_api_error().into_response();
    state.metrics_collector.record_request(
        schema.label(),
        mode,
        response.status().as_u16(),
        model,
        start_time.elapsed(),
    );
    response
}
