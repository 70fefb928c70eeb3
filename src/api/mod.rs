//! # Chat API
//!
//! Two chat-completion surfaces served by one dispatcher.
//!
//! ## Endpoints
//!
//! - `POST /v1/chat/completions` - Native schema (`completion_message` objects)
//! - `POST /compat/v1/chat/completions` - OpenAI-compatible schema
//! - `GET /health` - Liveness, uptime and the active completion source
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Example
//!
//! ```no_run
//! use chatwire::api::{create_router, AppState};
//! use chatwire::config::ChatwireConfig;
//! use chatwire::source::EchoSource;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(ChatwireConfig::default());
//! let state = Arc::new(AppState::new(config, Arc::new(EchoSource::new())));
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Request flow
//!
//! 1. Optional bearer check (`server.require_auth`)
//! 2. Validation of content type and body into a `ChatRequest`
//! 3. Negotiation of `stream` against `Accept`
//! 4. Generation through the configured `CompletionSource`
//! 5. Encoding in the route's schema, written buffered or as SSE
//!
//! ## Error Handling
//!
//! Both endpoints answer errors with the same envelope:
//! ```json
//! {
//!   "error": {
//!     "message": "stream=true requires an 'Accept: text/event-stream' header",
//!     "type": "invalid_request_error",
//!     "param": "stream",
//!     "code": "missing_streaming_accept"
//!   }
//! }
//! ```

mod auth;
mod completions;
pub mod encode;
pub mod error;
mod health;
pub mod negotiate;
pub mod transport;
pub mod types;
pub mod validate;

pub use auth::bearer_token;
pub use encode::ResponseSchema;
pub use types::*;

use crate::config::ChatwireConfig;
use crate::metrics::MetricsCollector;
use crate::source::CompletionSource;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Maximum request body size (10 MB).
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: Arc<ChatwireConfig>,
    pub source: Arc<dyn CompletionSource>,
    /// Server startup time for uptime tracking
    pub start_time: Instant,
    /// Metrics collector for observability
    pub metrics_collector: Arc<MetricsCollector>,
}

impl AppState {
    pub fn new(config: Arc<ChatwireConfig>, source: Arc<dyn CompletionSource>) -> Self {
        let start_time = Instant::now();
        let prometheus_handle = crate::metrics::setup_metrics_or_detached();

        Self {
            config,
            source,
            start_time,
            metrics_collector: Arc::new(MetricsCollector::new(start_time, prometheus_handle)),
        }
    }
}

/// Create the main API router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let chat = Router::new()
        .route(
            "/v1/chat/completions",
            post(completions::handle).layer(Extension(ResponseSchema::Native)),
        )
        .route(
            "/compat/v1/chat/completions",
            post(completions::handle).layer(Extension(ResponseSchema::Compat)),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_bearer,
        ));

    Router::new()
        .merge(chat)
        .route("/health", get(health::handle))
        .route("/metrics", get(crate::metrics::handler::metrics_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
