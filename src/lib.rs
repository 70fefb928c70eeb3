//! chatwire - chat completions with negotiated JSON or SSE responses
//!
//! One dispatcher serves a native surface and an OpenAI-compatible surface.
//! Requests are validated, negotiated against their `Accept` header, and
//! answered by a pluggable completion source either as one JSON body or as a
//! server-sent event stream.

pub mod api;
pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod source;
