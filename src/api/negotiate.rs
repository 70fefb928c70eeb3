//! Response mode negotiation.
//!
//! `stream` is the only thing that can turn streaming on. An
//! `Accept: text/event-stream` header confirms the client can read SSE; it is
//! required when `stream` is true and ignored otherwise.
//!
//! | stream | Accept has `text/event-stream` | Outcome                         |
//! |--------|--------------------------------|---------------------------------|
//! | true   | yes                            | `Streaming`                     |
//! | true   | no                             | `Rejected(MissingStreamingAccept)` |
//! | false  | yes                            | `Buffered`                      |
//! | false  | no                             | `Buffered`                      |
//!
//! A range weighted `q=0` declines the type and confirms nothing.

use super::error::DispatchError;
use super::validate::media_type;
use axum::http::{header::ACCEPT, HeaderMap};

/// Media type that confirms a client can consume an SSE stream.
pub const EVENT_STREAM: &str = "text/event-stream";

/// How a request will be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    Streaming,
    Buffered,
    Rejected(DispatchError),
}

impl NegotiationOutcome {
    /// Label used in logs and metrics.
    pub fn mode(&self) -> &'static str {
        match self {
            NegotiationOutcome::Streaming => "streaming",
            NegotiationOutcome::Buffered => "buffered",
            NegotiationOutcome::Rejected(_) => "rejected",
        }
    }
}

/// True when any media range in an Accept value is exactly `text/event-stream`
/// with a non-zero weight.
///
/// Wildcards such as `*/*` or `text/*` do not count as confirmation.
pub fn accepts_event_stream(accept: &str) -> bool {
    accept
        .split(',')
        .any(|range| media_type(range) == EVENT_STREAM && !is_refused(range))
}

/// True when a media range carries `q=0`.
fn is_refused(range: &str) -> bool {
    range.split(';').skip(1).any(|param| {
        let Some((name, value)) = param.split_once('=') else {
            return false;
        };
        name.trim().eq_ignore_ascii_case("q")
            && value.trim().parse::<f32>().is_ok_and(|q| q == 0.0)
    })
}

/// Decide the response mode from the `stream` flag and the Accept header.
pub fn negotiate(stream: bool, accept: Option<&str>) -> NegotiationOutcome {
    let confirmed = accept.is_some_and(accepts_event_stream);
    match (stream, confirmed) {
        (true, true) => NegotiationOutcome::Streaming,
        (true, false) => NegotiationOutcome::Rejected(DispatchError::MissingStreamingAccept),
        (false, _) => NegotiationOutcome::Buffered,
    }
}

/// Accept header of a request, joined when it appears more than once.
pub fn accept_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<String> = headers
        .get_all(ACCEPT)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}
