//! Correlation ids for request logs.

use uuid::Uuid;

const PREFIX: &str = "req_";

/// Fresh id for one chat request.
///
/// The id ties together the request, rejection and stream-completion log
/// lines of one request. It never appears in response bodies, whose ids are
/// minted by the encoder.
///
/// ```
/// use chatwire::logging::generate_request_id;
///
/// let id = generate_request_id();
/// assert!(id.starts_with("req_"));
/// assert_eq!(id.len(), 36);
/// ```
pub fn generate_request_id() -> String {
    format!("{PREFIX}{}", Uuid::new_v4().simple())
}
