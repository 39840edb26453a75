//! Retry classification for attempt outcomes.
//!
//! Only the nature of the failure is judged here; the attempt budget and
//! caller cancellation are the executor's concern.

use reqwest::StatusCode;

/// Returns true for `2xx` codes. Successful responses are never retried.
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Returns true when a non-success status is worth another attempt.
///
/// `429`, `503`, `504` and every other `5xx` are transient. Any other
/// non-`2xx` code, including unfollowed redirects, is terminal.
pub fn is_retryable_status(status: u16) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS.as_u16()
        || status == StatusCode::SERVICE_UNAVAILABLE.as_u16()
        || status == StatusCode::GATEWAY_TIMEOUT.as_u16()
        || status >= StatusCode::INTERNAL_SERVER_ERROR.as_u16()
}

/// Returns true when a transport failure is worth another attempt.
///
/// Connection, DNS, timeout and body failures are all transient. A request the
/// transport refused to build will fail identically every time.
pub fn is_retryable_transport(err: &reqwest::Error) -> bool {
    !err.is_builder()
}
