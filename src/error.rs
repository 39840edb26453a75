use crate::classify;

/// Where a failed attempt broke down.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureOrigin {
    /// The request never produced a response (connect, DNS, timeout, reset).
    Transport,
    /// A response arrived but its body could not be read in full.
    Decode,
    /// The upstream answered with a non-success status code.
    Status,
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error on attempt {attempt} to {url}: {source}")]
    Transport {
        /// Zero-based index of the failing attempt.
        attempt: usize,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Response body could not be read to completion.
    #[error("reading response from {url} on attempt {attempt}: {source}")]
    Decode {
        attempt: usize,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        /// Upstream body, verbatim.
        body: String,
    },
    /// Every permitted attempt failed with a retryable failure.
    #[error("request failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<UpstreamError>,
    },
    /// The caller cancelled the call.
    #[error("request to {url} cancelled during attempt {attempt}")]
    Cancelled { attempt: usize, url: String },
    /// The caller's deadline elapsed.
    #[error("deadline exceeded for {url} during attempt {attempt}")]
    DeadlineExceeded { attempt: usize, url: String },
    /// The request could not be assembled (payload encoding, URL, headers).
    #[error("invalid request: {0}")]
    Request(String),
}

impl UpstreamError {
    /// Status code of the last upstream response, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self.last() {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body of the last upstream response, if the failure came from one.
    pub fn body(&self) -> Option<&str> {
        match self.last() {
            Self::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Origin of the last observed attempt failure.
    ///
    /// `None` for cancellation and request-construction errors, which are not
    /// attempt outcomes.
    pub fn origin(&self) -> Option<FailureOrigin> {
        match self.last() {
            Self::Transport { .. } => Some(FailureOrigin::Transport),
            Self::Decode { .. } => Some(FailureOrigin::Decode),
            Self::Http { .. } => Some(FailureOrigin::Status),
            _ => None,
        }
    }

    /// Whether another attempt could succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => classify::is_retryable_transport(source),
            Self::Decode { .. } => true,
            Self::Http { status, .. } => classify::is_retryable_status(*status),
            Self::Exhausted { .. }
            | Self::Cancelled { .. }
            | Self::DeadlineExceeded { .. }
            | Self::Request(_) => false,
        }
    }

    /// True for caller cancellation and caller deadline expiry.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }

    /// The last attempt failure; `self` unless this is an exhaustion error.
    pub fn last(&self) -> &UpstreamError {
        match self {
            Self::Exhausted { last, .. } => last.last(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FailureOrigin, UpstreamError};

    fn http(status: u16, body: &str) -> UpstreamError {
        UpstreamError::Http {
            status,
            url: "http://backend/items".to_owned(),
            body: body.to_owned(),
        }
    }

    #[test]
    fn accessors_look_through_exhaustion() {
        let err = UpstreamError::Exhausted {
            attempts: 3,
            last: Box::new(http(503, "{\"error\":\"busy\"}")),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.body(), Some("{\"error\":\"busy\"}"));
        assert_eq!(err.origin(), Some(FailureOrigin::Status));
        assert!(!err.is_retryable());
    }

    #[test]
    fn exhaustion_chains_to_last_failure() {
        use std::error::Error as _;

        let err = UpstreamError::Exhausted {
            attempts: 3,
            last: Box::new(http(503, "busy")),
        };
        let cause = err.source().expect("exhaustion must expose its cause");
        let inner = cause
            .downcast_ref::<UpstreamError>()
            .expect("cause must be the last attempt's error");
        assert_eq!(inner.status(), Some(503));
        assert_eq!(
            cause.to_string(),
            "http error 503 from http://backend/items: busy"
        );
        assert!(cause.source().is_none());
    }

    #[test]
    fn http_retryability_follows_status() {
        assert!(http(503, "").is_retryable());
        assert!(http(429, "").is_retryable());
        assert!(!http(404, "").is_retryable());
        assert!(!http(400, "").is_retryable());
    }

    #[test]
    fn cancellation_is_terminal() {
        let cancelled = UpstreamError::Cancelled {
            attempt: 1,
            url: "http://backend".to_owned(),
        };
        let deadline = UpstreamError::DeadlineExceeded {
            attempt: 0,
            url: "http://backend".to_owned(),
        };
        assert!(cancelled.is_cancelled() && !cancelled.is_retryable());
        assert!(deadline.is_cancelled() && !deadline.is_retryable());
        assert_eq!(cancelled.origin(), None);
        assert_eq!(cancelled.status(), None);
    }

    #[test]
    fn display_keeps_body_verbatim() {
        let err = http(404, "no such user: kit");
        assert_eq!(
            err.to_string(),
            "http error 404 from http://backend/items: no such user: kit"
        );
    }
}
