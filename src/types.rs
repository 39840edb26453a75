use std::fmt;
use std::time::Duration;

use reqwest::Method;

/// One send-and-read cycle, as reported to observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptRecord {
    pub method: Method,
    pub url: String,
    /// Zero-based attempt index within the call.
    pub attempt: usize,
    pub elapsed: Duration,
    /// Status of the received response, if any.
    pub status: Option<u16>,
    /// Failure description, if the attempt failed.
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives one record per attempt. Must not block.
pub trait AttemptObserver: Send + Sync + fmt::Debug {
    fn observe(&self, record: &AttemptRecord);
}
