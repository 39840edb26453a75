//! The attempt loop shared by every outbound call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{Method, Request};

use crate::{
    backoff::{Backoff, Jitter, RandomJitter},
    classify,
    context::{CallContext, Interrupt},
    AttemptObserver, AttemptRecord, Result, RetryPolicy, UpstreamError,
};

/// Where a call stands between attempts.
#[derive(Debug)]
enum CallState {
    Attempting { attempt: usize },
    Retrying { attempt: usize, last: UpstreamError },
    Success(Bytes),
    Failed(UpstreamError),
}

/// Sends prepared requests with bounded, jittered retries.
///
/// Holds only immutable configuration; share it freely between tasks.
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    http: reqwest::Client,
    policy: RetryPolicy,
    backoff: Backoff,
    timeout: Option<Duration>,
    observer: Option<Arc<dyn AttemptObserver>>,
}

impl RequestExecutor {
    pub fn new(http: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            http,
            policy,
            backoff: Backoff::new(policy.max_backoff(), Arc::new(RandomJitter)),
            timeout: None,
            observer: None,
        }
    }

    /// Replaces the randomness source used for backoff jitter.
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.backoff = Backoff::new(self.policy.max_backoff(), jitter);
        self
    }

    /// Applies a per-attempt timeout to requests that carry none.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Installs a sink that receives one record per attempt.
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The underlying transport.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Runs `request` until it succeeds, fails terminally, or the attempt
    /// budget is spent.
    ///
    /// The response body is read in full before the status is judged. Each
    /// attempt and each backoff sleep race against `ctx`; an interrupted call
    /// returns [`UpstreamError::Cancelled`] or
    /// [`UpstreamError::DeadlineExceeded`] and is never retried.
    pub async fn execute(&self, ctx: &CallContext, request: Request) -> Result<Bytes> {
        let method = request.method().clone();
        let url = request.url().to_string();
        let max_attempts = self.policy.max_attempts();
        let mut state = CallState::Attempting { attempt: 0 };

        loop {
            state = match state {
                CallState::Attempting { attempt } => {
                    let prepared = self.replay(&request, &method, &url)?;
                    let started = Instant::now();
                    let outcome = ctx.run(self.attempt(prepared, attempt, &url)).await;

                    let outcome = match outcome {
                        Ok(outcome) => outcome,
                        Err(interrupt) => {
                            let err = interrupted(interrupt, attempt, &url);
                            self.record(AttemptRecord {
                                method: method.clone(),
                                url: url.clone(),
                                attempt,
                                elapsed: started.elapsed(),
                                status: None,
                                error: Some(err.to_string()),
                            });
                            return Err(err);
                        }
                    };

                    self.record(AttemptRecord {
                        method: method.clone(),
                        url: url.clone(),
                        attempt,
                        elapsed: started.elapsed(),
                        status: match &outcome {
                            Ok((status, _)) => Some(*status),
                            Err(err) => err.status(),
                        },
                        error: outcome.as_ref().err().map(ToString::to_string),
                    });

                    match outcome {
                        Ok((_, body)) => CallState::Success(body),
                        Err(err) if !err.is_retryable() => CallState::Failed(err),
                        Err(err) if attempt + 1 < max_attempts => CallState::Retrying {
                            attempt,
                            last: err,
                        },
                        Err(err) => CallState::Failed(UpstreamError::Exhausted {
                            attempts: attempt + 1,
                            last: Box::new(err),
                        }),
                    }
                }
                CallState::Retrying { attempt, last } => {
                    let delay = self.backoff.delay(attempt, self.policy.base_delay());

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        method = %method,
                        url = %url,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %last,
                        "retrying upstream request"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = last;

                    if let Err(interrupt) = ctx.run(tokio::time::sleep(delay)).await {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(url = %url, ?interrupt, "upstream retry abandoned");
                        return Err(interrupted(interrupt, attempt + 1, &url));
                    }
                    CallState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                CallState::Success(body) => return Ok(body),
                CallState::Failed(err) => return Err(err),
            };
        }
    }

    /// One send-and-read cycle. The response is dropped on every path.
    async fn attempt(&self, request: Request, attempt: usize, url: &str) -> Result<(u16, Bytes)> {
        let response =
            self.http
                .execute(request)
                .await
                .map_err(|source| UpstreamError::Transport {
                    attempt,
                    url: url.to_owned(),
                    source,
                })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|source| UpstreamError::Decode {
                attempt,
                url: url.to_owned(),
                source,
            })?;

        if !classify::is_success_status(status) {
            return Err(UpstreamError::Http {
                status,
                url: url.to_owned(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok((status, body))
    }

    fn replay(&self, request: &Request, method: &Method, url: &str) -> Result<Request> {
        let mut prepared = request.try_clone().ok_or_else(|| {
            UpstreamError::Request(format!(
                "{method} {url}: streaming body cannot be replayed across attempts"
            ))
        })?;
        if prepared.timeout().is_none() {
            *prepared.timeout_mut() = self.timeout;
        }
        Ok(prepared)
    }

    fn record(&self, record: AttemptRecord) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %record.method,
            url = %record.url,
            attempt = record.attempt,
            status = ?record.status,
            elapsed_ms = record.elapsed.as_millis() as u64,
            error = ?record.error,
            "upstream attempt finished"
        );

        if let Some(observer) = &self.observer {
            observer.observe(&record);
        }
    }
}

fn interrupted(interrupt: Interrupt, attempt: usize, url: &str) -> UpstreamError {
    let url = url.to_owned();
    match interrupt {
        Interrupt::Cancelled => UpstreamError::Cancelled { attempt, url },
        Interrupt::DeadlineExceeded => UpstreamError::DeadlineExceeded { attempt, url },
    }
}
