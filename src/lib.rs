//! `upstream-http` is the outbound side of a reverse-proxy gateway.
//!
//! It sends requests to backend services with bounded retries, jittered
//! exponential backoff, and classification of transient versus permanent
//! failures:
//! - [`UpstreamClient::get`], [`UpstreamClient::delete`]
//! - [`UpstreamClient::post_json`], [`UpstreamClient::put_json`],
//!   [`UpstreamClient::patch_json`]
//! - [`UpstreamClient::post_form`]
//!
//! Every call takes a [`CallContext`]; cancelling it or letting its deadline
//! pass aborts the in-flight attempt or pending backoff sleep.

pub mod backoff;
pub mod classify;
mod client;
mod context;
mod error;
mod executor;
mod options;
mod types;

pub use backoff::{Backoff, FixedJitter, Jitter, RandomJitter};
pub use client::{Headers, UpstreamClient};
pub use context::{CallContext, Interrupt};
pub use error::{FailureOrigin, UpstreamError};
pub use executor::RequestExecutor;
pub use options::{ClientOptions, RetryPolicy};
pub use types::{AttemptObserver, AttemptRecord};

pub use bytes::Bytes;
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, UpstreamError>;
