use std::sync::Arc;

use bytes::Bytes;
use reqwest::{
    header::{HeaderName, HeaderValue},
    Method, Request, RequestBuilder,
};
use serde::Serialize;

use crate::{
    backoff::{Jitter, RandomJitter},
    AttemptObserver, CallContext, ClientOptions, RequestExecutor, Result, UpstreamError,
};

/// Extra request headers as `(name, value)` pairs.
///
/// Caller headers replace builder defaults such as `Content-Type`.
pub type Headers<'a> = &'a [(&'a str, &'a str)];

/// HTTP client for calling upstream services with bounded retries.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    http: reqwest::Client,
    options: ClientOptions,
    jitter: Arc<dyn Jitter>,
    observer: Option<Arc<dyn AttemptObserver>>,
    executor: RequestExecutor,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    /// Creates a client with a fresh connection pool and default options.
    pub fn new() -> Self {
        Self::with_http_client(reqwest::Client::new())
    }

    /// Creates a client on top of an existing `reqwest` pool.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        let options = ClientOptions::default();
        let jitter: Arc<dyn Jitter> = Arc::new(RandomJitter);
        let executor = assemble(&http, &options, &jitter, None);
        Self {
            http,
            options,
            jitter,
            observer: None,
            executor,
        }
    }

    /// Creates a client configured from `UPSTREAM_*` environment variables.
    ///
    /// See [`ClientOptions::from_env`].
    pub fn from_env() -> std::result::Result<Self, String> {
        Ok(Self::new().with_options(ClientOptions::from_env()?))
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self.reassemble()
    }

    /// Replaces the backoff jitter source, e.g. with a
    /// [`FixedJitter`](crate::FixedJitter) for reproducible delays.
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self.reassemble()
    }

    /// Installs a sink receiving one [`AttemptRecord`](crate::AttemptRecord)
    /// per attempt.
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = Some(observer);
        self.reassemble()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Sends a GET request.
    pub async fn get(&self, ctx: &CallContext, url: &str, headers: Headers<'_>) -> Result<Bytes> {
        let request = self.prepare(self.http.get(url), headers)?;
        self.executor.execute(ctx, request).await
    }

    /// Sends a DELETE request.
    pub async fn delete(
        &self,
        ctx: &CallContext,
        url: &str,
        headers: Headers<'_>,
    ) -> Result<Bytes> {
        let request = self.prepare(self.http.delete(url), headers)?;
        self.executor.execute(ctx, request).await
    }

    /// Sends `payload` as a JSON POST body.
    pub async fn post_json<P>(
        &self,
        ctx: &CallContext,
        url: &str,
        payload: &P,
        headers: Headers<'_>,
    ) -> Result<Bytes>
    where
        P: Serialize + ?Sized,
    {
        self.send_json(ctx, Method::POST, url, payload, headers).await
    }

    /// Sends `payload` as a JSON PUT body.
    pub async fn put_json<P>(
        &self,
        ctx: &CallContext,
        url: &str,
        payload: &P,
        headers: Headers<'_>,
    ) -> Result<Bytes>
    where
        P: Serialize + ?Sized,
    {
        self.send_json(ctx, Method::PUT, url, payload, headers).await
    }

    /// Sends `payload` as a JSON PATCH body.
    pub async fn patch_json<P>(
        &self,
        ctx: &CallContext,
        url: &str,
        payload: &P,
        headers: Headers<'_>,
    ) -> Result<Bytes>
    where
        P: Serialize + ?Sized,
    {
        self.send_json(ctx, Method::PATCH, url, payload, headers).await
    }

    /// Sends `form` URL-encoded as a POST body.
    ///
    /// Any serde value that flattens to key/value pairs works, e.g.
    /// `&[("grant_type", "client_credentials")]` or a struct.
    pub async fn post_form<F>(
        &self,
        ctx: &CallContext,
        url: &str,
        form: &F,
        headers: Headers<'_>,
    ) -> Result<Bytes>
    where
        F: Serialize + ?Sized,
    {
        let request = self.prepare(self.http.post(url).form(form), headers)?;
        self.executor.execute(ctx, request).await
    }

    /// Runs an already assembled request through the retry loop.
    pub async fn execute(&self, ctx: &CallContext, request: Request) -> Result<Bytes> {
        self.executor.execute(ctx, request).await
    }

    async fn send_json<P>(
        &self,
        ctx: &CallContext,
        method: Method,
        url: &str,
        payload: &P,
        headers: Headers<'_>,
    ) -> Result<Bytes>
    where
        P: Serialize + ?Sized,
    {
        let builder = self.http.request(method, url).json(payload);
        let request = self.prepare(builder, headers)?;
        self.executor.execute(ctx, request).await
    }

    fn prepare(&self, builder: RequestBuilder, headers: Headers<'_>) -> Result<Request> {
        let mut request = builder
            .build()
            .map_err(|err| UpstreamError::Request(format!("building request: {err}")))?;
        apply_headers(&mut request, headers)?;
        Ok(request)
    }

    fn reassemble(mut self) -> Self {
        self.executor = assemble(
            &self.http,
            &self.options,
            &self.jitter,
            self.observer.clone(),
        );
        self
    }
}

fn assemble(
    http: &reqwest::Client,
    options: &ClientOptions,
    jitter: &Arc<dyn Jitter>,
    observer: Option<Arc<dyn AttemptObserver>>,
) -> RequestExecutor {
    let executor = RequestExecutor::new(http.clone(), options.retry_policy())
        .with_jitter(Arc::clone(jitter))
        .with_timeout(options.timeout());
    match observer {
        Some(observer) => executor.with_observer(observer),
        None => executor,
    }
}

/// Inserts caller headers, replacing any value already set under the same name.
fn apply_headers(request: &mut Request, headers: Headers<'_>) -> Result<()> {
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| UpstreamError::Request(format!("invalid header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(value).map_err(|err| {
            UpstreamError::Request(format!("invalid value for header '{name}': {err}"))
        })?;
        request.headers_mut().insert(name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use reqwest::header::CONTENT_TYPE;

    use super::{apply_headers, UpstreamClient};
    use crate::{ClientOptions, UpstreamError};

    fn request() -> reqwest::Request {
        reqwest::Client::new()
            .post("http://backend/items")
            .header(CONTENT_TYPE, "application/json")
            .build()
            .expect("request must build")
    }

    #[test]
    fn caller_headers_override_defaults() {
        let mut request = request();
        apply_headers(
            &mut request,
            &[
                ("Content-Type", "application/vnd.api+json"),
                ("X-Api-Key", "k-1"),
            ],
        )
        .expect("headers must apply");

        let values: Vec<_> = request.headers().get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(values, vec!["application/vnd.api+json"]);
        assert_eq!(request.headers()["x-api-key"], "k-1");
    }

    #[test]
    fn invalid_header_name_is_request_error() {
        let err = apply_headers(&mut request(), &[("bad header", "v")])
            .expect_err("space in header name must fail");
        assert!(matches!(err, UpstreamError::Request(_)));
    }

    #[test]
    fn invalid_header_value_is_request_error() {
        let err = apply_headers(&mut request(), &[("X-Trace", "line\nbreak")])
            .expect_err("newline in header value must fail");
        assert!(matches!(err, UpstreamError::Request(_)));
    }

    #[test]
    fn options_flow_into_executor_policy() {
        let client = UpstreamClient::new().with_options(ClientOptions {
            max_attempts: 7,
            ..ClientOptions::default()
        });
        assert_eq!(client.executor().policy().max_attempts(), 7);
        assert_eq!(client.options().max_attempts, 7);
    }

    #[tokio::test]
    async fn invalid_url_fails_before_any_attempt() {
        let err = UpstreamClient::new()
            .get(&crate::CallContext::new(), "not a url", &[])
            .await
            .expect_err("relative url must fail");
        assert!(matches!(err, UpstreamError::Request(_)));
    }

    #[tokio::test]
    async fn unencodable_payload_fails_before_any_attempt() {
        let mut payload = HashMap::new();
        payload.insert((1, 2), "tuple keys are not JSON object keys");

        let err = UpstreamClient::new()
            .post_json(
                &crate::CallContext::new(),
                "http://127.0.0.1:9/items",
                &payload,
                &[],
            )
            .await
            .expect_err("non-string map keys must fail to encode");
        assert!(
            matches!(err, UpstreamError::Request(ref message) if message.starts_with("building request")),
            "unexpected error: {err:?}"
        );
    }
}
