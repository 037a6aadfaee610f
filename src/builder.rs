use std::{future::Future, sync::Arc, time::Duration};

use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::{
    ApiClient, ApiError, Endpoint, Headers, Mock, ParameterEncoding, Parameters, Progress,
    RawResponse, RequestOptions, Result, RetryPolicy,
};

/// Fluent per-call configuration for one endpoint.
///
/// Every setter consumes and returns the builder; nothing is shared with the
/// client or with other builders.
#[must_use = "a request builder does nothing until `run` or `start` is called"]
pub struct RequestBuilder<E: Endpoint> {
    client: ApiClient,
    endpoint: E,
    options: RequestOptions<E::Response>,
}

impl<E: Endpoint> RequestBuilder<E> {
    pub(crate) fn new(client: ApiClient, endpoint: E) -> Self {
        Self {
            client,
            endpoint,
            options: RequestOptions::default(),
        }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn options(&self) -> &RequestOptions<E::Response> {
        &self.options
    }

    /// Adds one parameter on top of the endpoint's own.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut parameters = Parameters::new();
        parameters.insert(key.into(), value.into());
        self.options.add_parameters(parameters);
        self
    }

    /// Merges parameters on top of the endpoint's own; new values win.
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.options.add_parameters(parameters);
        self
    }

    /// Replaces the endpoint's parameters entirely.
    pub fn override_parameters(mut self, parameters: Parameters) -> Self {
        self.options.override_parameters = Some(parameters);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.add_headers(&Headers::new().with(name, value));
        self
    }

    pub fn headers(mut self, headers: impl Into<Headers>) -> Self {
        self.options.add_headers(&headers.into());
        self
    }

    /// Replaces client, endpoint and previously added headers entirely.
    pub fn override_headers(mut self, headers: impl Into<Headers>) -> Self {
        self.options.override_headers = Some(headers.into());
        self
    }

    pub fn encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.options.encoding = Some(encoding);
        self
    }

    /// Decodes the body with `decoder` instead of [`Endpoint::decode`].
    pub fn decoder<F>(mut self, decoder: F) -> Self
    where
        F: Fn(&[u8]) -> Result<E::Response> + Send + Sync + 'static,
    {
        self.options.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn mock(mut self, mock: Mock) -> Self {
        self.options.mock = Some(mock);
        self
    }

    /// Installs `mock` only when `condition` holds.
    pub fn mock_if(self, condition: bool, mock: Mock) -> Self {
        if condition {
            self.mock(mock)
        } else {
            self
        }
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.options.retry = Some(policy);
        self
    }

    /// Sets the attempt budget, keeping the current delay strategy.
    pub fn retry_count(mut self, max_attempts: u32) -> Self {
        let mut policy = self
            .options
            .retry
            .take()
            .unwrap_or_else(|| self.client.options().retry.clone());
        policy.max_attempts = max_attempts;
        self.options.retry = Some(policy);
        self
    }

    /// Runs `handler` after a 401 and retries the request, within the retry
    /// budget.
    pub fn on_auth_failure<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.options.on_auth_failure = Some(Arc::new(move || handler().boxed()));
        self
    }

    /// Sends a multipart body built by `form` on each attempt. Parameters are
    /// appended as text fields.
    pub fn multipart<F>(mut self, form: F) -> Self
    where
        F: Fn() -> reqwest::multipart::Form + Send + Sync + 'static,
    {
        self.options.multipart = Some(Arc::new(form));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Mutates the fully built transport request right before dispatch.
    pub fn modify_request<F>(mut self, modify: F) -> Self
    where
        F: Fn(&mut reqwest::Request) + Send + Sync + 'static,
    {
        self.options.modify_request = Some(Arc::new(modify));
        self
    }

    pub fn on_request<F>(mut self, observer: F) -> Self
    where
        F: Fn(&reqwest::Request) + Send + Sync + 'static,
    {
        self.options.on_request = Some(Arc::new(observer));
        self
    }

    pub fn on_response<F>(mut self, observer: F) -> Self
    where
        F: Fn(&RawResponse) + Send + Sync + 'static,
    {
        self.options.on_response = Some(Arc::new(observer));
        self
    }

    /// Rewrites the raw response before status classification and decode.
    pub fn intercept_response<F>(mut self, intercept: F) -> Self
    where
        F: Fn(RawResponse) -> RawResponse + Send + Sync + 'static,
    {
        self.options.intercept_response = Some(Arc::new(intercept));
        self
    }

    pub fn on_progress<F>(mut self, handler: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.options.on_progress = Some(Arc::new(handler));
        self
    }

    /// Called with the error that ends the request, after retries.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ApiError) + Send + Sync + 'static,
    {
        self.options.on_error = Some(Arc::new(handler));
        self
    }

    /// Waits `delay` before each dispatch (or before serving a mock).
    pub fn delay(mut self, delay: Duration) -> Self {
        self.options.delay = Some(delay);
        self
    }

    /// Executes the request and waits for the decoded response.
    pub async fn run(self) -> Result<E::Response> {
        self.client.execute(&self.endpoint, &self.options).await
    }

    /// Spawns the request on the tokio runtime and returns a cancelable
    /// handle.
    pub fn start(self) -> RequestHandle<E::Response> {
        RequestHandle {
            task: tokio::spawn(self.run()),
        }
    }
}

/// Handle to a request started with [`RequestBuilder::start`].
#[derive(Debug)]
pub struct RequestHandle<T> {
    task: JoinHandle<Result<T>>,
}

impl<T> RequestHandle<T> {
    /// Aborts the request. The transport future is dropped at its next
    /// suspension point and the in-flight entry is removed.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for completion; returns [`ApiError::Cancelled`] after
    /// [`cancel`](Self::cancel).
    pub async fn wait(self) -> Result<T> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(ApiError::Cancelled),
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}
