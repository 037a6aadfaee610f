use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::Serialize;

use crate::{
    ApiError, Headers, HttpError, ParameterEncoding, Parameters, Progress, RawResponse, Result,
    RetryPolicy,
};

/// Client-wide defaults: timeout, retry behavior and headers.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retry policy used when a request does not set its own.
    pub retry: RetryPolicy,
    /// Headers sent with every request, below endpoint and per-call headers.
    pub default_headers: Headers,
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry: RetryPolicy::none(),
            default_headers: Headers::new(),
            user_agent: Some(concat!("courier-http/", env!("CARGO_PKG_VERSION")).to_owned()),
        }
    }
}

/// Stand-in response that bypasses the network.
#[derive(Clone, Debug)]
pub enum Mock {
    /// Body decoded through the regular decode path.
    Success { status: StatusCode, body: Bytes },
    /// Error raised on every attempt.
    Failure(ApiError),
}

impl Mock {
    pub fn success(body: impl Into<Bytes>) -> Self {
        Self::Success {
            status: StatusCode::OK,
            body: body.into(),
        }
    }

    /// Serializes `value` as the mocked JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|err| ApiError::Encode(format!("mock body serialization failed: {err}")))?;
        Ok(Self::success(body))
    }

    pub fn failure(error: ApiError) -> Self {
        Self::Failure(error)
    }

    /// Failure mock carrying a status error; 401 becomes
    /// [`ApiError::Unauthorized`].
    pub fn status(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Failure(ApiError::from_http(HttpError::new(status, body)))
    }
}

pub(crate) type Decoder<R> = Arc<dyn Fn(&[u8]) -> Result<R> + Send + Sync>;
pub(crate) type AuthFailureHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
pub(crate) type MultipartFactory = Arc<dyn Fn() -> reqwest::multipart::Form + Send + Sync>;
pub(crate) type RequestModifier = Arc<dyn Fn(&mut reqwest::Request) + Send + Sync>;
pub(crate) type RequestObserver = Arc<dyn Fn(&reqwest::Request) + Send + Sync>;
pub(crate) type ResponseObserver = Arc<dyn Fn(&RawResponse) + Send + Sync>;
pub(crate) type ResponseInterceptor = Arc<dyn Fn(RawResponse) -> RawResponse + Send + Sync>;
pub(crate) type ProgressHandler = Arc<dyn Fn(Progress) + Send + Sync>;
pub(crate) type ErrorHandler = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Per-call overrides layered on top of an endpoint.
///
/// Override fields replace the endpoint value wholesale; additional fields
/// merge into it.
pub struct RequestOptions<R> {
    pub(crate) additional_parameters: Option<Parameters>,
    pub(crate) override_parameters: Option<Parameters>,
    pub(crate) additional_headers: Option<Headers>,
    pub(crate) override_headers: Option<Headers>,
    pub(crate) encoding: Option<ParameterEncoding>,
    pub(crate) decoder: Option<Decoder<R>>,
    pub(crate) mock: Option<Mock>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) on_auth_failure: Option<AuthFailureHandler>,
    pub(crate) multipart: Option<MultipartFactory>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) modify_request: Option<RequestModifier>,
    pub(crate) on_request: Option<RequestObserver>,
    pub(crate) on_response: Option<ResponseObserver>,
    pub(crate) intercept_response: Option<ResponseInterceptor>,
    pub(crate) on_progress: Option<ProgressHandler>,
    pub(crate) on_error: Option<ErrorHandler>,
    pub(crate) delay: Option<Duration>,
}

impl<R> Default for RequestOptions<R> {
    fn default() -> Self {
        Self {
            additional_parameters: None,
            override_parameters: None,
            additional_headers: None,
            override_headers: None,
            encoding: None,
            decoder: None,
            mock: None,
            retry: None,
            on_auth_failure: None,
            multipart: None,
            timeout: None,
            modify_request: None,
            on_request: None,
            on_response: None,
            intercept_response: None,
            on_progress: None,
            on_error: None,
            delay: None,
        }
    }
}

impl<R> Clone for RequestOptions<R> {
    fn clone(&self) -> Self {
        Self {
            additional_parameters: self.additional_parameters.clone(),
            override_parameters: self.override_parameters.clone(),
            additional_headers: self.additional_headers.clone(),
            override_headers: self.override_headers.clone(),
            encoding: self.encoding,
            decoder: self.decoder.clone(),
            mock: self.mock.clone(),
            retry: self.retry.clone(),
            on_auth_failure: self.on_auth_failure.clone(),
            multipart: self.multipart.clone(),
            timeout: self.timeout,
            modify_request: self.modify_request.clone(),
            on_request: self.on_request.clone(),
            on_response: self.on_response.clone(),
            intercept_response: self.intercept_response.clone(),
            on_progress: self.on_progress.clone(),
            on_error: self.on_error.clone(),
            delay: self.delay,
        }
    }
}

impl<R> fmt::Debug for RequestOptions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("additional_parameters", &self.additional_parameters)
            .field("override_parameters", &self.override_parameters)
            .field("additional_headers", &self.additional_headers)
            .field("override_headers", &self.override_headers)
            .field("encoding", &self.encoding)
            .field("decoder", &self.decoder.is_some())
            .field("mock", &self.mock)
            .field("retry", &self.retry)
            .field("on_auth_failure", &self.on_auth_failure.is_some())
            .field("multipart", &self.multipart.is_some())
            .field("timeout", &self.timeout)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl<R> RequestOptions<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub fn mock(&self) -> Option<&Mock> {
        self.mock.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn add_parameters(&mut self, parameters: Parameters) {
        self.additional_parameters
            .get_or_insert_with(Parameters::new)
            .extend(parameters);
    }

    pub(crate) fn add_headers(&mut self, headers: &Headers) {
        self.additional_headers
            .get_or_insert_with(Headers::new)
            .merge(headers);
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use crate::{ApiError, ClientOptions, Headers, Mock, RequestOptions, RetryPolicy};

    #[test]
    fn client_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.timeout_ms, 30_000);
        assert_eq!(options.retry, RetryPolicy::none());
        assert!(options.default_headers.is_empty());
        assert!(options
            .user_agent
            .as_deref()
            .is_some_and(|agent| agent.starts_with("courier-http/")));
    }

    #[test]
    fn status_mock_maps_401_to_unauthorized() {
        match Mock::status(StatusCode::UNAUTHORIZED, "expired") {
            Mock::Failure(ApiError::Unauthorized(err)) => assert_eq!(err.body, "expired"),
            other => panic!("expected unauthorized failure, got {other:?}"),
        }
        assert!(matches!(
            Mock::status(StatusCode::NOT_FOUND, ""),
            Mock::Failure(ApiError::Http(_))
        ));
    }

    #[test]
    fn json_mock_serializes_body() {
        match Mock::json(&json!({"message": "ok"})).expect("must serialize") {
            Mock::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(&body[..], br#"{"message":"ok"}"#);
            }
            other => panic!("expected success mock, got {other:?}"),
        }
    }

    #[test]
    fn additional_values_accumulate() {
        let mut options = RequestOptions::<()>::new();
        options.add_parameters(json!({"a": 1}).as_object().cloned().unwrap_or_default());
        options.add_parameters(json!({"a": 2, "b": 3}).as_object().cloned().unwrap_or_default());
        options.add_headers(&Headers::from([("X-A", "1")]));
        options.add_headers(&Headers::from([("x-a", "2")]));

        let parameters = options.additional_parameters.as_ref().expect("parameters set");
        assert_eq!(parameters.get("a"), Some(&json!(2)));
        assert_eq!(parameters.get("b"), Some(&json!(3)));
        let headers = options.additional_headers.as_ref().expect("headers set");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-A"), Some("2"));
    }
}
