use std::{fmt, time::Duration};

use bytes::BytesMut;
use reqwest::{header, Url};
use tokio::time::sleep;

use crate::{
    options::ProgressHandler,
    params::{merge_headers, merge_parameters, query_pairs},
    tracking::InFlight,
    ApiError, ClientOptions, Endpoint, Headers, HttpError, Mock, ParameterEncoding, Progress,
    RawResponse, RequestBuilder, RequestOptions, Result, TrackedRequest,
};

// Cap on the body buffer reserved up front from `Content-Length`.
const MAX_BODY_PREALLOC: u64 = 1 << 20;

/// Outcome of a single attempt inside the retry loop.
enum Attempt<T> {
    Done(T),
    /// Auth recovery ran; the carried error is returned if attempts run out.
    Retry(ApiError),
}

#[derive(Clone)]
/// HTTP client that executes [`Endpoint`]s against a base URL.
///
/// Cloning is cheap and clones share the connection pool and the in-flight
/// request list.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    options: ClientOptions,
    in_flight: InFlight,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .options
            .default_headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case(header::AUTHORIZATION.as_str()) {
                    (name, "<redacted>")
                } else {
                    (name, value)
                }
            })
            .collect();
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout_ms", &self.options.timeout_ms)
            .field("retry", &self.options.retry)
            .field("default_headers", &headers)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client for `base_url` with default options.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let raw = base_url.as_ref().trim();
        let base_url = Url::parse(raw)
            .map_err(|err| ApiError::Encode(format!("invalid base url '{raw}': {err}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            options: ClientOptions::default(),
            in_flight: InFlight::default(),
        })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `COURIER_BASE_URL`: base URL every endpoint path is joined onto
    /// - `COURIER_TOKEN`: optional access token sent as a bearer credential
    ///
    /// Returns an error if the base URL is missing, or either variable is set
    /// but empty.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use courier_http::ApiClient;
    ///
    /// let client = ApiClient::from_env().expect("missing COURIER_BASE_URL");
    /// ```
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = std::env::var("COURIER_BASE_URL")
            .map_err(|_| "missing COURIER_BASE_URL environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("COURIER_BASE_URL is set but empty".to_owned());
        }
        let client = Self::new(&url).map_err(|err| err.to_string())?;

        match std::env::var("COURIER_TOKEN") {
            Ok(token) if token.trim().is_empty() => {
                Err("COURIER_TOKEN is set but empty".to_owned())
            }
            Ok(token) => Ok(client.with_bearer_token(token)),
            Err(_) => Ok(client),
        }
    }

    /// Uses a caller-configured `reqwest` client (proxies, TLS roots, pools).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Applies client options such as timeout, retry policy and headers.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Adds a header sent with every request, replacing any existing value
    /// for the same name (case-insensitive).
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.default_headers.insert(name, value);
        self
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn with_bearer_token(self, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        self.with_default_header(header::AUTHORIZATION.as_str(), authorization)
    }

    /// Base URL endpoint paths are joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Client-wide defaults applied to every request.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Requests currently being dispatched by this client and its clones.
    pub fn in_flight(&self) -> Vec<TrackedRequest> {
        self.in_flight.snapshot()
    }

    /// Starts a fluent request for `endpoint`.
    pub fn request<E: Endpoint>(&self, endpoint: E) -> RequestBuilder<E> {
        RequestBuilder::new(self.clone(), endpoint)
    }

    /// Executes `endpoint` with no per-call overrides.
    pub async fn send<E: Endpoint>(&self, endpoint: E) -> Result<E::Response> {
        self.execute(&endpoint, &RequestOptions::default()).await
    }

    /// Runs every endpoint concurrently and returns the responses in input
    /// order. The first failure fails the whole batch.
    pub async fn batch<E, I>(&self, endpoints: I) -> Result<Vec<E::Response>>
    where
        E: Endpoint,
        I: IntoIterator<Item = E>,
    {
        let endpoints: Vec<E> = endpoints.into_iter().collect();
        let options = RequestOptions::default();
        futures::future::try_join_all(
            endpoints
                .iter()
                .map(|endpoint| self.execute(endpoint, &options)),
        )
        .await
    }

    /// Runs two different endpoints concurrently.
    pub async fn batch2<A, B>(&self, first: A, second: B) -> Result<(A::Response, B::Response)>
    where
        A: Endpoint,
        B: Endpoint,
    {
        futures::try_join!(self.send(first), self.send(second))
    }

    /// Runs three different endpoints concurrently.
    pub async fn batch3<A, B, C>(
        &self,
        first: A,
        second: B,
        third: C,
    ) -> Result<(A::Response, B::Response, C::Response)>
    where
        A: Endpoint,
        B: Endpoint,
        C: Endpoint,
    {
        futures::try_join!(self.send(first), self.send(second), self.send(third))
    }

    /// Executes `endpoint` with `options`: mock short-circuit or dispatch,
    /// status classification and decode, wrapped in the retry loop.
    pub async fn execute<E: Endpoint>(
        &self,
        endpoint: &E,
        options: &RequestOptions<E::Response>,
    ) -> Result<E::Response> {
        let policy = options.retry.as_ref().unwrap_or(&self.options.retry);
        let max_attempts = policy.attempts();
        let mut attempt = 1u32;

        loop {
            let error = match self.attempt(endpoint, options, attempt).await {
                Ok(Attempt::Done(response)) => return Ok(response),
                Ok(Attempt::Retry(error)) => error,
                Err(error) if error.is_transient() => error,
                Err(error) => return Err(Self::report(options, error)),
            };

            if attempt >= max_attempts {
                return Err(Self::report(options, error));
            }

            let delay = policy.delay(attempt);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying request"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn attempt<E: Endpoint>(
        &self,
        endpoint: &E,
        options: &RequestOptions<E::Response>,
        attempt: u32,
    ) -> Result<Attempt<E::Response>> {
        if let Some(mock) = &options.mock {
            if let Some(delay) = options.delay {
                sleep(delay).await;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(attempt, path = %endpoint.path(), "serving mocked response");
            return match mock {
                Mock::Success { status, body } => {
                    let raw = RawResponse {
                        status: *status,
                        headers: header::HeaderMap::new(),
                        body: body.clone(),
                    };
                    self.complete(endpoint, options, raw).await
                }
                Mock::Failure(error) => Self::recover_or_fail(options, error.clone()).await,
            };
        }

        let request = self.build_request(endpoint, options)?;
        if let Some(on_request) = &options.on_request {
            on_request(&request);
        }

        let guard = self
            .in_flight
            .track(request.method().clone(), request.url().clone());
        #[cfg(feature = "tracing")]
        tracing::debug!(
            id = %guard.id(),
            method = %request.method(),
            url = %request.url(),
            attempt,
            "dispatching request"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = attempt;

        if let Some(delay) = options.delay {
            sleep(delay).await;
        }

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(err) => return Self::recover_or_fail(options, err.into()).await,
        };
        let raw = read_response(response, options.on_progress.as_ref()).await?;
        drop(guard);

        self.complete(endpoint, options, raw).await
    }

    /// Interception, status classification and decode of a received response.
    async fn complete<E: Endpoint>(
        &self,
        endpoint: &E,
        options: &RequestOptions<E::Response>,
        raw: RawResponse,
    ) -> Result<Attempt<E::Response>> {
        if let Some(on_response) = &options.on_response {
            on_response(&raw);
        }
        let raw = match &options.intercept_response {
            Some(intercept) => intercept(raw),
            None => raw,
        };

        if let Some(error) = classify_status(&raw) {
            return Self::recover_or_fail(options, error).await;
        }

        let response = match &options.decoder {
            Some(decoder) => decoder(&raw.body)?,
            None => endpoint.decode(&raw.body)?,
        };
        Ok(Attempt::Done(response))
    }

    /// Runs the auth-failure handler for 401s and signals a retry; any other
    /// error is returned as-is.
    async fn recover_or_fail<R>(
        options: &RequestOptions<R>,
        error: ApiError,
    ) -> Result<Attempt<R>> {
        match &options.on_auth_failure {
            Some(handler) if error.is_unauthorized() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("unauthorized response, running auth failure handler");
                handler().await;
                Ok(Attempt::Retry(error))
            }
            _ => Err(error),
        }
    }

    fn report<R>(options: &RequestOptions<R>, error: ApiError) -> ApiError {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %error, "request failed");
        if let Some(on_error) = &options.on_error {
            on_error(&error);
        }
        error
    }

    fn build_request<E: Endpoint>(
        &self,
        endpoint: &E,
        options: &RequestOptions<E::Response>,
    ) -> Result<reqwest::Request> {
        let url = self.endpoint_url(&endpoint.path())?;
        let method = endpoint.method();

        let mut base_headers: Headers = self.options.default_headers.clone();
        base_headers.merge(&endpoint.headers());
        let headers = merge_headers(
            base_headers,
            options.additional_headers.as_ref(),
            options.override_headers.as_ref(),
        );
        let parameters = merge_parameters(
            endpoint.parameters()?,
            options.additional_parameters.as_ref(),
            options.override_parameters.as_ref(),
        );
        let encoding = options
            .encoding
            .unwrap_or_else(|| ParameterEncoding::for_method(&method));
        let timeout = options
            .timeout
            .unwrap_or_else(|| Duration::from_millis(self.options.timeout_ms));

        let mut builder = self.http.request(method, url).timeout(timeout);
        if let Some(user_agent) = &self.options.user_agent {
            builder = builder.header(header::USER_AGENT, user_agent);
        }
        builder = builder.headers(headers.to_header_map()?);

        if let Some(multipart) = &options.multipart {
            let form = query_pairs(&parameters)
                .into_iter()
                .fold(multipart(), |form, (name, value)| form.text(name, value));
            builder = builder.multipart(form);
        } else if !parameters.is_empty() {
            builder = match encoding {
                ParameterEncoding::Query => builder.query(&query_pairs(&parameters)),
                ParameterEncoding::Json => builder.json(&parameters),
                ParameterEncoding::Form => builder.form(&query_pairs(&parameters)),
            };
        }

        let mut request = builder
            .build()
            .map_err(|err| ApiError::Encode(format!("could not build request: {err}")))?;
        if let Some(modify) = &options.modify_request {
            modify(&mut request);
        }
        Ok(request)
    }

    fn endpoint_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path)
                .map_err(|err| ApiError::Encode(format!("invalid url '{path}': {err}")));
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let joined = if path.is_empty() {
            base.to_owned()
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined).map_err(|err| ApiError::Encode(format!("invalid url '{joined}': {err}")))
    }
}

/// 401 first, then any other 4xx/5xx; the exact body is kept either way.
fn classify_status(raw: &RawResponse) -> Option<ApiError> {
    let status = raw.status;
    if !(status.is_client_error() || status.is_server_error()) {
        return None;
    }
    let error = HttpError::new(status, raw.text()).with_headers(raw.headers.clone());
    Some(ApiError::from_http(error))
}

async fn read_response(
    mut response: reqwest::Response,
    on_progress: Option<&ProgressHandler>,
) -> Result<RawResponse> {
    let status = response.status();
    let headers = response.headers().clone();
    let total = response.content_length();
    let mut body = BytesMut::with_capacity(total.unwrap_or(0).min(MAX_BODY_PREALLOC) as usize);

    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        if let Some(on_progress) = on_progress {
            on_progress(Progress {
                received: body.len() as u64,
                total,
            });
        }
    }

    Ok(RawResponse {
        status,
        headers,
        body: body.freeze(),
    })
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use reqwest::{header::HeaderMap, StatusCode};

    use super::{classify_status, normalize_bearer_authorization, ApiClient};
    use crate::{ApiError, RawResponse};

    fn raw(status: StatusCode, body: &'static str) -> RawResponse {
        RawResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("abc123"),
            "Bearer abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR abc123"),
            "bEaReR abc123".to_owned()
        );
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = ApiClient::new("https://api.example.com")
            .expect("valid url")
            .with_bearer_token("secret-token");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn endpoint_url_joins_paths() {
        let client = ApiClient::new("https://api.example.com/v1/").expect("valid url");
        assert_eq!(
            client.endpoint_url("/users/7").expect("must join").as_str(),
            "https://api.example.com/v1/users/7"
        );
        assert_eq!(
            client.endpoint_url("users").expect("must join").as_str(),
            "https://api.example.com/v1/users"
        );
        assert_eq!(
            client
                .endpoint_url("https://other.example.com/x")
                .expect("absolute url")
                .as_str(),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn invalid_base_url_is_encode_error() {
        let err = ApiClient::new("not a url").expect_err("must fail");
        assert!(matches!(err, ApiError::Encode(_)));
    }

    #[test]
    fn classify_status_ranges() {
        assert!(classify_status(&raw(StatusCode::OK, "{}")).is_none());
        assert!(classify_status(&raw(StatusCode::NOT_MODIFIED, "")).is_none());

        match classify_status(&raw(StatusCode::NOT_FOUND, "missing")) {
            Some(ApiError::Http(err)) => {
                assert!(err.is_not_found());
                assert_eq!(err.body, "missing");
            }
            other => panic!("expected http error, got {other:?}"),
        }
        match classify_status(&raw(StatusCode::SERVICE_UNAVAILABLE, "down")) {
            Some(ApiError::Http(err)) => assert!(err.is_server_error()),
            other => panic!("expected http error, got {other:?}"),
        }
        assert!(matches!(
            classify_status(&raw(StatusCode::UNAUTHORIZED, "{\"error\":\"expired\"}")),
            Some(ApiError::Unauthorized(_))
        ));
    }
}
