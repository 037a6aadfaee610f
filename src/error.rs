use std::{fmt, sync::Arc};

use reqwest::{header::HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::decode::extract_error_message;

/// Error type returned by this crate.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(Arc<reqwest::Error>),
    /// Response with a 4xx/5xx status code.
    #[error(transparent)]
    Http(HttpError),
    /// Response with status 401.
    #[error("unauthorized: {0}")]
    Unauthorized(HttpError),
    /// Response body did not match the expected type.
    #[error("decode error ({type_name}): {message}")]
    Decode {
        /// Name of the type the body was decoded into.
        type_name: &'static str,
        /// Underlying decoder message with position context.
        message: String,
    },
    /// Invalid URL, header or parameter while building a request.
    #[error("encode error: {0}")]
    Encode(String),
    /// Caller-supplied failure.
    #[error("{0}")]
    Custom(String),
    /// The request was cancelled through its handle.
    #[error("request cancelled")]
    Cancelled,
    /// A WebSocket send was attempted while not connected.
    #[error("websocket is not connected")]
    NotConnected,
    /// WebSocket handshake or frame error.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl ApiError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Builds a status error, routing 401 to [`ApiError::Unauthorized`].
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        Self::from_http(HttpError::new(status, body))
    }

    pub(crate) fn from_http(error: HttpError) -> Self {
        if error.is_unauthorized() {
            Self::Unauthorized(error)
        } else {
            Self::Http(error)
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(err) | Self::Unauthorized(err) => Some(err.status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }

    pub fn http_error(&self) -> Option<&HttpError> {
        match self {
            Self::Http(err) | Self::Unauthorized(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// True for transport failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

/// Structured 4xx/5xx failure with the raw response attached.
#[derive(Clone)]
pub struct HttpError {
    /// Response status code.
    pub status: StatusCode,
    /// Raw response body, lossily converted to UTF-8.
    pub body: String,
    /// Response headers.
    pub headers: HeaderMap,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl HttpError {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HeaderMap::new(),
            source: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Human-readable message extracted from the body.
    ///
    /// Falls back to the canonical status reason when the body is empty.
    pub fn message(&self) -> String {
        extract_error_message(&self.body).unwrap_or_else(|| {
            self.status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_owned()
        })
    }

    /// Decodes the body as a structured error payload.
    pub fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == StatusCode::FORBIDDEN
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("source", &self.source.as_ref().map(|err| err.to_string()))
            .finish()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http error {}: {}", self.status.as_u16(), self.message())
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde::Deserialize;

    use super::{ApiError, HttpError};

    #[test]
    fn status_flags() {
        assert!(HttpError::new(StatusCode::NOT_FOUND, "").is_not_found());
        assert!(HttpError::new(StatusCode::BAD_GATEWAY, "x").is_server_error());
        assert!(HttpError::new(StatusCode::CONFLICT, "x").is_client_error());
        assert!(!HttpError::new(StatusCode::CONFLICT, "x").is_server_error());
    }

    #[test]
    fn from_status_routes_401_to_unauthorized() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "nope");
        assert!(matches!(err, ApiError::Unauthorized(_)));
        assert!(err.is_unauthorized());

        let err = ApiError::from_status(StatusCode::FORBIDDEN, "nope");
        assert!(matches!(err, ApiError::Http(_)));
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn display_uses_extracted_message() {
        let err = HttpError::new(
            StatusCode::BAD_REQUEST,
            r#"{"error":"Invalid credentials"}"#,
        );
        assert_eq!(err.to_string(), "http error 400: Invalid credentials");

        let empty = HttpError::new(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(empty.message(), "Service Unavailable");
    }

    #[test]
    fn decode_structured_body() {
        #[derive(Deserialize)]
        struct Problem {
            code: u32,
        }

        let err = HttpError::new(StatusCode::UNPROCESSABLE_ENTITY, r#"{"code":17}"#);
        let problem: Problem = err.decode().expect("must decode problem body");
        assert_eq!(problem.code, 17);
    }
}
