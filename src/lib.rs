//! `courier-http` is an async HTTP/WebSocket client facade.
//!
//! Requests are described by [`Endpoint`] values and executed through a
//! fluent [`RequestBuilder`]:
//! - [`ApiClient::request`] starts a builder for per-call overrides, mocks,
//!   retry and interception
//! - [`RequestBuilder::run`] / [`RequestBuilder::start`] execute it
//! - [`ApiClient::batch`] runs several endpoints concurrently
//!
//! With the `websocket` feature, [`WebSocketClient`] keeps a socket alive
//! with liveness promotion and exponential reconnect.

mod builder;
mod client;
mod decode;
mod encoding;
mod endpoint;
mod error;
mod headers;
mod options;
mod params;
mod reconnect;
mod retry;
mod tracking;
mod types;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use builder::{RequestBuilder, RequestHandle};
pub use client::ApiClient;
pub use decode::{decode_json, extract_error_message};
pub use encoding::ParameterEncoding;
pub use endpoint::Endpoint;
pub use error::{ApiError, HttpError};
pub use headers::Headers;
pub use options::{ClientOptions, Mock, RequestOptions};
pub use params::{merge_headers, merge_parameters, Parameters};
pub use reconnect::ReconnectPolicy;
pub use retry::{RetryPolicy, RetryStrategy};
pub use tracking::TrackedRequest;
pub use types::{Progress, RawResponse};

#[cfg(feature = "websocket")]
pub use websocket::{ConnectionState, PromotionMode, WebSocketClient, WebSocketConfig, WebSocketEvent};

pub use reqwest::{multipart, Method, StatusCode};

pub type Result<T> = std::result::Result<T, ApiError>;
